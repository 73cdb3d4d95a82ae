//! Temporary references to in-memory blobs
//!
//! A run registers the source video here while it is being decoded and the
//! finished output once it is assembled. References stay valid until they are
//! revoked, so a leaked reference shows up in [`BlobStore::live`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::debug;
use uuid::Uuid;

const URL_PREFIX: &str = "blob:formcheck/";

/// Opaque reference to a registered blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobUrl(String);

impl BlobUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registered blob contents
#[derive(Debug, Clone)]
pub struct Blob {
    pub data: Bytes,
    pub mime: String,
}

/// Shared registry of blob references, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct BlobStore {
    entries: Arc<Mutex<HashMap<BlobUrl, Blob>>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `data` and return a reference to it
    pub fn create(&self, data: Bytes, mime: impl Into<String>) -> BlobUrl {
        let url = BlobUrl(format!("{}{}", URL_PREFIX, Uuid::new_v4()));
        let blob = Blob {
            data,
            mime: mime.into(),
        };
        debug!("Created {} ({} bytes, {})", url, blob.data.len(), blob.mime);
        self.lock().insert(url.clone(), blob);
        url
    }

    pub fn fetch(&self, url: &BlobUrl) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    /// Release a reference. Returns false if it was already revoked.
    pub fn revoke(&self, url: &BlobUrl) -> bool {
        let removed = self.lock().remove(url).is_some();
        if removed {
            debug!("Revoked {}", url);
        }
        removed
    }

    /// Number of references that have not been revoked
    pub fn live(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<BlobUrl, Blob>> {
        // The map stays consistent even if a holder panicked mid-operation.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
