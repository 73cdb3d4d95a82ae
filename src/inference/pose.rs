use serde::{Deserialize, Serialize};

use super::topology;

/// One body joint in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    /// 0.0 is the left edge, 1.0 the right edge
    pub x: f32,
    /// 0.0 is the top edge, 1.0 the bottom edge
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub visibility: Option<f32>,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Keypoints without a visibility score are always shown
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility.map_or(true, |v| v >= threshold)
    }
}

/// Pose estimate for a single frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    pub keypoints: Vec<Keypoint>,
    /// Pairs of keypoint indices to join. When absent, the standard body
    /// topology is used if the keypoint count matches it.
    #[serde(default)]
    pub connections: Option<Vec<(usize, usize)>>,
}

impl PoseEstimate {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self {
            keypoints,
            connections: None,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_pose(&self) -> bool {
        !self.keypoints.is_empty()
    }

    /// Connections to draw, skipping pairs that reference missing keypoints
    pub fn segments(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let pairs: &[(usize, usize)] = match &self.connections {
            Some(pairs) => pairs,
            None if self.keypoints.len() == topology::LANDMARK_COUNT => topology::CONNECTIONS,
            None => &[],
        };
        let len = self.keypoints.len();
        pairs.iter().copied().filter(move |&(a, b)| a < len && b < len)
    }

    /// Name of the keypoint at `index`, when the standard topology applies
    pub fn label(&self, index: usize) -> Option<&'static str> {
        if self.connections.is_none() && self.keypoints.len() == topology::LANDMARK_COUNT {
            topology::LANDMARK_NAMES.get(index).copied()
        } else {
            None
        }
    }
}
