//! Output drawing surface

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::instrument;

use super::overlay::OverlayStyle;
use crate::inference::PoseEstimate;
use crate::source::Frame;

/// Fixed-size RGB canvas the pipeline renders every sample onto
pub struct Surface {
    canvas: RgbImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: RgbImage::new(width, height),
        }
    }

    /// Replace the canvas contents with `frame`, scaling it if needed
    #[instrument(skip(self, frame), fields(seq = frame.meta.sequence))]
    pub fn draw_frame(&mut self, frame: &Frame) -> Result<(), String> {
        let render_start = Instant::now();

        let view = frame.as_rgb().ok_or_else(|| {
            format!(
                "frame {} is not a {}x{} RGB image ({} bytes, {:?})",
                frame.meta.sequence,
                frame.meta.width,
                frame.meta.height,
                frame.data.len(),
                frame.meta.format
            )
        })?;

        if view.dimensions() == self.canvas.dimensions() {
            let len = self.canvas.len();
            self.canvas.copy_from_slice(&view.as_raw()[..len]);
        } else {
            self.canvas = imageops::resize(
                &view,
                self.canvas.width(),
                self.canvas.height(),
                FilterType::Triangle,
            );
        }

        metrics::histogram!("formcheck_render_time_us")
            .record(render_start.elapsed().as_micros() as f64);
        Ok(())
    }

    pub fn draw_pose(&mut self, estimate: &PoseEstimate, style: &OverlayStyle) {
        style.draw(&mut self.canvas, estimate);
    }

    /// Current rendered image
    pub fn image(&self) -> &RgbImage {
        &self.canvas
    }
}
