use anyhow::Result;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::FaceRegion;
use crate::frame::VideoFrame;

/// Kiosk framing backend: reports one face region centred in the frame, sized
/// to the guide box a kiosk camera asks the user to stand in.
pub struct CenterBackend {
    /// Fraction of the shorter frame side covered by the region.
    scale: f32,
}

impl CenterBackend {
    pub fn new(scale: f32) -> Self {
        Self {
            scale: scale.clamp(0.05, 1.0),
        }
    }
}

impl Default for CenterBackend {
    fn default() -> Self {
        Self::new(0.4)
    }
}

impl FaceDetectorBackend for CenterBackend {
    fn name(&self) -> &'static str {
        "center"
    }

    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>> {
        if !frame.is_ready() {
            return Ok(Vec::new());
        }
        let side = frame.width.min(frame.height) as f32 * self.scale;
        Ok(vec![FaceRegion {
            x: (frame.width as f32 - side) / 2.0,
            y: (frame.height as f32 - side) / 2.0,
            width: side,
            height: side,
            confidence: 1.0,
        }])
    }
}
