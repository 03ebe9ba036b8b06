use anyhow::Result;

use crate::detect::backend::FaceDetectorBackend;
use crate::detect::result::FaceRegion;
use crate::frame::VideoFrame;

/// Finds nothing. The overlay stays empty; results still reach the status line.
#[derive(Default)]
pub struct NoneBackend;

impl FaceDetectorBackend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceRegion>> {
        Ok(Vec::new())
    }
}
