use anyhow::Result;

use crate::detect::result::FaceRegion;
use crate::frame::VideoFrame;

/// Local face detector backend.
///
/// Backends run on the event-loop thread once per overlay cycle, so `detect`
/// should return quickly. Regions are returned in the backend's detection
/// order; the overlay pairs them with server results by that order.
pub trait FaceDetectorBackend {
    /// Backend identifier, used for selection by name.
    fn name(&self) -> &'static str;

    /// Find face regions in a ready frame.
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>>;

    /// Optional warm-up hook (model loading).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
