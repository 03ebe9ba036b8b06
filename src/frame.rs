//! Live video surface.
//!
//! - `VideoFrame`: one decoded RGB8 frame with its native resolution.
//! - `CaptureSource`: an owned handle to a live camera stream.
//!
//! The session controller holds at most one open `CaptureSource` and keeps the
//! most recently decoded frame as its "video surface". The encoder and the
//! overlay renderer both read from that surface; neither mutates it.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Decoded frame. Width and height are the native decoded resolution.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl VideoFrame {
    /// Wrap packed RGB8 pixels. `data.len()` must equal `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(anyhow!(
                "rgb buffer has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A frame whose source has not produced decoded dimensions yet.
    pub fn not_ready() -> Self {
        Self {
            data: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }

    /// True once the source reports non-zero decoded dimensions.
    pub fn is_ready(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Copy into an `image` buffer for resampling or drawing.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", self.width, self.height))
    }
}

/// Live camera handle.
///
/// `open` acquires the device (a failure here is a capture error and is fatal
/// for the session). `grab` returns the next decoded frame, or `None` when the
/// source has nothing new yet. `release` must be safe to call repeatedly.
pub trait CaptureSource {
    /// Source identifier for logs.
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<()>;

    fn grab(&mut self) -> Result<Option<VideoFrame>>;

    fn release(&mut self);

    fn is_open(&self) -> bool;

    /// Source health for periodic logging.
    fn is_healthy(&self) -> bool {
        self.is_open()
    }

    /// Frames decoded since open.
    fn frames_captured(&self) -> u64 {
        0
    }
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        (**self).grab()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }

    fn frames_captured(&self) -> u64 {
        (**self).frames_captured()
    }
}
