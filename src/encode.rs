//! Frame encoder.
//!
//! Samples the current video surface and produces a compact JPEG data URI:
//! width is capped (640 px by default) with the aspect ratio preserved, then
//! the image is re-encoded at a fixed lossy quality to bound payload size.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};

use crate::error::StreamError;
use crate::frame::VideoFrame;
use crate::protocol::{Action, FramePayload};

pub const DEFAULT_MAX_WIDTH: u32 = 640;
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncoderSettings {
    pub max_width: u32,
    /// JPEG quality, 1..=100.
    pub quality: u8,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Output dimensions for a source, or `None` while the source is not ready.
pub fn target_dimensions(width: u32, height: u32, max_width: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    if width <= max_width {
        return Some((width, height));
    }
    let scaled = (height as f64 * max_width as f64 / width as f64).round() as u32;
    Some((max_width, scaled.max(1)))
}

#[derive(Clone, Debug, Default)]
pub struct FrameEncoder {
    settings: EncoderSettings,
}

impl FrameEncoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> EncoderSettings {
        self.settings
    }

    /// Encode `frame` for `action`.
    ///
    /// `Ok(None)` means the source has no decoded dimensions yet. The frame is
    /// never mutated.
    pub fn encode(
        &self,
        frame: &VideoFrame,
        action: Action,
    ) -> Result<Option<FramePayload>, StreamError> {
        let Some((width, height)) =
            target_dimensions(frame.width, frame.height, self.settings.max_width)
        else {
            return Ok(None);
        };

        let source = frame
            .to_image()
            .map_err(|e| StreamError::Encode(e.to_string()))?;
        let scaled = if (width, height) == source.dimensions() {
            source
        } else {
            imageops::resize(&source, width, height, FilterType::Triangle)
        };

        let mut jpeg = Vec::with_capacity((width * height / 4) as usize);
        JpegEncoder::new_with_quality(&mut jpeg, self.settings.quality)
            .encode_image(&scaled)
            .map_err(|e| StreamError::Encode(e.to_string()))?;

        let mut uri = String::with_capacity(DATA_URI_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        uri.push_str(DATA_URI_PREFIX);
        STANDARD.encode_string(&jpeg, &mut uri);
        Ok(Some(FramePayload::new(uri, action)))
    }
}
