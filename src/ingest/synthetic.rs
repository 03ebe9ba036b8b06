//! Synthetic `stub://` camera.
//!
//! Produces a moving gradient at the configured resolution. Query parameters
//! `width` and `height` override the default 640x480, e.g.
//! `stub://camera?width=1280&height=720`.

use anyhow::{anyhow, Context, Result};
use std::time::Instant;
use url::Url;

use super::frame_interval;
use crate::frame::{CaptureSource, VideoFrame};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl SyntheticConfig {
    pub fn from_url(url: &str, target_fps: u32) -> Result<Self> {
        let parsed = Url::parse(url).context("parse stub camera url")?;
        let mut width = DEFAULT_WIDTH;
        let mut height = DEFAULT_HEIGHT;
        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "width" => {
                    width = value
                        .parse()
                        .map_err(|_| anyhow!("stub camera width must be an integer"))?
                }
                "height" => {
                    height = value
                        .parse()
                        .map_err(|_| anyhow!("stub camera height must be an integer"))?
                }
                _ => {}
            }
        }
        Ok(Self {
            url: url.to_string(),
            width,
            height,
            target_fps,
        })
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    open: bool,
    frame_count: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            open: false,
            frame_count: 0,
            last_frame_at: None,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

impl CaptureSource for SyntheticSource {
    fn describe(&self) -> String {
        self.config.url.clone()
    }

    fn open(&mut self) -> Result<()> {
        self.open = true;
        log::info!(
            "SyntheticSource: opened {} ({}x{})",
            self.config.url,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        if !self.open {
            return Err(anyhow!("synthetic source not open"));
        }
        let now = Instant::now();
        if let Some(last) = self.last_frame_at {
            if now.duration_since(last) < frame_interval(self.config.target_fps) {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        self.last_frame_at = Some(now);
        let frame = VideoFrame::from_rgb(
            self.generate_pixels(),
            self.config.width,
            self.config.height,
        )?;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
