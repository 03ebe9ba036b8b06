//! Local still-image source.
//!
//! Decodes one local image at open time and replays it as a static camera at
//! `target_fps`. Only plain filesystem paths are accepted.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Instant;

use super::frame_interval;
use crate::frame::{CaptureSource, VideoFrame};

#[derive(Clone, Debug)]
pub struct StillConfig {
    pub path: PathBuf,
    pub target_fps: u32,
}

pub struct StillSource {
    config: StillConfig,
    frame: Option<VideoFrame>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
}

impl StillSource {
    pub fn new(config: StillConfig) -> Self {
        Self {
            config,
            frame: None,
            last_frame_at: None,
            frame_count: 0,
        }
    }
}

impl CaptureSource for StillSource {
    fn describe(&self) -> String {
        self.config.path.display().to_string()
    }

    fn open(&mut self) -> Result<()> {
        let image = image::open(&self.config.path)
            .with_context(|| format!("open still image {}", self.config.path.display()))?;
        self.frame = Some(VideoFrame::from_image(image.into_rgb8()));
        log::info!("StillSource: opened {}", self.config.path.display());
        Ok(())
    }

    fn grab(&mut self) -> Result<Option<VideoFrame>> {
        let frame = self
            .frame
            .as_ref()
            .ok_or_else(|| anyhow!("still source not open"))?;
        if let Some(last) = self.last_frame_at {
            if last.elapsed() < frame_interval(self.config.target_fps) {
                return Ok(None);
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.frame_count += 1;
        Ok(Some(frame.clone()))
    }

    fn release(&mut self) {
        self.frame = None;
        self.last_frame_at = None;
    }

    fn is_open(&self) -> bool {
        self.frame.is_some()
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
