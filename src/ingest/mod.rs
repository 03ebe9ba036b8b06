//! Capture sources.
//!
//! This module provides the live video sources the session controller can own:
//! - Synthetic `stub://` source (tests, demos)
//! - HTTP MJPEG/JPEG cameras (`http://`, `https://`)
//! - Local still images (plain paths), replayed as a static camera
//!
//! Sources are created closed. `CaptureSource::open` acquires the device and is
//! the only place a capture error can originate.

pub mod http;
pub mod still;
pub mod synthetic;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::CaptureSource;

pub use http::{HttpCameraConfig, HttpCameraSource};
pub use still::{StillConfig, StillSource};
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Build an unopened capture source for a camera URL or path.
pub fn capture_source_for(url: &str, target_fps: u32) -> Result<Box<dyn CaptureSource>> {
    let url = url.trim();
    if url.is_empty() {
        return Err(anyhow!("camera url must not be empty"));
    }
    if url.starts_with("stub://") {
        let config = SyntheticConfig::from_url(url, target_fps)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(Box::new(HttpCameraSource::new(HttpCameraConfig {
            url: url.to_string(),
            target_fps,
            ..HttpCameraConfig::default()
        })));
    }
    if url.contains("://") {
        return Err(anyhow!(
            "unsupported camera url '{}'; expected stub://, http(s):// or a local path",
            url
        ));
    }
    Ok(Box::new(StillSource::new(StillConfig {
        path: url.into(),
        target_fps,
    })))
}

pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}
