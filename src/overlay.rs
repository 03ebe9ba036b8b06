//! Overlay renderer.
//!
//! One cycle per display refresh (in this client: per newly captured frame):
//!
//! 1. Skip when the video surface has no decoded dimensions yet.
//! 2. Resize the overlay surface to the frame's native resolution.
//! 3. Run the local face detector on the frame.
//! 4. Pair the i-th local region with the i-th entry of the latest results
//!    batch by position. Local and server detection order are only loosely
//!    related, so a box can carry another face's label when several faces are
//!    in view; there is no spatial or identity matching.
//! 5. Clear and redraw every box.
//!
//! The surface carries box geometry, colour and label text. `annotate` strokes
//! the boxes onto a copy of the frame for the display sink; label text is
//! rendered by whoever shows the surface.

use anyhow::Result;
use image::{Rgb, RgbImage};

use crate::detect::{FaceDetectorBackend, FaceRegion};
use crate::frame::VideoFrame;
use crate::protocol::{DetectionResult, UNKNOWN_FACE};

pub const MATCHED_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
pub const UNMATCHED_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
pub const STROKE_WIDTH: u32 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxStyle {
    pub matched: bool,
    pub color: Rgb<u8>,
    pub label: String,
}

/// Style for a local face paired (or not) with a server result.
pub fn box_style(result: Option<&DetectionResult>) -> BoxStyle {
    if let Some(result) = result {
        if result.is_success() || result.known_name().is_some() {
            return BoxStyle {
                matched: true,
                color: MATCHED_COLOR,
                label: result.display_name().to_string(),
            };
        }
    }
    BoxStyle {
        matched: false,
        color: UNMATCHED_COLOR,
        label: UNKNOWN_FACE.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverlayBox {
    pub region: FaceRegion,
    pub style: BoxStyle,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlaySurface {
    pub width: u32,
    pub height: u32,
    pub boxes: Vec<OverlayBox>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Frame not decoded yet; try again on the next refresh.
    NotReady,
    /// Local detection failed; surface left cleared.
    DetectFailed,
    Drawn { faces: usize, matched: usize },
}

pub struct OverlayRenderer {
    detector: Box<dyn FaceDetectorBackend>,
    surface: OverlaySurface,
    cycles: u64,
}

impl OverlayRenderer {
    pub fn new(detector: Box<dyn FaceDetectorBackend>) -> Self {
        Self {
            detector,
            surface: OverlaySurface::default(),
            cycles: 0,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn surface(&self) -> &OverlaySurface {
        &self.surface
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn render_cycle(&mut self, frame: &VideoFrame, results: &[DetectionResult]) -> RenderOutcome {
        if !frame.is_ready() {
            return RenderOutcome::NotReady;
        }
        self.cycles += 1;
        if self.surface.width != frame.width || self.surface.height != frame.height {
            log::debug!(
                "overlay surface resized to {}x{}",
                frame.width,
                frame.height
            );
            self.surface.width = frame.width;
            self.surface.height = frame.height;
        }
        self.surface.boxes.clear();

        let regions = match self.detector.detect(frame) {
            Ok(regions) => regions,
            Err(err) => {
                log::debug!("local face detection failed: {:#}", err);
                return RenderOutcome::DetectFailed;
            }
        };

        let mut matched = 0;
        for (idx, region) in regions.into_iter().enumerate() {
            let style = box_style(results.get(idx));
            if style.matched {
                matched += 1;
            }
            self.surface.boxes.push(OverlayBox { region, style });
        }
        RenderOutcome::Drawn {
            faces: self.surface.boxes.len(),
            matched,
        }
    }

    /// Copy of `frame` with the current boxes stroked on top.
    pub fn annotate(&self, frame: &VideoFrame) -> Result<RgbImage> {
        let mut image = frame.to_image()?;
        for overlay_box in &self.surface.boxes {
            stroke_rect(&mut image, &overlay_box.region, overlay_box.style.color);
        }
        Ok(image)
    }
}

fn stroke_rect(image: &mut RgbImage, region: &FaceRegion, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    let Some((left, top, right, bottom)) = region.pixel_bounds(width, height) else {
        return;
    };
    for y in top..bottom {
        for x in left..right {
            let on_edge = x < left + STROKE_WIDTH
                || x + STROKE_WIDTH >= right
                || y < top + STROKE_WIDTH
                || y + STROKE_WIDTH >= bottom;
            if on_edge {
                image.put_pixel(x, y, color);
            }
        }
    }
}
