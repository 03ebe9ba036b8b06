/// Face region in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Integer pixel bounds clamped to a `frame_width` x `frame_height` frame,
    /// as `(left, top, right, bottom)` with exclusive right/bottom. `None` when
    /// the region lies entirely outside the frame.
    pub fn pixel_bounds(&self, frame_width: u32, frame_height: u32) -> Option<(u32, u32, u32, u32)> {
        let clamp = |value: f32, max: u32| value.round().clamp(0.0, max as f32) as u32;
        let left = clamp(self.x, frame_width);
        let top = clamp(self.y, frame_height);
        let right = clamp(self.x + self.width, frame_width);
        let bottom = clamp(self.y + self.height, frame_height);
        if right <= left || bottom <= top {
            return None;
        }
        Some((left, top, right, bottom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, width: f32, height: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width,
            height,
            confidence: 1.0,
        }
    }

    #[test]
    fn bounds_are_clamped_to_frame() {
        assert_eq!(region(10.0, 20.0, 30.0, 40.0).pixel_bounds(100, 100), Some((10, 20, 40, 60)));
        assert_eq!(region(-5.0, -5.0, 20.0, 20.0).pixel_bounds(100, 100), Some((0, 0, 15, 15)));
        assert_eq!(region(90.0, 90.0, 50.0, 50.0).pixel_bounds(100, 100), Some((90, 90, 100, 100)));
        assert_eq!(region(200.0, 0.0, 10.0, 10.0).pixel_bounds(100, 100), None);
    }
}
