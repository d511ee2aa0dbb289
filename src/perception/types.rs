use serde::{Deserialize, Serialize};

/// Pixel position on the remote display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Frame geometry in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMeta {
    pub width: u32,
    pub height: u32,
}

/// Box in the grounding model's normalized space
/// [xmin, ymin, xmax, ymax], each coordinate in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox(pub [f32; 4]);

impl NormalizedBox {
    /// Centre of the box in physical pixel coordinates.
    pub fn center_physical(&self, meta: &FrameMeta) -> Point {
        let b = self.0;
        let cx = ((b[0] + b[2]) / 2.0 * meta.width as f32).round() as i32;
        let cy = ((b[1] + b[3]) / 2.0 * meta.height as f32).round() as i32;
        Point::new(cx, cy)
    }
}
