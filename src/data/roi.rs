use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in the x/y plane of a tile. For 3D tiles it spans
/// the full z extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> [usize; 2] {
        [self.x, self.y]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the rectangle lies inside a block with the given extents.
    pub fn fits(&self, dimensions: &[usize]) -> bool {
        dimensions.len() >= 2
            && !self.is_empty()
            && self.x + self.width <= dimensions[0]
            && self.y + self.height <= dimensions[1]
    }
}

/// A user-drawn region on a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionOfInterest {
    Rectangle(Rect),
    Polygon(Vec<(f32, f32)>),
}

impl RegionOfInterest {
    pub fn rectangle(&self) -> Option<Rect> {
        match self {
            RegionOfInterest::Rectangle(rect) => Some(*rect),
            RegionOfInterest::Polygon(_) => None,
        }
    }
}

/// Registration only understands rectangles; any other shape means "whole tile".
pub fn only_rectangular(roi: Option<&RegionOfInterest>) -> Option<Rect> {
    roi.and_then(RegionOfInterest::rectangle)
}
