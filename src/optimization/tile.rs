use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::TranslationModel;
use crate::data::{PixelBlockAccess, RegionOfInterest};

/// Identity of a tile: which image and which timepoint of it. Orders by
/// timepoint first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub timepoint: usize,
    pub id: usize,
}

impl TileKey {
    pub fn new(id: usize, timepoint: usize) -> Self {
        Self { timepoint, id }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tile {} @ t{}", self.id, self.timepoint)
    }
}

/// One image at one timepoint together with its position in the mosaic.
#[derive(Clone)]
pub struct Tile {
    pub key: TileKey,
    pub image: Arc<dyn PixelBlockAccess>,
    /// User region restricting registration to part of the tile.
    pub roi: Option<RegionOfInterest>,
    pub model: TranslationModel,
}

impl Tile {
    pub fn new(id: usize, timepoint: usize, image: Arc<dyn PixelBlockAccess>) -> Self {
        let model = TranslationModel::new(image.num_dimensions());
        Self {
            key: TileKey::new(id, timepoint),
            image,
            roi: None,
            model,
        }
    }

    /// Starts the tile at an approximate position, e.g. from a grid layout.
    pub fn at_position(mut self, position: &[f64]) -> Self {
        self.model.set_translation(position);
        self
    }

    pub fn with_roi(mut self, roi: Option<RegionOfInterest>) -> Self {
        self.roi = roi;
        self
    }

    pub fn dimensions(&self) -> &[usize] {
        self.image.dimensions()
    }

    pub fn position(&self) -> &[f64] {
        self.model.translation()
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("dimensions", &self.image.dimensions())
            .field("pixel_type", &self.image.pixel_type())
            .field("roi", &self.roi)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_order_by_timepoint_then_id() {
        let mut keys = vec![TileKey::new(2, 1), TileKey::new(1, 2), TileKey::new(1, 1)];
        keys.sort();
        assert_eq!(keys, vec![TileKey::new(1, 1), TileKey::new(2, 1), TileKey::new(1, 2)]);
    }
}
