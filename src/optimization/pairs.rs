use super::{ComparePair, Tile};
use crate::config::TimeSelect;
use crate::data::Rect;

/// Candidate pairs for two time-lapse images.
///
/// `first[t]` and `second[t]` are the tile indices of each image at timepoint
/// `t + 1`. Same-timepoint pairs come first; `Adjacent` adds consecutive
/// timepoints of each image, `AllToAll` every later timepoint.
pub fn time_lapse_pairs(first: &[usize], second: &[usize], time_select: TimeSelect, num_dimensions: usize) -> Vec<ComparePair> {
    let mut pairs: Vec<ComparePair> = first
        .iter()
        .zip(second)
        .map(|(&a, &b)| ComparePair::new(a, b, num_dimensions))
        .collect();

    for image in [first, second] {
        for i in 0..image.len() {
            let later = match time_select {
                TimeSelect::ApplyFirstToAll => 0..0,
                TimeSelect::Adjacent => (i + 1)..(i + 2).min(image.len()),
                TimeSelect::AllToAll => (i + 1)..image.len(),
            };
            for j in later {
                pairs.push(ComparePair::new(image[i], image[j], num_dimensions));
            }
        }
    }

    pairs
}

/// Pairs of tiles of the same timepoint whose approximate boxes overlap in x
/// and y (and z for volumes), each with the overlap region in both tiles.
pub fn overlapping_pairs(tiles: &[Tile]) -> Vec<ComparePair> {
    let mut pairs = Vec::new();
    for i in 0..tiles.len() {
        for j in (i + 1)..tiles.len() {
            if tiles[i].key.timepoint != tiles[j].key.timepoint {
                continue;
            }
            if let Some(rois) = overlap_rois(&tiles[i], &tiles[j]) {
                let num_dimensions = tiles[i].dimensions().len();
                pairs.push(ComparePair::new(i, j, num_dimensions).with_overlap_rois(Some(rois)));
            }
        }
    }
    pairs
}

/// The region shared by two tiles at their current (rounded) positions,
/// expressed in each tile's own coordinates.
pub fn overlap_rois(a: &Tile, b: &Tile) -> Option<(Rect, Rect)> {
    let (da, db) = (a.dimensions(), b.dimensions());
    if da.len() != db.len() {
        return None;
    }
    let pa: Vec<i64> = a.position().iter().map(|p| p.round() as i64).collect();
    let pb: Vec<i64> = b.position().iter().map(|p| p.round() as i64).collect();

    let mut lo = [0i64; 3];
    let mut hi = [0i64; 3];
    for d in 0..da.len() {
        lo[d] = pa[d].max(pb[d]);
        hi[d] = (pa[d] + da[d] as i64).min(pb[d] + db[d] as i64);
        if hi[d] - lo[d] < 2 {
            return None;
        }
    }

    let width = (hi[0] - lo[0]) as usize;
    let height = (hi[1] - lo[1]) as usize;
    let in_a = Rect::new((lo[0] - pa[0]) as usize, (lo[1] - pa[1]) as usize, width, height);
    let in_b = Rect::new((lo[0] - pb[0]) as usize, (lo[1] - pb[1]) as usize, width, height);
    Some((in_a, in_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ImageData, ImageStack};
    use ndarray::{ArrayD, IxDyn};
    use std::sync::Arc;

    fn tile(id: usize, size: [usize; 2], position: [f64; 2]) -> Tile {
        let plane = ArrayD::from_elem(IxDyn(&size), 0u8);
        let image = Arc::new(ImageData::from(ImageStack::from_plane(plane).unwrap()));
        Tile::new(id, 1, image).at_position(&position)
    }

    #[test]
    fn test_time_lapse_pairs() {
        let first = [0, 2, 4];
        let second = [1, 3, 5];

        assert_eq!(time_lapse_pairs(&first, &second, TimeSelect::ApplyFirstToAll, 2).len(), 3);

        let adjacent = time_lapse_pairs(&first, &second, TimeSelect::Adjacent, 2);
        assert_eq!(adjacent.len(), 3 + 2 + 2);
        assert_eq!((adjacent[3].first, adjacent[3].second), (0, 2));

        let all = time_lapse_pairs(&first, &second, TimeSelect::AllToAll, 2);
        assert_eq!(all.len(), 3 + 3 + 3);
    }

    #[test]
    fn test_overlap_rois() {
        let a = tile(1, [100, 80], [0.0, 0.0]);
        let b = tile(2, [100, 80], [80.0, 10.0]);

        let (ra, rb) = overlap_rois(&a, &b).unwrap();
        assert_eq!(ra, Rect::new(80, 10, 20, 70));
        assert_eq!(rb, Rect::new(0, 0, 20, 70));

        let far = tile(3, [100, 80], [250.0, 0.0]);
        assert!(overlap_rois(&a, &far).is_none());
    }

    #[test]
    fn test_overlapping_pairs_on_a_row() {
        let tiles = vec![
            tile(1, [50, 50], [0.0, 0.0]),
            tile(2, [50, 50], [40.0, 0.0]),
            tile(3, [50, 50], [80.0, 0.0]),
        ];
        let pairs = overlapping_pairs(&tiles);
        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].first, pairs[0].second), (0, 1));
        assert_eq!((pairs[1].first, pairs[1].second), (1, 2));
    }
}
