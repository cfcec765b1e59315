use serde::{Deserialize, Serialize};

use crate::pipeline::TilePlacement;

/// Euclidean distance between an estimated and a true translation.
pub fn translation_error(estimated: &[f64], expected: &[f64]) -> f64 {
    estimated
        .iter()
        .zip(expected)
        .map(|(e, t)| (e - t).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Placement errors of a stitching run against known tile origins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionErrorSummary {
    /// Error per placed tile, in placement order.
    pub errors: Vec<f64>,
    pub mean_error: f64,
    pub max_error: f64,
    /// Tiles with an error of at most the tolerance.
    pub within_tolerance: usize,
    /// Expected tiles the run did not place.
    pub missing: usize,
}

/// Compares `placements` with `expected[id - 1]` after removing the global
/// offset, which is fixed by the first placed tile.
pub fn position_errors(placements: &[TilePlacement], expected: &[Vec<f64>], tolerance: f64) -> PositionErrorSummary {
    let Some(reference) = placements.iter().find(|p| p.key.id >= 1 && p.key.id <= expected.len()) else {
        return PositionErrorSummary {
            errors: Vec::new(),
            mean_error: 0.0,
            max_error: 0.0,
            within_tolerance: 0,
            missing: expected.len(),
        };
    };
    let offset: Vec<f64> = reference
        .translation
        .iter()
        .zip(&expected[reference.key.id - 1])
        .map(|(placed, truth)| truth - placed)
        .collect();

    let errors: Vec<f64> = placements
        .iter()
        .filter(|p| p.key.id >= 1 && p.key.id <= expected.len())
        .map(|p| {
            let aligned: Vec<f64> = p.translation.iter().zip(&offset).map(|(t, o)| t + o).collect();
            translation_error(&aligned, &expected[p.key.id - 1])
        })
        .collect();

    let mean_error = if errors.is_empty() {
        0.0
    } else {
        errors.iter().sum::<f64>() / errors.len() as f64
    };

    PositionErrorSummary {
        mean_error,
        max_error: errors.iter().copied().fold(0.0, f64::max),
        within_tolerance: errors.iter().filter(|&&e| e <= tolerance).count(),
        missing: expected.len().saturating_sub(errors.len()),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::TileKey;

    fn placement(id: usize, translation: Vec<f64>) -> TilePlacement {
        TilePlacement {
            key: TileKey::new(id, 1),
            translation,
        }
    }

    #[test]
    fn test_translation_error() {
        assert_eq!(translation_error(&[3.0, 4.0], &[0.0, 0.0]), 5.0);
    }

    #[test]
    fn test_global_offset_is_ignored() {
        let expected = vec![vec![10.0, 5.0], vec![110.0, 5.0], vec![210.0, 6.0]];
        let placements = vec![
            placement(1, vec![0.0, 0.0]),
            placement(2, vec![100.0, 0.0]),
            placement(3, vec![202.0, 1.0]),
        ];
        let summary = position_errors(&placements, &expected, 1.0);
        assert_eq!(summary.errors, vec![0.0, 0.0, 2.0]);
        assert_eq!(summary.within_tolerance, 2);
        assert_eq!(summary.missing, 0);
        assert_eq!(summary.max_error, 2.0);
    }

    #[test]
    fn test_missing_tiles_are_counted() {
        let expected = vec![vec![0.0, 0.0], vec![50.0, 0.0]];
        let summary = position_errors(&[placement(1, vec![0.0, 0.0])], &expected, 0.5);
        assert_eq!(summary.missing, 1);
    }
}
