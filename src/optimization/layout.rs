use serde::{Deserialize, Serialize};

use crate::error::StitchError;

/// Acquisition order of tiles on a regular grid, starting top left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GridOrder {
    RowByRow,
    ColumnByColumn,
    SnakeByRows,
    SnakeByColumns,
}

impl GridOrder {
    /// Grid cell `(column, row)` of the `index`-th tile.
    pub fn cell(self, index: usize, columns: usize, rows: usize) -> (usize, usize) {
        match self {
            GridOrder::RowByRow => (index % columns, index / columns),
            GridOrder::ColumnByColumn => (index / rows, index % rows),
            GridOrder::SnakeByRows => {
                let row = index / columns;
                let step = index % columns;
                let column = if row % 2 == 0 { step } else { columns - 1 - step };
                (column, row)
            }
            GridOrder::SnakeByColumns => {
                let column = index / rows;
                let step = index % rows;
                let row = if column % 2 == 0 { step } else { rows - 1 - step };
                (column, row)
            }
        }
    }
}

/// Approximate positions of `tile_dimensions.len()` tiles on a
/// `columns x rows` grid whose neighbours overlap by the given fractions.
///
/// The step between cells is the smallest tile extent times `1 - overlap`,
/// truncated to whole pixels.
pub fn grid_layout(
    tile_dimensions: &[Vec<usize>],
    columns: usize,
    rows: usize,
    overlap_x: f64,
    overlap_y: f64,
    order: GridOrder,
) -> crate::Result<Vec<Vec<f64>>> {
    if columns == 0 || rows == 0 || tile_dimensions.len() != columns * rows {
        return Err(StitchError::Configuration(format!(
            "a {}x{} grid needs {} tiles, got {}",
            columns,
            rows,
            columns * rows,
            tile_dimensions.len()
        ))
        .into());
    }
    if !(0.0..1.0).contains(&overlap_x) || !(0.0..1.0).contains(&overlap_y) {
        return Err(StitchError::Configuration(format!(
            "grid overlap must lie in [0, 1), got {} x {}",
            overlap_x, overlap_y
        ))
        .into());
    }

    let num_dimensions = tile_dimensions[0].len();
    if let Some(dims) = tile_dimensions.iter().find(|d| d.len() != num_dimensions) {
        return Err(StitchError::DimensionalityMismatch {
            first: num_dimensions,
            second: dims.len(),
        }
        .into());
    }

    let min_width = tile_dimensions.iter().map(|d| d[0]).min().unwrap_or(0);
    let min_height = tile_dimensions.iter().map(|d| d[1]).min().unwrap_or(0);
    let step_x = (min_width as f64 * (1.0 - overlap_x)).floor();
    let step_y = (min_height as f64 * (1.0 - overlap_y)).floor();

    Ok((0..tile_dimensions.len())
        .map(|index| {
            let (column, row) = order.cell(index, columns, rows);
            let mut position = vec![0.0; num_dimensions];
            position[0] = column as f64 * step_x;
            position[1] = row as f64 * step_y;
            position
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_order() {
        let cells: Vec<_> = (0..6).map(|i| GridOrder::SnakeByRows.cell(i, 3, 2)).collect();
        assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1)]);

        let cells: Vec<_> = (0..4).map(|i| GridOrder::ColumnByColumn.cell(i, 2, 2)).collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_row_layout_with_overlap() {
        let dims = vec![vec![125, 100]; 3];
        let positions = grid_layout(&dims, 3, 1, 0.2, 0.2, GridOrder::RowByRow).unwrap();
        assert_eq!(positions, vec![vec![0.0, 0.0], vec![100.0, 0.0], vec![200.0, 0.0]]);
    }

    #[test]
    fn test_wrong_tile_count_is_rejected() {
        let dims = vec![vec![64, 64]; 5];
        assert!(grid_layout(&dims, 3, 2, 0.1, 0.1, GridOrder::RowByRow).is_err());
    }
}
