/// A columns x rows arrangement holding `element_count` cells in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    pub columns: usize,
    pub rows: usize,
    pub element_count: usize,
}

impl Grid {
    /// Picks the grid whose bounding box is closest to square for elements of
    /// `element_width` x `element_height`.
    ///
    /// Wide elements round the column count, tall (and square) elements take
    /// the ceiling. A zero count yields `1 x 0`.
    pub fn solve(count: usize, element_width: f64, element_height: f64) -> Grid {
        let columns = solve_columns(count as f64, element_width, element_height);
        Grid {
            columns,
            rows: count.div_ceil(columns),
            element_count: count,
        }
    }

    /// Same as [`Grid::solve`] for a fractional target count, used when a page
    /// size hint is derived from `total / max_pages`. `element_count` holds the
    /// resulting capacity.
    pub(crate) fn solve_target(target: f64, element_width: f64, element_height: f64) -> Grid {
        let columns = solve_columns(target, element_width, element_height);
        let rows = (target / columns as f64).ceil().max(0.0) as usize;
        Grid {
            columns,
            rows,
            element_count: columns * rows,
        }
    }

    pub fn capacity(&self) -> usize {
        self.columns * self.rows
    }

    /// Cell position of the `index`-th element, row-major.
    pub fn cell(&self, index: usize) -> (usize, usize) {
        (index % self.columns, index / self.columns)
    }
}

fn solve_columns(count: f64, element_width: f64, element_height: f64) -> usize {
    let aspect = element_width / element_height;
    let raw = (count / aspect).sqrt();
    let columns = if aspect > 1.0 { raw.round() } else { raw.ceil() };
    if columns.is_finite() && columns >= 1.0 {
        columns as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_elements_use_ceiling_of_sqrt() {
        let grid = Grid::solve(10, 100.0, 100.0);
        assert_eq!((grid.columns, grid.rows, grid.element_count), (4, 3, 10));
    }

    #[test]
    fn wide_elements_round_columns() {
        // aspect 2: sqrt(10 / 2) = 2.236 -> 2 columns
        let grid = Grid::solve(10, 200.0, 100.0);
        assert_eq!((grid.columns, grid.rows), (2, 5));
    }

    #[test]
    fn tall_elements_take_more_columns() {
        // aspect 0.5: sqrt(10 / 0.5) = 4.47 -> 5 columns
        let grid = Grid::solve(10, 100.0, 200.0);
        assert_eq!((grid.columns, grid.rows), (5, 2));
    }

    #[test]
    fn very_wide_single_element_clamps_to_one_column() {
        let grid = Grid::solve(1, 1000.0, 10.0);
        assert_eq!((grid.columns, grid.rows), (1, 1));
    }

    #[test]
    fn zero_count_is_one_by_zero() {
        let grid = Grid::solve(0, 100.0, 100.0);
        assert_eq!((grid.columns, grid.rows, grid.element_count), (1, 0, 0));
    }

    #[test]
    fn grid_is_smallest_row_major_rectangle() {
        for &(w, h) in &[(100.0, 100.0), (160.0, 90.0), (90.0, 160.0), (300.0, 7.0), (3.0, 500.0)] {
            for count in 1..=400usize {
                let grid = Grid::solve(count, w, h);
                assert!(grid.capacity() >= count, "{count} {w}x{h} -> {grid:?}");
                assert!(grid.columns * (grid.rows - 1) < count, "{count} {w}x{h} -> {grid:?}");
            }
        }
    }

    #[test]
    fn solve_is_deterministic() {
        let a = Grid::solve(37, 123.0, 77.0);
        let b = Grid::solve(37, 123.0, 77.0);
        assert_eq!(a, b);
    }

    #[test]
    fn fractional_target_rounds_up_to_full_rectangle() {
        // 10 / 3 = 3.33 -> 2 columns, ceil(1.67) = 2 rows
        let grid = Grid::solve_target(10.0 / 3.0, 100.0, 100.0);
        assert_eq!((grid.columns, grid.rows, grid.element_count), (2, 2, 4));
    }

    #[test]
    fn cell_walks_row_major() {
        let grid = Grid::solve(10, 100.0, 100.0);
        assert_eq!(grid.cell(0), (0, 0));
        assert_eq!(grid.cell(3), (3, 0));
        assert_eq!(grid.cell(4), (0, 1));
        assert_eq!(grid.cell(9), (1, 2));
    }
}
