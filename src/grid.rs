//! Immutable 2-D grid index in web-mercator space, used to narrow the
//! candidate sets of the shape deduplicator and the stop reclusterer. Build
//! once per processor run, then query concurrently.

use rustc_hash::FxHashSet;
use std::hash::Hash;

/// A uniform grid over the bounding box of everything inserted at build
/// time. Values are small copyable handles (cluster indices, shape keys)
pub struct Grid<V: Copy + Eq + Hash> {
    cell_width: f64,
    cell_height: f64,
    x_cells: usize,
    y_cells: usize,
    llx: f64,
    lly: f64,
    cells: Vec<FxHashSet<V>>,
}

impl<V: Copy + Eq + Hash> Grid<V> {
    /// Creates a grid covering the bounding box of `points` (mercator x/y),
    /// with the given cell edge length in mercator meters
    pub fn new<'a, I>(points: I, cell_size: f64) -> Grid<V>
    where
        I: IntoIterator<Item = &'a (f64, f64)>,
    {
        let mut llx = f64::INFINITY;
        let mut lly = f64::INFINITY;
        let mut urx = f64::NEG_INFINITY;
        let mut ury = f64::NEG_INFINITY;

        for &(x, y) in points {
            llx = llx.min(x);
            lly = lly.min(y);
            urx = urx.max(x);
            ury = ury.max(y);
        }

        let (width, height) = (urx - llx, ury - lly);
        if !width.is_finite() || !height.is_finite() || width < 0.0 || height < 0.0 {
            return Grid {
                cell_width: cell_size,
                cell_height: cell_size,
                x_cells: 0,
                y_cells: 0,
                llx: 0.0,
                lly: 0.0,
                cells: Vec::new(),
            };
        }

        let x_cells = (width / cell_size).ceil() as usize + 1;
        let y_cells = (height / cell_size).ceil() as usize + 1;

        Grid {
            cell_width: cell_size,
            cell_height: cell_size,
            x_cells,
            y_cells,
            llx,
            lly,
            cells: vec![FxHashSet::default(); x_cells * y_cells],
        }
    }

    fn cell_x(&self, x: f64) -> usize {
        (((x - self.llx).max(0.0)) / self.cell_width) as usize
    }

    fn cell_y(&self, y: f64) -> usize {
        (((y - self.lly).max(0.0)) / self.cell_height) as usize
    }

    /// Registers a value at a single point
    pub fn add_point(&mut self, x: f64, y: f64, value: V) {
        let (cx, cy) = (self.cell_x(x), self.cell_y(y));
        if cx >= self.x_cells || cy >= self.y_cells {
            return;
        }
        self.cells[cy * self.x_cells + cx].insert(value);
    }

    /// Registers a value along a segment, in every cell the segment crosses
    pub fn add_segment(&mut self, ax: f64, ay: f64, bx: f64, by: f64, value: V) {
        let sw_x = self.cell_x(ax.min(bx));
        let sw_y = self.cell_y(ay.min(by));
        let ne_x = self.cell_x(ax.max(bx)).min(self.x_cells.saturating_sub(1));
        let ne_y = self.cell_y(ay.max(by)).min(self.y_cells.saturating_sub(1));

        for cx in sw_x..=ne_x {
            for cy in sw_y..=ne_y {
                if cx >= self.x_cells || cy >= self.y_cells {
                    continue;
                }
                if self.segment_intersects_cell(ax, ay, bx, by, cx, cy) {
                    self.cells[cy * self.x_cells + cx].insert(value);
                }
            }
        }
    }

    /// All values registered within distance `d` of the point, by cell
    /// neighborhood (a superset of the exact answer)
    pub fn neighbors(&self, x: f64, y: f64, d: f64) -> FxHashSet<V> {
        let mut ret = FxHashSet::default();
        if self.cells.is_empty() {
            return ret;
        }

        let x_pad = (d / self.cell_width).ceil() as usize;
        let y_pad = (d / self.cell_height).ceil() as usize;

        let cx = self.cell_x(x);
        let cy = self.cell_y(y);

        let sw_x = cx.saturating_sub(x_pad);
        let sw_y = cy.saturating_sub(y_pad);
        let ne_x = (cx + x_pad).min(self.x_cells - 1);
        let ne_y = (cy + y_pad).min(self.y_cells - 1);

        for gx in sw_x..=ne_x {
            for gy in sw_y..=ne_y {
                ret.extend(self.cells[gy * self.x_cells + gx].iter().copied());
            }
        }
        ret
    }

    // Cohen-Sutherland segment/cell intersection
    fn segment_intersects_cell(
        &self,
        mut x0: f64,
        mut y0: f64,
        mut x1: f64,
        mut y1: f64,
        cx: usize,
        cy: usize,
    ) -> bool {
        let xmin = self.llx + cx as f64 * self.cell_width;
        let ymin = self.lly + cy as f64 * self.cell_height;
        let xmax = xmin + self.cell_width;
        let ymax = ymin + self.cell_height;

        let ocode = |x: f64, y: f64| -> u8 {
            let mut code = 0u8;
            if x < xmin {
                code |= 1;
            } else if x > xmax {
                code |= 2;
            }
            if y < ymin {
                code |= 4;
            } else if y > ymax {
                code |= 8;
            }
            code
        };

        let mut code0 = ocode(x0, y0);
        let mut code1 = ocode(x1, y1);

        loop {
            if code0 | code1 == 0 {
                return true;
            }
            if code0 & code1 != 0 {
                return false;
            }

            let out = if code0 != 0 { code0 } else { code1 };
            let (x, y);
            if out & 8 != 0 {
                x = x0 + (x1 - x0) * (ymax - y0) / (y1 - y0);
                y = ymax;
            } else if out & 4 != 0 {
                x = x0 + (x1 - x0) * (ymin - y0) / (y1 - y0);
                y = ymin;
            } else if out & 2 != 0 {
                y = y0 + (y1 - y0) * (xmax - x0) / (x1 - x0);
                x = xmax;
            } else {
                y = y0 + (y1 - y0) * (xmin - x0) / (x1 - x0);
                x = xmin;
            }

            if out == code0 {
                x0 = x;
                y0 = y;
                code0 = ocode(x0, y0);
            } else {
                x1 = x;
                y1 = y;
                code1 = ocode(x1, y1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_neighbors_within_radius() {
        let pts = vec![(0.0, 0.0), (20_000.0, 20_000.0)];
        let mut grid: Grid<u32> = Grid::new(&pts, 5_000.0);
        grid.add_point(0.0, 0.0, 1);
        grid.add_point(20_000.0, 20_000.0, 2);

        let near_origin = grid.neighbors(100.0, 100.0, 1_000.0);
        assert!(near_origin.contains(&1));
        assert!(!near_origin.contains(&2));

        let wide = grid.neighbors(100.0, 100.0, 50_000.0);
        assert!(wide.contains(&1) && wide.contains(&2));
    }

    #[test]
    fn segments_are_registered_along_their_whole_run() {
        let pts = vec![(0.0, 0.0), (40_000.0, 0.0)];
        let mut grid: Grid<u8> = Grid::new(&pts, 5_000.0);
        grid.add_segment(0.0, 2_500.0, 40_000.0, 2_500.0, 7);

        // probing the middle of the segment finds it even though neither
        // endpoint is close
        let mid = grid.neighbors(20_000.0, 2_500.0, 1_000.0);
        assert!(mid.contains(&7));
    }

    #[test]
    fn diagonal_segment_skips_off_path_cells() {
        let pts = vec![(0.0, 0.0), (30_000.0, 30_000.0)];
        let mut grid: Grid<u8> = Grid::new(&pts, 5_000.0);
        grid.add_segment(0.0, 0.0, 30_000.0, 30_000.0, 1);

        // far off the diagonal, with a radius smaller than the detour
        let off = grid.neighbors(29_000.0, 1_000.0, 2_000.0);
        assert!(!off.contains(&1));
    }

    #[test]
    fn empty_grid_answers_empty() {
        let grid: Grid<u8> = Grid::new(&[], 5_000.0);
        assert!(grid.neighbors(0.0, 0.0, 1_000.0).is_empty());
    }
}
