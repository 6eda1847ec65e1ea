//! Uniform spatial hash for the particle engines.
//!
//! Cells are stored in compressed rows: `cell_start[c]..cell_start[c + 1]`
//! indexes into `entries`. Points outside the domain are clamped to the
//! border cells, which keeps every pair closer than one cell size in
//! adjacent cells.

use glam::DVec3;

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    origin: DVec3,
    cell_size: f64,
    dims: [usize; 3],
    cell_start: Vec<usize>,
    entries: Vec<usize>,
    cell_of_entry: Vec<usize>,
}

impl SpatialGrid {
    /// Grid over the box `[min, max]` with cubic cells of `cell_size`.
    pub fn new(min: DVec3, max: DVec3, cell_size: f64) -> Self {
        let extent = (max - min).max(DVec3::splat(cell_size));
        let dims = [
            (extent.x / cell_size).ceil().max(1.0) as usize,
            (extent.y / cell_size).ceil().max(1.0) as usize,
            (extent.z / cell_size).ceil().max(1.0) as usize,
        ];
        let num_cells = dims[0] * dims[1] * dims[2];
        Self {
            origin: min,
            cell_size,
            dims,
            cell_start: vec![0; num_cells + 1],
            entries: Vec::new(),
            cell_of_entry: Vec::new(),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    /// Re-bin all points (counting sort).
    pub fn rebuild(&mut self, points: &[DVec3]) {
        self.cell_start.iter_mut().for_each(|c| *c = 0);
        let mut cells = std::mem::take(&mut self.cell_of_entry);
        cells.clear();
        cells.extend(points.iter().map(|&p| self.linear(self.cell_of(p))));
        self.cell_of_entry = cells;

        for &c in &self.cell_of_entry {
            self.cell_start[c + 1] += 1;
        }
        for c in 0..self.num_cells() {
            self.cell_start[c + 1] += self.cell_start[c];
        }

        self.entries.clear();
        self.entries.resize(points.len(), 0);
        let mut fill = self.cell_start.clone();
        for (i, &c) in self.cell_of_entry.iter().enumerate() {
            self.entries[fill[c]] = i;
            fill[c] += 1;
        }
    }

    /// Clamped integer cell coordinates of `p`.
    pub fn cell_of(&self, p: DVec3) -> [usize; 3] {
        let rel = (p - self.origin) / self.cell_size;
        let clamp = |v: f64, n: usize| -> usize {
            if v.is_nan() || v < 0.0 {
                0
            } else {
                (v as usize).min(n - 1)
            }
        };
        [
            clamp(rel.x, self.dims[0]),
            clamp(rel.y, self.dims[1]),
            clamp(rel.z, self.dims[2]),
        ]
    }

    /// Visit every entry in the 27 cells around `p`.
    pub fn for_each_neighbor(&self, p: DVec3, mut f: impl FnMut(usize)) {
        let c = self.cell_of(p);
        let range = |i: usize, n: usize| i.saturating_sub(1)..=(i + 1).min(n - 1);
        for z in range(c[2], self.dims[2]) {
            for y in range(c[1], self.dims[1]) {
                for x in range(c[0], self.dims[0]) {
                    let cell = self.linear([x, y, z]);
                    for &i in &self.entries[self.cell_start[cell]..self.cell_start[cell + 1]] {
                        f(i);
                    }
                }
            }
        }
    }

    /// Visit every entry in cells overlapping the box `[min, max]`.
    pub fn for_each_in_box(&self, min: DVec3, max: DVec3, mut f: impl FnMut(usize)) {
        let lo = self.cell_of(min);
        let hi = self.cell_of(max);
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let cell = self.linear([x, y, z]);
                    for &i in &self.entries[self.cell_start[cell]..self.cell_start[cell + 1]] {
                        f(i);
                    }
                }
            }
        }
    }

    fn linear(&self, c: [usize; 3]) -> usize {
        (c[2] * self.dims[1] + c[1]) * self.dims[0] + c[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbors_found() {
        let mut grid = SpatialGrid::new(DVec3::ZERO, DVec3::splat(1.0), 0.1);
        let points = vec![
            DVec3::new(0.05, 0.05, 0.05),
            DVec3::new(0.12, 0.05, 0.05),
            DVec3::new(0.9, 0.9, 0.9),
        ];
        grid.rebuild(&points);

        let mut found = Vec::new();
        grid.for_each_neighbor(points[0], |i| found.push(i));
        found.sort_unstable();
        assert_eq!(found, vec![0, 1]);
    }

    #[test]
    fn test_out_of_domain_points_are_clamped() {
        let mut grid = SpatialGrid::new(DVec3::ZERO, DVec3::splat(1.0), 0.25);
        let points = vec![DVec3::new(0.5, 0.5, 5.0), DVec3::new(0.5, 0.5, 0.9)];
        grid.rebuild(&points);

        let mut found = Vec::new();
        grid.for_each_neighbor(points[0], |i| found.push(i));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_box_query() {
        let mut grid = SpatialGrid::new(DVec3::ZERO, DVec3::splat(1.0), 0.1);
        let points: Vec<DVec3> = (0..10).map(|i| DVec3::splat(0.05 + 0.1 * i as f64)).collect();
        grid.rebuild(&points);

        let mut found = Vec::new();
        grid.for_each_in_box(DVec3::splat(0.31), DVec3::splat(0.55), |i| found.push(i));
        found.sort_unstable();
        assert_eq!(found, vec![3, 4, 5]);
    }
}
