/// A square 2D grid of cell values, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    size: usize,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new_with(size: usize, value: T) -> Self {
        Self {
            size,
            data: vec![value; size * size],
        }
    }

    /// Build a grid from row vectors. Every row must have `rows.len()` cells.
    pub fn from_rows(rows: Vec<Vec<T>>) -> Self {
        let size = rows.len();
        let mut data = Vec::with_capacity(size * size);
        for row in rows {
            assert_eq!(row.len(), size, "grid rows must be square");
            data.extend(row);
        }
        Self { size, data }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn index(&self, i: usize, j: usize) -> usize {
        i * self.size + j
    }

    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[self.index(i, j)]
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        let idx = self.index(i, j);
        &mut self.data[idx]
    }

    pub fn set(&mut self, i: usize, j: usize, value: T) {
        let idx = self.index(i, j);
        self.data[idx] = value;
    }

    /// Iterate over all cells as `(row, column, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        self.data.iter().enumerate().map(move |(idx, val)| {
            let i = idx / self.size;
            let j = idx % self.size;
            (i, j, val)
        })
    }

    pub fn values(&self) -> &[T] {
        &self.data
    }
}

impl Grid<f64> {
    /// Global minimum and maximum over the whole grid.
    pub fn min_max(&self) -> (f64, f64) {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for &v in &self.data {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_layout() {
        let mut grid = Grid::new_with(3, 0.0f64);
        grid.set(1, 2, 5.0);
        assert_eq!(*grid.get(1, 2), 5.0);
        assert_eq!(grid.values()[1 * 3 + 2], 5.0);
    }

    #[test]
    fn test_from_rows_matches_set() {
        let grid = Grid::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(*grid.get(0, 1), 2.0);
        assert_eq!(*grid.get(1, 0), 3.0);
    }

    #[test]
    fn test_min_max() {
        let grid = Grid::from_rows(vec![vec![-1.5, 2.0], vec![0.0, 0.5]]);
        assert_eq!(grid.min_max(), (-1.5, 2.0));
    }

    #[test]
    fn test_iter_coordinates() {
        let grid = Grid::from_rows(vec![vec![0.0, 1.0], vec![2.0, 3.0]]);
        let cells: Vec<(usize, usize, f64)> = grid.iter().map(|(i, j, &v)| (i, j, v)).collect();
        assert_eq!(
            cells,
            vec![(0, 0, 0.0), (0, 1, 1.0), (1, 0, 2.0), (1, 1, 3.0)]
        );
    }
}
