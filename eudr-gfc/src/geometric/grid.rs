use crate::error::{ForestError, Result};

/// Row-major 2D grid of samples.
///
/// Used for raster bands, boolean masks and pixel-area grids. Grids are
/// never resized; combining two grids requires identical shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid<T> {
    height: usize,
    width: usize,
    data: Vec<T>,
}

/// Boolean class or zone mask
pub type Mask = Grid<bool>;

impl<T: Clone> Grid<T> {
    /// Grid of `height` x `width` cells all set to `value`
    pub fn filled(height: usize, width: usize, value: T) -> Self {
        Grid {
            height,
            width,
            data: vec![value; height * width],
        }
    }
}

impl<T> Grid<T> {
    /// Wrap row-major data, failing when its length does not match the shape
    pub fn from_vec(height: usize, width: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != height * width {
            return Err(ForestError::Input(format!(
                "grid data has {} values, expected {} for shape ({}, {})",
                data.len(),
                height * width,
                height,
                width
            )));
        }
        Ok(Grid {
            height,
            width,
            data,
        })
    }

    /// Build from nested rows; all rows must share the same length
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != width) {
            return Err(ForestError::Input("grid rows have unequal lengths".to_string()));
        }
        Grid::from_vec(height, width, rows.into_iter().flatten().collect())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// (height, width)
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.height && col < self.width {
            self.data.get(row * self.width + col)
        } else {
            None
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Fail with `ShapeMismatch` unless `other` has the same shape
    pub fn ensure_same_shape<U>(&self, other: &Grid<U>, context: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(ForestError::ShapeMismatch {
                context,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Cell-wise map into a new grid of the same shape
    pub fn map<U>(&self, f: impl Fn(&T) -> U) -> Grid<U> {
        Grid {
            height: self.height,
            width: self.width,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Cell-wise combination of two same-shaped grids
    pub fn zip_map<U, V>(
        &self,
        other: &Grid<U>,
        context: &'static str,
        f: impl Fn(&T, &U) -> V,
    ) -> Result<Grid<V>> {
        self.ensure_same_shape(other, context)?;
        Ok(Grid {
            height: self.height,
            width: self.width,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        })
    }
}

impl Mask {
    /// Cell-wise AND of two masks
    pub fn and(&self, other: &Mask) -> Result<Mask> {
        self.zip_map(other, "mask and", |a, b| *a && *b)
    }

    /// Number of true cells
    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|v| *v)
    }
}
