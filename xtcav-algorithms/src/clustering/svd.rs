//! Singular value decomposition helpers and SVD-projected clustering.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use super::{Grouping, GroupingStrategy, HierarchicalClustering};

pub(crate) fn to_matrix(data: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = data.dim();
    DMatrix::from_fn(rows, cols, |r, c| data[[r, c]])
}

pub(crate) fn to_array(matrix: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(matrix.shape(), |(r, c)| matrix[(r, c)])
}

/// Right singular vectors of `matrix` as rows, by decreasing singular value.
///
/// Returns `None` if the decomposition did not produce them.
pub(crate) fn right_singular_vectors(matrix: DMatrix<f64>) -> Option<DMatrix<f64>> {
    let svd = matrix.svd(false, true);
    let v_t = svd.v_t?;
    let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
    order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
    Some(DMatrix::from_fn(order.len(), v_t.ncols(), |r, c| {
        v_t[(order[r], c)]
    }))
}

/// Ward clustering on the projection of the profiles onto their leading
/// right singular vectors.
#[derive(Clone, Copy, Debug)]
pub struct SvdProjection {
    components: usize,
}

impl Default for SvdProjection {
    fn default() -> Self {
        Self { components: 9 }
    }
}

impl SvdProjection {
    /// Keeps `components` singular vectors.
    #[must_use]
    pub fn new(components: usize) -> Self {
        Self {
            components: components.max(1),
        }
    }

    /// Coordinates of every profile on the leading singular vectors.
    #[must_use]
    pub fn project(&self, data: ArrayView2<f64>) -> Array2<f64> {
        let matrix = to_matrix(data);
        let Some(v_t) = right_singular_vectors(matrix.clone()) else {
            return data.to_owned();
        };
        let keep = self.components.min(v_t.nrows());
        let basis = v_t.rows(0, keep);
        to_array(&(&matrix * basis.transpose()))
    }
}

impl GroupingStrategy for SvdProjection {
    fn assign(&self, data: ArrayView2<f64>, num_groups: usize) -> Grouping {
        if data.nrows() == 0 {
            return Grouping::from_labels(std::iter::empty());
        }
        let projected = self.project(data);
        HierarchicalClustering::ward().assign(projected.view(), num_groups)
    }

    fn name(&self) -> &'static str {
        "SVD"
    }
}
