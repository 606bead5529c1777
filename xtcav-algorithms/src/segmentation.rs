//! Splitting a signal mask into per-bunch masks.
//!
//! Multi-bunch images show one island of signal per electron bunch. The
//! segmenter is pluggable; the default labels 8-connected islands.
#![allow(clippy::cast_precision_loss)]

use std::collections::HashMap;

use log::debug;
use ndarray::{Array3, ArrayView2, Axis};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::union_find::UnionFind;

/// Splits a binary mask into bunch masks.
pub trait BunchSegmenter: Send + Sync {
    /// Returns a `(bunches, rows, cols)` stack ordered along the time axis,
    /// or `None` when the mask holds no signal.
    ///
    /// The stack may hold fewer (or more) bunches than requested; the caller
    /// decides what to do with a mismatch.
    fn segment(&self, mask: ArrayView2<bool>, num_bunches: usize) -> Option<Array3<bool>>;

    /// Name of the segmentation method.
    fn name(&self) -> &'static str;
}

/// Connected-component segmentation parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConnectedComponentConfig {
    /// Islands smaller than this fraction of the largest island are noise.
    pub min_island_fraction: f64,
}

impl Default for ConnectedComponentConfig {
    fn default() -> Self {
        Self {
            min_island_fraction: 0.05,
        }
    }
}

impl ConnectedComponentConfig {
    /// Sets the minimum island size relative to the largest island.
    #[must_use]
    pub fn with_min_island_fraction(mut self, fraction: f64) -> Self {
        self.min_island_fraction = fraction;
        self
    }
}

/// Segments by 8-connected islands, keeping the largest `num_bunches`.
#[derive(Clone, Debug, Default)]
pub struct ConnectedComponentSegmenter {
    config: ConnectedComponentConfig,
}

impl ConnectedComponentSegmenter {
    /// Creates a segmenter with the given configuration.
    #[must_use]
    pub fn new(config: ConnectedComponentConfig) -> Self {
        Self { config }
    }

    /// Segmenter configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectedComponentConfig {
        &self.config
    }
}

struct Island {
    pixels: Vec<(usize, usize)>,
    mean_col: f64,
}

fn label_islands(mask: ArrayView2<bool>) -> Vec<Island> {
    let (rows, cols) = mask.dim();
    let mut uf = UnionFind::new(rows * cols);

    for r in 0..rows {
        for c in 0..cols {
            if !mask[[r, c]] {
                continue;
            }
            let idx = r * cols + c;
            if c + 1 < cols && mask[[r, c + 1]] {
                uf.union(idx, idx + 1);
            }
            if r + 1 < rows {
                if mask[[r + 1, c]] {
                    uf.union(idx, idx + cols);
                }
                if c + 1 < cols && mask[[r + 1, c + 1]] {
                    uf.union(idx, idx + cols + 1);
                }
                if c > 0 && mask[[r + 1, c - 1]] {
                    uf.union(idx, idx + cols - 1);
                }
            }
        }
    }

    let mut by_root: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for ((r, c), &set) in mask.indexed_iter() {
        if set {
            by_root.entry(uf.find(r * cols + c)).or_default().push((r, c));
        }
    }

    by_root
        .into_values()
        .map(|pixels| {
            let mean_col =
                pixels.iter().map(|&(_, c)| c as f64).sum::<f64>() / pixels.len() as f64;
            Island { pixels, mean_col }
        })
        .collect()
}

impl BunchSegmenter for ConnectedComponentSegmenter {
    fn segment(&self, mask: ArrayView2<bool>, num_bunches: usize) -> Option<Array3<bool>> {
        if !mask.iter().any(|&m| m) {
            return None;
        }
        if num_bunches <= 1 {
            return Some(mask.to_owned().insert_axis(Axis(0)));
        }

        let mut islands = label_islands(mask);
        islands.sort_by(|a, b| {
            b.pixels
                .len()
                .cmp(&a.pixels.len())
                .then(a.mean_col.total_cmp(&b.mean_col))
        });
        let largest = islands.first().map_or(0, |i| i.pixels.len());
        let min_size = self.config.min_island_fraction * largest as f64;
        let before = islands.len();
        islands.retain(|i| i.pixels.len() as f64 >= min_size);
        islands.truncate(num_bunches);
        debug!(
            "segmentation kept {} of {before} islands (requested {num_bunches})",
            islands.len()
        );

        islands.sort_by(|a, b| a.mean_col.total_cmp(&b.mean_col));

        let (rows, cols) = mask.dim();
        let mut out = Array3::from_elem((islands.len(), rows, cols), false);
        for (b, island) in islands.iter().enumerate() {
            for &(r, c) in &island.pixels {
                out[[b, r, c]] = true;
            }
        }
        Some(out)
    }

    fn name(&self) -> &'static str {
        "ConnectedComponents"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn block(mask: &mut Array2<bool>, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) {
        for r in rows {
            for c in cols.clone() {
                mask[[r, c]] = true;
            }
        }
    }

    #[test]
    fn test_single_bunch_returns_whole_mask() {
        let mut mask = Array2::from_elem((10, 10), false);
        block(&mut mask, 1..3, 1..3);
        block(&mut mask, 6..8, 6..8);
        let seg = ConnectedComponentSegmenter::default();
        let out = seg.segment(mask.view(), 1).unwrap();
        assert_eq!(out.dim(), (1, 10, 10));
        assert_eq!(out.index_axis(Axis(0), 0), mask);
    }

    #[test]
    fn test_empty_mask() {
        let mask = Array2::from_elem((4, 4), false);
        assert!(ConnectedComponentSegmenter::default()
            .segment(mask.view(), 2)
            .is_none());
    }

    #[test]
    fn test_two_islands_ordered_by_column() {
        let mut mask = Array2::from_elem((20, 30), false);
        // Larger island on the right.
        block(&mut mask, 2..12, 20..28);
        block(&mut mask, 5..10, 2..6);
        let out = ConnectedComponentSegmenter::default()
            .segment(mask.view(), 2)
            .unwrap();
        assert_eq!(out.len_of(Axis(0)), 2);
        assert!(out[[0, 6, 3]]);
        assert!(!out[[0, 5, 25]]);
        assert!(out[[1, 5, 25]]);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        let mut mask = Array2::from_elem((5, 5), false);
        mask[[0, 0]] = true;
        mask[[1, 1]] = true;
        mask[[2, 2]] = true;
        mask[[4, 0]] = true;
        let islands = label_islands(mask.view());
        assert_eq!(islands.len(), 2);
    }

    #[test]
    fn test_small_islands_dropped() {
        let mut mask = Array2::from_elem((20, 30), false);
        block(&mut mask, 2..12, 2..12);
        mask[[18, 28]] = true;
        let out = ConnectedComponentSegmenter::default()
            .segment(mask.view(), 2)
            .unwrap();
        assert_eq!(out.len_of(Axis(0)), 1);
    }
}
