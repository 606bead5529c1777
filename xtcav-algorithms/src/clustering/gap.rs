//! Gap statistic estimate of the number of groups.
//!
//! The within-group dispersion of the data is compared with that of uniform
//! reference sets drawn in the bounding box of the data's principal
//! components (Tibshirani, Walther and Hastie, 2001). Ward clustering is
//! used throughout, whatever method later assigns the groups.
#![allow(clippy::cast_precision_loss)]

use std::collections::BTreeMap;

use log::debug;
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::svd::{right_singular_vectors, to_array, to_matrix};
use super::{Dendrogram, Grouping, HierarchicalClustering};

/// Gap statistic parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GapStatisticConfig {
    /// Number of uniform reference sets.
    pub reference_sets: usize,
    /// Largest group count considered.
    pub max_groups: usize,
    /// Seed of the reference set generator; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for GapStatisticConfig {
    fn default() -> Self {
        Self {
            reference_sets: 20,
            max_groups: 10,
            seed: None,
        }
    }
}

impl GapStatisticConfig {
    /// Sets the number of reference sets.
    #[must_use]
    pub fn with_reference_sets(mut self, b: usize) -> Self {
        self.reference_sets = b;
        self
    }

    /// Sets the largest group count considered.
    #[must_use]
    pub fn with_max_groups(mut self, k: usize) -> Self {
        self.max_groups = k;
        self
    }

    /// Fixes the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Gap and its standard error for one group count.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GapEstimate {
    /// Mean reference log dispersion minus the observed one.
    pub gap: f64,
    /// Standard error of the reference log dispersions.
    pub sd: f64,
}

/// Sum over groups of the squared distances of members to their centroid.
#[must_use]
pub fn within_group_dispersion(data: ArrayView2<f64>, grouping: &Grouping) -> f64 {
    (0..grouping.num_groups())
        .map(|g| {
            let members = grouping.members(g);
            let rows = data.select(Axis(0), &members);
            let Some(centroid) = rows.mean_axis(Axis(0)) else {
                return 0.0;
            };
            rows.rows()
                .into_iter()
                .map(|row| (&row - &centroid).mapv(|v| v * v).sum())
                .sum::<f64>()
        })
        .sum()
}

fn log_dispersion(data: ArrayView2<f64>, tree: &Dendrogram, k: usize) -> f64 {
    within_group_dispersion(data, &tree.cut(k))
        .max(f64::MIN_POSITIVE)
        .ln()
}

/// A dataset with its Ward dendrogram, cut at any count on demand.
struct Clustered {
    data: Array2<f64>,
    tree: Dendrogram,
}

impl Clustered {
    fn new(data: Array2<f64>) -> Self {
        let tree = HierarchicalClustering::ward().dendrogram(data.view());
        Self { data, tree }
    }

    fn log_dispersion(&self, k: usize) -> f64 {
        log_dispersion(self.data.view(), &self.tree, k)
    }
}

/// Gap statistic group count estimator.
#[derive(Clone, Debug, Default)]
pub struct GapStatistic {
    config: GapStatisticConfig,
}

impl GapStatistic {
    /// Creates an estimator.
    #[must_use]
    pub fn new(config: GapStatisticConfig) -> Self {
        Self { config }
    }

    /// Draws the uniform reference sets. Drawing is sequential so a seeded
    /// run is reproducible.
    fn reference_sets(&self, data: ArrayView2<f64>) -> Vec<Array2<f64>> {
        let n = data.nrows();
        let Some(centre) = data.mean_axis(Axis(0)) else {
            return Vec::new();
        };
        let centred = &data - &centre;
        let matrix = to_matrix(centred.view());
        let Some(v_t) = right_singular_vectors(matrix.clone()) else {
            return Vec::new();
        };
        let projected = &matrix * v_t.transpose();
        let bounds: Vec<(f64, f64)> = projected
            .column_iter()
            .map(|col| (col.min(), col.max()))
            .collect();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        (0..self.config.reference_sets)
            .map(|_| {
                let uniform = DMatrix::from_fn(n, bounds.len(), |_, c| {
                    let (lo, hi) = bounds[c];
                    if hi > lo {
                        rng.gen_range(lo..hi)
                    } else {
                        lo
                    }
                });
                let mut set = to_array(&(uniform * &v_t));
                set += &centre;
                set
            })
            .collect()
    }

    /// Returns the estimated number of groups for the rows of `data`.
    ///
    /// Fewer than three rows give one group per row.
    #[must_use]
    pub fn optimal_group_count(&self, data: ArrayView2<f64>) -> usize {
        let n = data.nrows();
        let upper = self.config.max_groups.min(n.saturating_sub(1));
        if upper <= 2 {
            return 2.min(n);
        }

        let observed = HierarchicalClustering::ward().dendrogram(data);
        let references: Vec<Clustered> = self
            .reference_sets(data)
            .into_par_iter()
            .map(Clustered::new)
            .collect();
        if references.is_empty() {
            return 2;
        }

        let b = references.len() as f64;
        let mut memo: BTreeMap<usize, GapEstimate> = BTreeMap::new();
        let mut gap_at = |k: usize| -> GapEstimate {
            *memo.entry(k).or_insert_with(|| {
                let log_w = log_dispersion(data, &observed, k);
                let log_ref = Array1::from(
                    references
                        .par_iter()
                        .map(|r| r.log_dispersion(k))
                        .collect::<Vec<f64>>(),
                );
                GapEstimate {
                    gap: log_ref.mean().unwrap_or(0.0) - log_w,
                    sd: log_ref.std(0.0) * (1.0 + 1.0 / b).sqrt(),
                }
            })
        };

        let (mut min, mut max) = (2, upper);
        loop {
            let mid = min + (max - min) / 2;
            if mid == min || mid == max {
                break;
            }
            let here = gap_at(mid);
            let below = gap_at(mid - 1);
            if here.gap - here.sd < below.gap {
                max = mid;
            } else {
                min = mid;
            }
        }

        let top = gap_at(max);
        let below = gap_at(max - 1);
        let k = if top.gap - top.sd > below.gap { max } else { min };
        debug!("gap statistic: {k} groups for {n} profiles (searched 2..={upper})");
        k
    }
}
