//! Density-based grouping of profiles.
#![allow(clippy::must_use_candidate, clippy::cast_precision_loss)]

use ndarray::ArrayView2;
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{euclidean, Grouping, GroupingStrategy};

/// DBSCAN parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DbscanConfig {
    /// Neighbourhood radius in profile space.
    pub epsilon: f64,
    /// Neighbours (the profile itself included) needed for a core profile.
    pub min_points: usize,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.5,
            min_points: 5,
        }
    }
}

impl DbscanConfig {
    /// Sets the neighbourhood radius.
    #[must_use]
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the core point threshold.
    #[must_use]
    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }
}

/// DBSCAN over profiles. The requested group count is ignored: density
/// decides it, and noise profiles stay ungrouped.
#[derive(Clone, Debug, Default)]
pub struct DbscanGrouping {
    config: DbscanConfig,
}

/// Mutable tracking state used during expansion.
struct TrackingState {
    visited: Vec<bool>,
    noise: Vec<bool>,
    labels: Vec<Option<usize>>,
}

impl DbscanGrouping {
    /// Creates a DBSCAN grouping with the given parameters.
    pub fn new(config: DbscanConfig) -> Self {
        Self { config }
    }

    fn is_core(&self, neighbors: &[usize]) -> bool {
        neighbors.len() + 1 >= self.config.min_points
    }

    fn expand_cluster(
        &self,
        neighborhoods: &[Vec<usize>],
        seeds: &mut Vec<usize>,
        cluster_id: usize,
        tracking: &mut TrackingState,
    ) {
        let mut i = 0;
        while i < seeds.len() {
            let current = seeds[i];
            i += 1;

            if tracking.noise[current] {
                tracking.noise[current] = false;
                tracking.labels[current] = Some(cluster_id);
            }

            if !tracking.visited[current] {
                tracking.visited[current] = true;
                tracking.labels[current] = Some(cluster_id);

                let neighbors = &neighborhoods[current];
                if self.is_core(neighbors) {
                    seeds.extend_from_slice(neighbors);
                }
            } else if tracking.labels[current].is_none() {
                tracking.labels[current] = Some(cluster_id);
            }
        }
    }
}

/// Indices of every other row within `epsilon` of each row.
fn region_queries(data: ArrayView2<f64>, epsilon: f64) -> Vec<Vec<usize>> {
    let n = data.nrows();
    (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .filter(|&j| j != i && euclidean(data.row(i), data.row(j)) <= epsilon)
                .collect()
        })
        .collect()
}

impl GroupingStrategy for DbscanGrouping {
    fn assign(&self, data: ArrayView2<f64>, _num_groups: usize) -> Grouping {
        let n = data.nrows();
        let neighborhoods = region_queries(data, self.config.epsilon);
        let mut tracking = TrackingState {
            visited: vec![false; n],
            noise: vec![false; n],
            labels: vec![None; n],
        };
        let mut seeds = Vec::new();
        let mut current_cluster_id = 0;

        for i in 0..n {
            if tracking.visited[i] {
                continue;
            }
            tracking.visited[i] = true;

            if self.is_core(&neighborhoods[i]) {
                tracking.labels[i] = Some(current_cluster_id);
                seeds.clear();
                seeds.extend_from_slice(&neighborhoods[i]);
                self.expand_cluster(&neighborhoods, &mut seeds, current_cluster_id, &mut tracking);
                current_cluster_id += 1;
            } else {
                tracking.noise[i] = true;
            }
        }

        Grouping::from_labels(tracking.labels)
    }

    fn name(&self) -> &'static str {
        "DBSCAN"
    }
}
