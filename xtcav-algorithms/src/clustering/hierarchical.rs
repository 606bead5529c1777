//! Agglomerative clustering with the nearest-neighbour chain algorithm.
#![allow(clippy::cast_precision_loss)]

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{euclidean, Grouping, GroupingStrategy};
use crate::union_find::UnionFind;

/// Inter-cluster distance update rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Linkage {
    /// Minimum increase of within-cluster variance. Expects a Euclidean metric.
    Ward,
    /// Mean pairwise distance.
    Average,
}

/// Distance between two profiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Metric {
    /// L2 distance.
    Euclidean,
    /// One minus the cosine similarity.
    Cosine,
    /// L1 distance.
    Manhattan,
}

impl Metric {
    /// Distance between `a` and `b`.
    #[must_use]
    pub fn distance(self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        match self {
            Self::Euclidean => euclidean(a, b),
            Self::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            Self::Cosine => {
                let norm_a = a.dot(&a).sqrt();
                let norm_b = b.dot(&b).sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return if norm_a == norm_b { 0.0 } else { 1.0 };
                }
                (1.0 - a.dot(&b) / (norm_a * norm_b)).max(0.0)
            }
        }
    }
}

/// One merge of the dendrogram.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Merge {
    /// A profile of the first merged cluster.
    pub a: usize,
    /// A profile of the second merged cluster.
    pub b: usize,
    /// Linkage distance at which the clusters merged.
    pub height: f64,
}

/// Full merge history of `n` profiles, ordered by height.
#[derive(Clone, Debug, PartialEq)]
pub struct Dendrogram {
    num_points: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Number of clustered profiles.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Merges in ascending height order.
    #[must_use]
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Flat grouping with `k` groups (clamped to `1..=n`).
    #[must_use]
    pub fn cut(&self, k: usize) -> Grouping {
        let n = self.num_points;
        if n == 0 {
            return Grouping::from_labels(std::iter::empty());
        }
        let k = k.clamp(1, n);
        let mut uf = UnionFind::new(n);
        for merge in self.merges.iter().take(n - k) {
            uf.union(merge.a, merge.b);
        }
        Grouping::from_labels((0..n).map(|i| Some(uf.find(i))))
    }
}

/// Agglomerative clustering with a configurable linkage and metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HierarchicalClustering {
    linkage: Linkage,
    metric: Metric,
}

impl HierarchicalClustering {
    /// Creates a clustering with the given linkage and metric.
    #[must_use]
    pub fn new(linkage: Linkage, metric: Metric) -> Self {
        Self { linkage, metric }
    }

    /// Ward linkage on Euclidean distance.
    #[must_use]
    pub fn ward() -> Self {
        Self::new(Linkage::Ward, Metric::Euclidean)
    }

    /// Average linkage on `metric`.
    #[must_use]
    pub fn average(metric: Metric) -> Self {
        Self::new(Linkage::Average, metric)
    }

    fn pairwise(&self, data: ArrayView2<f64>) -> Vec<f64> {
        let n = data.nrows();
        let square = self.linkage == Linkage::Ward;
        let metric = self.metric;
        (0..n)
            .into_par_iter()
            .flat_map_iter(|i| {
                (0..n).map(move |j| {
                    let d = metric.distance(data.row(i), data.row(j));
                    if square {
                        d * d
                    } else {
                        d
                    }
                })
            })
            .collect()
    }

    /// Lance-Williams update of the distance from `c` to the union of `a`
    /// and `b`. Ward works on squared distances.
    fn update(&self, d_ca: f64, d_cb: f64, d_ab: f64, sizes: [f64; 3]) -> f64 {
        let [sa, sb, sc] = sizes;
        match self.linkage {
            Linkage::Ward => {
                ((sa + sc) * d_ca + (sb + sc) * d_cb - sc * d_ab) / (sa + sb + sc)
            }
            Linkage::Average => (sa * d_ca + sb * d_cb) / (sa + sb),
        }
    }

    /// Builds the full dendrogram of the rows of `data`.
    #[must_use]
    pub fn dendrogram(&self, data: ArrayView2<f64>) -> Dendrogram {
        let n = data.nrows();
        let mut dist = self.pairwise(data);
        let mut size = vec![1usize; n];
        let mut active = vec![true; n];
        let mut chain: Vec<usize> = Vec::with_capacity(n);
        let mut merges = Vec::with_capacity(n.saturating_sub(1));

        'merging: for _ in 1..n {
            if chain.is_empty() {
                match active.iter().position(|&a| a) {
                    Some(first) => chain.push(first),
                    None => break,
                }
            }

            // Grow the chain until its last two clusters are reciprocal
            // nearest neighbours.
            let (a, b) = loop {
                let a = chain[chain.len() - 1];
                let prev = (chain.len() >= 2).then(|| chain[chain.len() - 2]);

                let mut best = prev;
                let mut best_d = prev.map_or(f64::INFINITY, |p| dist[a * n + p]);
                for c in (0..n).filter(|&c| c != a && active[c]) {
                    let d = dist[a * n + c];
                    if best.is_none() || d < best_d {
                        best = Some(c);
                        best_d = d;
                    }
                }

                let Some(b) = best else {
                    break 'merging;
                };
                if Some(b) == prev {
                    break (a, b);
                }
                chain.push(b);
            };
            chain.truncate(chain.len() - 2);

            let d_ab = dist[a * n + b];
            let (keep, gone) = (a.min(b), a.max(b));
            let (sa, sb) = (size[a] as f64, size[b] as f64);
            for c in 0..n {
                if !active[c] || c == a || c == b {
                    continue;
                }
                let updated = self.update(
                    dist[c * n + a],
                    dist[c * n + b],
                    d_ab,
                    [sa, sb, size[c] as f64],
                );
                dist[keep * n + c] = updated;
                dist[c * n + keep] = updated;
            }
            active[gone] = false;
            size[keep] = size[a] + size[b];

            let height = if self.linkage == Linkage::Ward {
                d_ab.max(0.0).sqrt()
            } else {
                d_ab
            };
            merges.push(Merge {
                a: keep,
                b: gone,
                height,
            });
        }

        merges.sort_by(|x, y| x.height.total_cmp(&y.height));
        Dendrogram {
            num_points: n,
            merges,
        }
    }
}

impl GroupingStrategy for HierarchicalClustering {
    fn assign(&self, data: ArrayView2<f64>, num_groups: usize) -> Grouping {
        self.dendrogram(data).cut(num_groups)
    }

    fn name(&self) -> &'static str {
        match (self.linkage, self.metric) {
            (Linkage::Ward, _) => "Ward",
            (Linkage::Average, Metric::Cosine) => "AverageCosine",
            (Linkage::Average, Metric::Manhattan) => "AverageL1",
            (Linkage::Average, Metric::Euclidean) => "Average",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_average_linkage_heights() {
        let data = array![[0.0], [1.0], [5.0], [6.0], [20.0]];
        let tree = HierarchicalClustering::average(Metric::Euclidean).dendrogram(data.view());
        let heights: Vec<f64> = tree.merges().iter().map(|m| m.height).collect();
        assert_eq!(heights.len(), 4);
        assert_relative_eq!(heights[0], 1.0);
        assert_relative_eq!(heights[1], 1.0);
        assert_relative_eq!(heights[2], 5.0);
        // Mean distance from 20 to {0, 1, 5, 6}.
        assert_relative_eq!(heights[3], 17.0);
    }

    #[test]
    fn test_cut_levels() {
        let data = array![[0.0], [1.0], [5.0], [6.0], [20.0]];
        let tree = HierarchicalClustering::ward().dendrogram(data.view());
        assert_eq!(
            tree.cut(3).labels(),
            &[Some(0), Some(0), Some(1), Some(1), Some(2)]
        );
        assert_eq!(tree.cut(1).num_groups(), 1);
        assert_eq!(tree.cut(5).num_groups(), 5);
        assert_eq!(tree.cut(9).num_groups(), 5);
    }

    #[test]
    fn test_ward_heights_match_variance_increase() {
        // Two points at distance 2: Ward height is the Euclidean distance.
        let data = array![[0.0, 0.0], [2.0, 0.0]];
        let tree = HierarchicalClustering::ward().dendrogram(data.view());
        assert_relative_eq!(tree.merges()[0].height, 2.0);
    }

    #[test]
    fn test_cosine_ignores_scale() {
        let metric = Metric::Cosine;
        let a = array![1.0, 2.0, 3.0];
        let b = array![2.0, 4.0, 6.0];
        assert_relative_eq!(metric.distance(a.view(), b.view()), 0.0, epsilon = 1e-12);
        let zero = array![0.0, 0.0, 0.0];
        assert_relative_eq!(metric.distance(a.view(), zero.view()), 1.0);
    }

    #[test]
    fn test_empty_and_single() {
        let empty = ndarray::Array2::<f64>::zeros((0, 3));
        assert!(HierarchicalClustering::ward()
            .assign(empty.view(), 2)
            .is_empty());
        let one = array![[1.0, 2.0]];
        assert_eq!(
            HierarchicalClustering::ward().assign(one.view(), 1).labels(),
            &[Some(0)]
        );
    }
}
