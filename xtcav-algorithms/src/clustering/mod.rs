//! Grouping of no-lasing profiles.
//!
//! The reference is split into groups of similar shots before averaging so a
//! lasing shot can be compared with the closest no-lasing behaviour. Each
//! method is a [`GroupingStrategy`]; [`ClusteringMethod`] selects one by
//! name and [`GroupSelector`] also picks the group count.

mod dbscan;
mod gap;
mod greedy;
mod hierarchical;
mod svd;

use std::collections::HashMap;

use log::{debug, warn};
use ndarray::ArrayView2;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use dbscan::{DbscanConfig, DbscanGrouping};
pub use gap::{within_group_dispersion, GapEstimate, GapStatistic, GapStatisticConfig};
pub use greedy::CorrelationGrouping;
pub use hierarchical::{Dendrogram, HierarchicalClustering, Linkage, Merge, Metric};
pub use svd::SvdProjection;

/// Assignment of profiles to groups.
///
/// Group indices are numbered in order of first appearance. A profile can
/// be left out of every group (`None`), which only density-based grouping
/// does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    labels: Vec<Option<usize>>,
    num_groups: usize,
}

impl Grouping {
    /// Builds a grouping from arbitrary labels, renumbering them.
    pub fn from_labels<I>(raw: I) -> Self
    where
        I: IntoIterator<Item = Option<usize>>,
    {
        let mut remap: HashMap<usize, usize> = HashMap::new();
        let labels = raw
            .into_iter()
            .map(|label| {
                label.map(|l| {
                    let next = remap.len();
                    *remap.entry(l).or_insert(next)
                })
            })
            .collect();
        Self {
            labels,
            num_groups: remap.len(),
        }
    }

    /// All `n` profiles in one group.
    #[must_use]
    pub fn single(n: usize) -> Self {
        Self {
            labels: vec![Some(0); n],
            num_groups: usize::from(n > 0),
        }
    }

    /// Every profile in its own group.
    #[must_use]
    pub fn singletons(n: usize) -> Self {
        Self {
            labels: (0..n).map(Some).collect(),
            num_groups: n,
        }
    }

    /// Number of profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when there are no profiles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of non-empty groups.
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    /// Group of every profile.
    #[must_use]
    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    /// Indices of the profiles in `group`, ascending.
    #[must_use]
    pub fn members(&self, group: usize) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(i, &l)| (l == Some(group)).then_some(i))
            .collect()
    }
}

/// A way of splitting profiles (rows of `data`) into groups.
pub trait GroupingStrategy: Send + Sync {
    /// Splits the rows of `data` into (at most) `num_groups` groups.
    fn assign(&self, data: ArrayView2<f64>, num_groups: usize) -> Grouping;

    /// Name of the strategy.
    fn name(&self) -> &'static str;
}

/// Selectable grouping method.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusteringMethod {
    /// Ward linkage on Euclidean distance.
    #[default]
    Hierarchical,
    /// Ward linkage after projection on the leading singular vectors.
    Svd,
    /// Average linkage on cosine distance.
    Cosine,
    /// Average linkage on Manhattan distance.
    L1,
    /// Density-based grouping.
    Dbscan(DbscanConfig),
    /// Greedy correlation grouping.
    Legacy,
}

impl ClusteringMethod {
    /// Parses a method name. Unknown names fall back to
    /// [`ClusteringMethod::Hierarchical`] with a warning.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "hierarchical" => Self::Hierarchical,
            "svd" => Self::Svd,
            "cosine" => Self::Cosine,
            "l1" => Self::L1,
            "kmeans" | "dbscan" => Self::Dbscan(DbscanConfig::default()),
            "old" | "legacy" => Self::Legacy,
            other => {
                warn!("unknown clustering method '{other}', using hierarchical");
                Self::Hierarchical
            }
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Svd => "svd",
            Self::Cosine => "cosine",
            Self::L1 => "l1",
            Self::Dbscan(_) => "dbscan",
            Self::Legacy => "legacy",
        }
    }

    /// Runs the selected strategy.
    #[must_use]
    pub fn assign(&self, data: ArrayView2<f64>, num_groups: usize) -> Grouping {
        match self {
            Self::Hierarchical => HierarchicalClustering::ward().assign(data, num_groups),
            Self::Svd => SvdProjection::default().assign(data, num_groups),
            Self::Cosine => {
                HierarchicalClustering::average(Metric::Cosine).assign(data, num_groups)
            }
            Self::L1 => HierarchicalClustering::average(Metric::Manhattan).assign(data, num_groups),
            Self::Dbscan(config) => DbscanGrouping::new(config.clone()).assign(data, num_groups),
            Self::Legacy => CorrelationGrouping.assign(data, num_groups),
        }
    }
}

/// Chooses the number of groups and assigns profiles to them.
#[derive(Clone, Debug, Default)]
pub struct GroupSelector {
    method: ClusteringMethod,
    num_groups: Option<usize>,
    gap: GapStatisticConfig,
}

impl GroupSelector {
    /// Creates a selector for `method`; the count comes from the gap
    /// statistic unless fixed with [`GroupSelector::with_num_groups`].
    #[must_use]
    pub fn new(method: ClusteringMethod) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// Fixes the number of groups.
    #[must_use]
    pub fn with_num_groups(mut self, num_groups: Option<usize>) -> Self {
        self.num_groups = num_groups;
        self
    }

    /// Sets the gap statistic parameters.
    #[must_use]
    pub fn with_gap_statistic(mut self, gap: GapStatisticConfig) -> Self {
        self.gap = gap;
        self
    }

    /// Groups the rows of `data`.
    #[must_use]
    pub fn select(&self, data: ArrayView2<f64>) -> Grouping {
        let n = data.nrows();
        if n <= 1 {
            return Grouping::single(n);
        }

        let k = self
            .num_groups
            .unwrap_or_else(|| GapStatistic::new(self.gap.clone()).optimal_group_count(data));
        if k >= n {
            debug!("{k} groups for {n} profiles, one group per profile");
            return Grouping::singletons(n);
        }

        let grouping = self.method.assign(data, k.max(1));
        if grouping.num_groups() == 0 {
            warn!(
                "{} grouping formed no group, averaging all profiles together",
                self.method.name()
            );
            return Grouping::single(n);
        }
        grouping
    }
}

/// Row-wise Euclidean distance.
pub(crate) fn euclidean(a: ndarray::ArrayView1<f64>, b: ndarray::ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
