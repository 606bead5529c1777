//! Greedy correlation grouping.

use ndarray::ArrayView2;
use xtcav_core::numeric::pearson_r2;

use super::{Grouping, GroupingStrategy};

/// Fills groups of `ceil(n / k)` profiles one after another: each group
/// starts from the first unassigned profile and takes the unassigned
/// profiles most correlated with it (squared Pearson correlation).
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationGrouping;

impl GroupingStrategy for CorrelationGrouping {
    fn assign(&self, data: ArrayView2<f64>, num_groups: usize) -> Grouping {
        let n = data.nrows();
        if n == 0 {
            return Grouping::from_labels(std::iter::empty());
        }
        let group_size = n.div_ceil(num_groups.max(1));
        let mut labels: Vec<Option<usize>> = vec![None; n];
        let mut group = 0;

        while let Some(seed) = labels.iter().position(Option::is_none) {
            labels[seed] = Some(group);

            let mut candidates: Vec<(usize, f64)> = (0..n)
                .filter(|&i| labels[i].is_none())
                .map(|i| (i, pearson_r2(data.row(seed), data.row(i)).unwrap_or(0.0)))
                .collect();
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

            for &(i, _) in candidates.iter().take(group_size - 1) {
                labels[i] = Some(group);
            }
            group += 1;
        }

        Grouping::from_labels(labels)
    }

    fn name(&self) -> &'static str {
        "Correlation"
    }
}
