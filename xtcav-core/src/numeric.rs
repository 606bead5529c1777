//! Small numerical helpers shared across the pipeline.
#![allow(clippy::cast_precision_loss)]

use ndarray::{Array1, ArrayView1, Zip};

/// Element-wise `numer / denom`, with every non-finite ratio replaced by
/// `default`.
///
/// # Panics
///
/// Panics if the two inputs differ in length.
#[must_use]
pub fn divide_safe(numer: ArrayView1<f64>, denom: ArrayView1<f64>, default: f64) -> Array1<f64> {
    Zip::from(&numer).and(&denom).map_collect(|&n, &d| {
        let ratio = n / d;
        if ratio.is_finite() {
            ratio
        } else {
            default
        }
    })
}

/// Linear interpolation of `(xp, fp)` at `x`, zero outside `[xp[0], xp[-1]]`.
///
/// `xp` must be ascending.
#[must_use]
pub fn interp_linear(xp: ArrayView1<f64>, fp: ArrayView1<f64>, x: ArrayView1<f64>) -> Array1<f64> {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return Array1::zeros(x.len());
    }
    let first = xp[0];
    let last = xp[n - 1];
    x.mapv(|xi| {
        if xi.is_nan() || xi < first || xi > last {
            return 0.0;
        }
        if n == 1 {
            return fp[0];
        }
        // Index of the first sample strictly above xi, kept within (0, n).
        let upper = partition_point(xp, n, xi).clamp(1, n - 1);
        let (x0, x1) = (xp[upper - 1], xp[upper]);
        let (y0, y1) = (fp[upper - 1], fp[upper]);
        let span = x1 - x0;
        if span == 0.0 {
            y0
        } else {
            y0 + (y1 - y0) * (xi - x0) / span
        }
    })
}

fn partition_point(xp: ArrayView1<f64>, n: usize, value: f64) -> usize {
    let (mut lo, mut hi) = (0, n);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if xp[mid] <= value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Squared Pearson correlation between two equally sized curves.
///
/// Returns `None` when either curve is constant.
#[must_use]
pub fn pearson_r2(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a.iter().take(n).sum::<f64>() / n as f64;
    let mean_b = b.iter().take(n).sum::<f64>() / n as f64;
    let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
    for (&x, &y) in a.iter().zip(b.iter()).take(n) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a <= 0.0 || var_b <= 0.0 {
        return None;
    }
    let r2 = cov * cov / (var_a * var_b);
    r2.is_finite().then_some(r2)
}

/// First index where `values` is at least half its maximum, and the last.
#[must_use]
pub fn half_max_span(values: ArrayView1<f64>) -> Option<(usize, usize)> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let half = max / 2.0;
    let first = values.iter().position(|&v| v >= half)?;
    let last = values.iter().rposition(|&v| v >= half)?;
    Some((first, last))
}
