//! Noise suppression and signal masking.
#![allow(clippy::cast_precision_loss)]

use log::warn;
use ndarray::{s, Array2, ArrayView2};
use xtcav_core::constants::{SNR_BORDER, VALID_PIXEL_FRACTION};
use xtcav_core::Rejection;

/// 5-tap binomial kernel, the fixed small Gaussian used for the blur.
const KERNEL: [f64; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Binary signal mask and the noise level it was cut at.
#[derive(Debug, Clone)]
pub struct Denoised {
    /// True where the blurred image is above the noise threshold.
    pub mask: Array2<bool>,
    /// Mean of the noise patch.
    pub noise_mean: f64,
    /// Standard deviation of the noise patch.
    pub noise_std: f64,
}

/// Mirror index without repeating the edge pixel (`dcba|bcd|cba`).
fn reflect_101(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// Separable 5x5 Gaussian blur.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn gaussian_blur(image: ArrayView2<f64>) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let mut horizontal = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            horizontal[[r, c]] = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &w)| w * image[[r, reflect_101(c as isize + k as isize - 2, cols)]])
                .sum::<f64>();
        }
    }

    let mut out = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            out[[r, c]] = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &w)| w * horizontal[[reflect_101(r as isize + k as isize - 2, rows), c]])
                .sum::<f64>();
        }
    }
    out
}

/// Blurs the image, estimates the noise from the top-left corner and keeps
/// pixels above `mean + snr_filter * std`.
///
/// If every image ends up empty, lower `snr_filter` for both the reference
/// and the lasing analysis.
///
/// # Errors
///
/// [`Rejection::Empty`] when nothing survives, or when too few pixels do to
/// be more than noise.
pub fn denoise(image: ArrayView2<f64>, snr_filter: f64) -> Result<Denoised, Rejection> {
    let filtered = gaussian_blur(image);

    if filtered.sum() <= 0.0 {
        warn!("image completely empty after background subtraction");
        return Err(Rejection::Empty);
    }

    let (rows, cols) = filtered.dim();
    let patch = filtered.slice(s![..SNR_BORDER.min(rows), ..SNR_BORDER.min(cols)]);
    let noise_mean = patch.mean().unwrap_or(0.0);
    let noise_std = patch.std(0.0);
    let threshold = noise_mean + snr_filter * noise_std;

    let mask = filtered.mapv(|v| v > threshold);
    let kept = mask.iter().filter(|&&m| m).count();
    if kept == 0 {
        warn!("image completely empty after denoising");
        return Err(Rejection::Empty);
    }
    if (kept as f64) / (mask.len() as f64) < VALID_PIXEL_FRACTION {
        warn!(
            "fewer than {:.2}% of pixels non-zero after denoising, image will not be used",
            VALID_PIXEL_FRACTION * 100.0
        );
        return Err(Rejection::Empty);
    }

    Ok(Denoised {
        mask,
        noise_mean,
        noise_std,
    })
}
