//! Per-bunch image statistics.
//!
//! Works on a stack of masked images, one slice per bunch, whose slices
//! together sum to one. Each bunch yields its projected profiles, centres of
//! mass, widths and the slice-wise energy centroid/spread that later become
//! the energy-vs-time curves.
#![allow(clippy::cast_precision_loss, clippy::similar_names)]

use log::debug;
use ndarray::{Array1, ArrayView2, ArrayView3, Axis, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::numeric::{divide_safe, half_max_span};
use crate::roi::Roi;

/// Statistics of one bunch in pixel units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageStatistics {
    /// Fraction of the total image intensity in this bunch.
    pub image_fraction: f64,
    /// Projection onto the x (time) axis.
    pub x_profile: Array1<f64>,
    /// Projection onto the y (energy) axis.
    pub y_profile: Array1<f64>,
    pub x_com: f64,
    pub y_com: f64,
    pub x_rms: f64,
    pub y_rms: f64,
    pub x_fwhm: usize,
    pub y_fwhm: usize,
    /// Energy centroid of every time slice.
    pub y_com_slice: Array1<f64>,
    /// Energy spread of every time slice.
    pub y_rms_slice: Array1<f64>,
}

impl ImageStatistics {
    /// Statistics of a bunch with no intensity: centred on the ROI, zero
    /// widths.
    #[must_use]
    pub fn degenerate(roi: &Roi) -> Self {
        let (y_mid, x_mid) = (roi.y_mid(), roi.x_mid());
        Self {
            image_fraction: 0.0,
            x_profile: Array1::zeros(roi.x_n()),
            y_profile: Array1::zeros(roi.y_n()),
            x_com: x_mid,
            y_com: y_mid,
            x_rms: 0.0,
            y_rms: 0.0,
            x_fwhm: 0,
            y_fwhm: 0,
            y_com_slice: Array1::from_elem(roi.x_n(), y_mid),
            y_rms_slice: Array1::zeros(roi.x_n()),
        }
    }

    /// True when the bunch carries no intensity.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.image_fraction == 0.0
    }

    /// Copy with every time-indexed profile reversed.
    #[must_use]
    pub fn mirrored_in_time(&self) -> Self {
        Self {
            x_profile: reversed(&self.x_profile),
            y_com_slice: reversed(&self.y_com_slice),
            y_rms_slice: reversed(&self.y_rms_slice),
            ..self.clone()
        }
    }
}

fn reversed(values: &Array1<f64>) -> Array1<f64> {
    values.iter().rev().copied().collect()
}

/// Statistics for every bunch of a `(bunch, y, x)` masked image stack.
///
/// A bunch with zero intensity is not an error: it gets
/// [`ImageStatistics::degenerate`] values.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] when the slices do not match the ROI.
pub fn image_statistics(stack: ArrayView3<f64>, roi: &Roi) -> Result<Vec<ImageStatistics>> {
    let (_, rows, cols) = stack.dim();
    if (rows, cols) != roi.shape() {
        return Err(Error::ShapeMismatch {
            expected: roi.shape(),
            found: (rows, cols),
        });
    }

    Ok(stack
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(bunch, slice)| {
            let stats = bunch_statistics(slice, roi);
            if stats.is_degenerate() {
                debug!("bunch {bunch} has no intensity, using ROI midpoint");
            }
            stats
        })
        .collect())
}

fn bunch_statistics(image: ArrayView2<f64>, roi: &Roi) -> ImageStatistics {
    let x = roi.x_axis();
    let y = roi.y_axis();

    let image_fraction = image.sum();
    if image_fraction == 0.0 {
        return ImageStatistics::degenerate(roi);
    }

    let x_profile = image.sum_axis(Axis(0));
    let y_profile = image.sum_axis(Axis(1));

    let x_com = x_profile.dot(x) / image_fraction;
    let x_rms = (x.mapv(|v| (v - x_com).powi(2)).dot(&x_profile) / image_fraction).sqrt();
    let x_fwhm = fwhm(&x_profile);

    let y_com = y_profile.dot(y) / image_fraction;
    let y_rms = (y.mapv(|v| (v - y_com).powi(2)).dot(&y_profile) / image_fraction).sqrt();
    let y_fwhm = fwhm(&y_profile);

    // Column-wise first and second moments along y.
    let y_moment = image.t().dot(y);
    let y_com_slice = divide_safe(y_moment.view(), x_profile.view(), y_com);

    let spread = Zip::from(image.columns())
        .and(&y_com_slice)
        .map_collect(|column, &centre| {
            column
                .iter()
                .zip(y.iter())
                .map(|(&w, &yv)| (yv - centre).powi(2) * w)
                .sum::<f64>()
        });
    let y_rms_slice = divide_safe(spread.view(), x_profile.view(), 0.0).mapv(f64::sqrt);

    ImageStatistics {
        image_fraction,
        x_profile,
        y_profile,
        x_com,
        y_com,
        x_rms,
        y_rms,
        x_fwhm,
        y_fwhm,
        y_com_slice,
        y_rms_slice,
    }
}

fn fwhm(profile: &Array1<f64>) -> usize {
    half_max_span(profile.view()).map_or(0, |(first, last)| last - first + 1)
}
