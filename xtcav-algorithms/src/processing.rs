//! Single-shot pipeline: raw camera image to [`ImageProfile`].
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use std::ops::Range;

use log::{debug, warn};
use ndarray::{s, Array3, ArrayView2, ArrayView3, Axis, Zip};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use xtcav_core::{
    image_statistics, physical_units, DarkBackground, Error, GlobalCalibration, ImageProfile,
    ImageStatistics, Rejection, Roi, ShotParameters, ShotWarning,
};

use crate::denoise::denoise;
use crate::segmentation::{BunchSegmenter, ConnectedComponentSegmenter};

/// Parameters of the single-shot pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShotProcessingConfig {
    /// Number of electron bunches expected per image.
    pub num_bunches: usize,
    /// Signal threshold in units of the noise standard deviation.
    pub snr_filter: f64,
    /// Expansion factor of the refined ROI around the signal.
    pub roi_expand: f64,
    /// Camera saturation level; shots peaking at or above it are rejected.
    pub saturation_value: f64,
}

impl Default for ShotProcessingConfig {
    fn default() -> Self {
        Self {
            num_bunches: 1,
            snr_filter: 10.0,
            roi_expand: 1.0,
            saturation_value: f64::from(u16::MAX),
        }
    }
}

impl ShotProcessingConfig {
    /// Sets the number of bunches.
    #[must_use]
    pub fn with_num_bunches(mut self, n: usize) -> Self {
        self.num_bunches = n;
        self
    }

    /// Sets the noise threshold.
    #[must_use]
    pub fn with_snr_filter(mut self, snr: f64) -> Self {
        self.snr_filter = snr;
        self
    }

    /// Sets the ROI expansion factor.
    #[must_use]
    pub fn with_roi_expand(mut self, expand: f64) -> Self {
        self.roi_expand = expand;
        self
    }

    /// Sets the saturation level.
    #[must_use]
    pub fn with_saturation_value(mut self, value: f64) -> Self {
        self.saturation_value = value;
        self
    }

    /// Checks the configuration for values the pipeline cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad value.
    pub fn validate(&self) -> Result<(), Error> {
        if self.num_bunches == 0 {
            return Err(Error::InvalidConfig("num_bunches must be at least 1".into()));
        }
        if !(self.roi_expand > 0.0) {
            return Err(Error::InvalidConfig("roi_expand must be positive".into()));
        }
        if self.snr_filter.is_nan() {
            return Err(Error::InvalidConfig("snr_filter is NaN".into()));
        }
        Ok(())
    }
}

/// A processed shot plus the intermediate image it was computed from.
#[derive(Debug, Clone)]
pub struct ProcessedShot {
    /// Statistics and calibration of the shot.
    pub profile: ImageProfile,
    /// Normalized `(bunch, y, x)` stack on the refined ROI.
    pub image: Array3<f64>,
    /// Recoverable conditions met on the way.
    pub warnings: Vec<ShotWarning>,
}

/// Turns raw camera frames into [`ImageProfile`]s.
pub struct SingleShotProcessor<S: BunchSegmenter = ConnectedComponentSegmenter> {
    config: ShotProcessingConfig,
    calibration: GlobalCalibration,
    dark_background: Option<DarkBackground>,
    segmenter: S,
}

impl SingleShotProcessor {
    /// Creates a processor with the default segmenter and no dark background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration is unusable.
    pub fn new(config: ShotProcessingConfig, calibration: GlobalCalibration) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            calibration,
            dark_background: None,
            segmenter: ConnectedComponentSegmenter::default(),
        })
    }
}

impl<S: BunchSegmenter> SingleShotProcessor<S> {
    /// Subtracts `background` from every shot it covers.
    #[must_use]
    pub fn with_dark_background(mut self, background: DarkBackground) -> Self {
        self.dark_background = Some(background);
        self
    }

    /// Replaces the bunch segmenter.
    #[must_use]
    pub fn with_segmenter<T: BunchSegmenter>(self, segmenter: T) -> SingleShotProcessor<T> {
        SingleShotProcessor {
            config: self.config,
            calibration: self.calibration,
            dark_background: self.dark_background,
            segmenter,
        }
    }

    /// Pipeline parameters.
    #[must_use]
    pub fn config(&self) -> &ShotProcessingConfig {
        &self.config
    }

    /// Calibration applied to every shot.
    #[must_use]
    pub fn calibration(&self) -> &GlobalCalibration {
        &self.calibration
    }

    /// Runs the full pipeline on one camera image covering `roi`.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] that stopped the shot. A rejected shot has
    /// no partial result.
    pub fn process(
        &self,
        image: Option<ArrayView2<f64>>,
        roi: &Roi,
        shot: &ShotParameters,
    ) -> Result<ProcessedShot, Rejection> {
        let Some(image) = image else {
            warn!("no camera image in event");
            return Err(Rejection::Empty);
        };
        if image.dim() != roi.shape() {
            return Err(Rejection::ShapeMismatch {
                expected: roi.shape(),
                found: image.dim(),
            });
        }

        let peak = image.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        if peak >= self.config.saturation_value {
            warn!(
                "saturated image: peak {peak} >= {}",
                self.config.saturation_value
            );
            return Err(Rejection::Saturated {
                max: peak,
                limit: self.config.saturation_value,
            });
        }

        let mut warnings = Vec::new();
        let subtracted = match &self.dark_background {
            Some(dark) => dark.subtract_from(image, roi).unwrap_or_else(|| {
                warnings.push(ShotWarning::IncompatibleRoi);
                image.to_owned()
            }),
            None => image.to_owned(),
        };

        let denoised = denoise(subtracted.view(), self.config.snr_filter)?;

        let num_bunches = self.config.num_bunches;
        let masks = self
            .segmenter
            .segment(denoised.mask.view(), num_bunches)
            .ok_or(Rejection::Empty)?;
        let found = masks.len_of(Axis(0));
        if found != num_bunches {
            warn!(
                "{} found {found} bunches, expected {num_bunches}",
                self.segmenter.name()
            );
            return Err(Rejection::BunchCountMismatch {
                expected: num_bunches,
                found,
            });
        }

        let (rows, cols) =
            refine_roi(masks.view(), self.config.roi_expand).ok_or(Rejection::Empty)?;
        let refined_roi = roi.crop(rows.clone(), cols.clone());
        debug!(
            "refined ROI: {} x {} at ({}, {})",
            refined_roi.x_n(),
            refined_roi.y_n(),
            refined_roi.x0(),
            refined_roi.y0()
        );

        let stack = mask_image(
            subtracted.slice(s![rows.clone(), cols.clone()]),
            denoised.noise_mean,
            masks.slice(s![.., rows, cols]),
        )
        .ok_or_else(|| {
            warn!("masked image has no intensity");
            Rejection::Empty
        })?;

        let stats = image_statistics(stack.view(), &refined_roi).map_err(|e| match e {
            Error::ShapeMismatch { expected, found } => {
                Rejection::ShapeMismatch { expected, found }
            }
            _ => Rejection::Empty,
        })?;
        for (bunch, s) in stats.iter().enumerate() {
            if s.is_degenerate() {
                warnings.push(ShotWarning::DegenerateBunch { bunch });
            }
        }

        let center = (stats[0].x_com, stats[0].y_com);
        let units = physical_units(&refined_roi, center, shot, &self.calibration);
        if !units.valid {
            return Err(Rejection::InvalidCalibration {
                cos_phase_diff: units.cos_phase_diff,
            });
        }

        // Time must run forward along the profile.
        let (image_stats, units) = if units.xfs_per_pix < 0.0 {
            (
                stats.iter().map(ImageStatistics::mirrored_in_time).collect(),
                units.mirrored_in_time(),
            )
        } else {
            (stats, units)
        };

        Ok(ProcessedShot {
            profile: ImageProfile {
                image_stats,
                roi: refined_roi,
                shot: shot.clone(),
                units,
            },
            image: stack,
            warnings,
        })
    }
}

/// Bounding box of the union of all bunch masks, expanded by `expand`
/// around its centre and clamped to the image.
///
/// Returns half-open `(rows, cols)` ranges, or `None` for an empty mask.
#[must_use]
pub fn refine_roi(masks: ArrayView3<bool>, expand: f64) -> Option<(Range<usize>, Range<usize>)> {
    let (_, rows, cols) = masks.dim();
    let union = masks.fold_axis(Axis(0), false, |&acc, &m| acc || m);

    let occupied_rows: Vec<usize> = (0..rows)
        .filter(|&r| union.row(r).iter().any(|&m| m))
        .collect();
    let occupied_cols: Vec<usize> = (0..cols)
        .filter(|&c| union.column(c).iter().any(|&m| m))
        .collect();

    let rows = expanded_range(*occupied_rows.first()?, *occupied_rows.last()?, expand, rows);
    let cols = expanded_range(*occupied_cols.first()?, *occupied_cols.last()?, expand, cols);
    Some((rows, cols))
}

fn expanded_range(first: usize, last: usize, expand: f64, len: usize) -> Range<usize> {
    let width = (last - first + 1) as f64 * expand;
    let centre = (first + last + 1) as f64 / 2.0;
    let start = (centre - width / 2.0).round_ties_even().max(0.0) as usize;
    let end = ((centre + width / 2.0).round_ties_even().max(0.0) as usize).min(len);
    start.min(end)..end
}

/// Applies the bunch masks to the cropped image after removing the noise
/// floor, clips negatives and normalizes the stack to unit total intensity.
///
/// Returns `None` when nothing positive remains.
#[must_use]
pub fn mask_image(
    cropped: ArrayView2<f64>,
    noise_mean: f64,
    masks: ArrayView3<bool>,
) -> Option<Array3<f64>> {
    let mut stack = Array3::<f64>::zeros(masks.raw_dim());
    for (mut out, mask) in stack.outer_iter_mut().zip(masks.outer_iter()) {
        Zip::from(&mut out)
            .and(&mask)
            .and(&cropped)
            .for_each(|o, &m, &v| {
                let v = v - noise_mean;
                if m && v > 0.0 {
                    *o = v;
                }
            });
    }

    let total = stack.sum();
    if total > 0.0 {
        stack.mapv_inplace(|v| v / total);
        Some(stack)
    } else {
        None
    }
}
