//! Dark background reference.
//!
//! Frames are fetched by the caller (the facility data layer is not part of
//! this crate); this module only averages them and subtracts the result from
//! shots whose ROI it covers.

use log::{debug, warn};
use ndarray::{s, Array2, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::roi::Roi;

/// Averaged dark frame and the ROI it was recorded with.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DarkBackground {
    pub image: Array2<f64>,
    pub roi: Roi,
    /// Number of frames in the average.
    pub num_frames: usize,
}

impl DarkBackground {
    /// Wraps an already averaged dark image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the image does not match the ROI.
    pub fn new(image: Array2<f64>, roi: Roi) -> Result<Self> {
        check_shape(image.view(), &roi)?;
        Ok(Self {
            image,
            roi,
            num_frames: 1,
        })
    }

    /// Averages up to `max_frames` frames. Missing frames are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyReference`] when no frame was available and
    /// [`Error::ShapeMismatch`] when a frame does not match the ROI.
    pub fn from_frames<'a, I>(frames: I, roi: Roi, max_frames: usize) -> Result<Self>
    where
        I: IntoIterator<Item = Option<ArrayView2<'a, f64>>>,
    {
        let mut accumulator = Array2::<f64>::zeros(roi.shape());
        let mut n = 0usize;

        for frame in frames.into_iter().flatten() {
            if n >= max_frames {
                break;
            }
            check_shape(frame, &roi)?;
            accumulator += &frame;
            n += 1;
            if n % 50 == 0 {
                debug!("dark background: {n} / {max_frames} frames");
            }
        }

        if n == 0 {
            return Err(Error::EmptyReference);
        }
        #[allow(clippy::cast_precision_loss)]
        accumulator.mapv_inplace(|v| v / n as f64);

        Ok(Self {
            image: accumulator,
            roi,
            num_frames: n,
        })
    }

    /// Dark image restricted to `roi`, if this background covers it.
    #[must_use]
    pub fn window(&self, roi: &Roi) -> Option<ArrayView2<'_, f64>> {
        let (row, col) = self.roi.offset_of(roi)?;
        Some(
            self.image
                .slice(s![row..row + roi.y_n(), col..col + roi.x_n()]),
        )
    }

    /// Subtracts the background from an image covering `roi`.
    ///
    /// Returns `None` (and logs a warning) when this background does not
    /// cover `roi`; the caller then continues without subtraction.
    #[must_use]
    pub fn subtract_from(&self, image: ArrayView2<f64>, roi: &Roi) -> Option<Array2<f64>> {
        match self.window(roi) {
            Some(dark) if dark.dim() == image.dim() => Some(&image - &dark),
            _ => {
                warn!(
                    "dark background ROI not large enough for image, \
                     image will not be background subtracted"
                );
                None
            }
        }
    }
}

fn check_shape(image: ArrayView2<f64>, roi: &Roi) -> Result<()> {
    if image.dim() == roi.shape() {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: roi.shape(),
            found: image.dim(),
        })
    }
}
