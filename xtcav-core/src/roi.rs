//! Region of interest on the XTCAV camera.

use std::ops::Range;

use ndarray::Array1;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Rectangular pixel window with its absolute coordinate axes.
///
/// The axes are always the contiguous ranges `x0..x0 + x_n` and
/// `y0..y0 + y_n`; a `Roi` can only be built through [`Roi::new`] (or
/// derived from another one with [`Roi::crop`]) so the two never drift
/// apart. Bounds are half-open.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RoiBounds", into = "RoiBounds"))]
pub struct Roi {
    x_n: usize,
    x0: usize,
    y_n: usize,
    y0: usize,
    x_axis: Array1<f64>,
    y_axis: Array1<f64>,
}

/// Serialized form of a [`Roi`]; the axes are rebuilt on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoiBounds {
    pub x_n: usize,
    pub x0: usize,
    pub y_n: usize,
    pub y0: usize,
}

impl From<RoiBounds> for Roi {
    fn from(b: RoiBounds) -> Self {
        Roi::new(b.x_n, b.x0, b.y_n, b.y0)
    }
}

impl From<Roi> for RoiBounds {
    fn from(roi: Roi) -> Self {
        roi.bounds()
    }
}

impl Default for Roi {
    /// Full 1024x1024 sensor.
    fn default() -> Self {
        Self::new(1024, 0, 1024, 0)
    }
}

#[allow(clippy::cast_precision_loss)]
fn axis(start: usize, len: usize) -> Array1<f64> {
    Array1::from_iter((start..start + len).map(|v| v as f64))
}

impl Roi {
    /// Creates a ROI of `x_n` columns starting at `x0` and `y_n` rows
    /// starting at `y0`.
    #[must_use]
    pub fn new(x_n: usize, x0: usize, y_n: usize, y0: usize) -> Self {
        Self {
            x_n,
            x0,
            y_n,
            y0,
            x_axis: axis(x0, x_n),
            y_axis: axis(y0, y_n),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn x_n(&self) -> usize {
        self.x_n
    }

    /// First absolute column.
    #[must_use]
    pub fn x0(&self) -> usize {
        self.x0
    }

    /// Number of rows.
    #[must_use]
    pub fn y_n(&self) -> usize {
        self.y_n
    }

    /// First absolute row.
    #[must_use]
    pub fn y0(&self) -> usize {
        self.y0
    }

    /// Absolute column coordinates.
    #[must_use]
    pub fn x_axis(&self) -> &Array1<f64> {
        &self.x_axis
    }

    /// Absolute row coordinates.
    #[must_use]
    pub fn y_axis(&self) -> &Array1<f64> {
        &self.y_axis
    }

    /// Image shape `(rows, cols)` covered by this ROI.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.y_n, self.x_n)
    }

    #[must_use]
    pub fn bounds(&self) -> RoiBounds {
        RoiBounds {
            x_n: self.x_n,
            x0: self.x0,
            y_n: self.y_n,
            y0: self.y0,
        }
    }

    /// Midpoint of the column axis, `(x[0] + x[-1]) / 2`.
    #[must_use]
    pub fn x_mid(&self) -> f64 {
        midpoint(&self.x_axis)
    }

    /// Midpoint of the row axis, `(y[0] + y[-1]) / 2`.
    #[must_use]
    pub fn y_mid(&self) -> f64 {
        midpoint(&self.y_axis)
    }

    /// New ROI covering `rows` x `cols`, given as indices relative to this one.
    ///
    /// Ranges are clamped to the current extent.
    #[must_use]
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Self {
        let r_end = rows.end.min(self.y_n);
        let c_end = cols.end.min(self.x_n);
        let r_start = rows.start.min(r_end);
        let c_start = cols.start.min(c_end);
        Self::new(
            c_end - c_start,
            self.x0 + c_start,
            r_end - r_start,
            self.y0 + r_start,
        )
    }

    /// Offset `(row, col)` of `inner` within this ROI, if it fits entirely.
    #[must_use]
    pub fn offset_of(&self, inner: &Roi) -> Option<(usize, usize)> {
        let row = inner.y0.checked_sub(self.y0)?;
        let col = inner.x0.checked_sub(self.x0)?;
        (row + inner.y_n <= self.y_n && col + inner.x_n <= self.x_n).then_some((row, col))
    }
}

fn midpoint(axis: &Array1<f64>) -> f64 {
    match (axis.first(), axis.last()) {
        (Some(first), Some(last)) => (first + last) / 2.0,
        _ => 0.0,
    }
}
