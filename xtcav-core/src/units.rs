//! Pixel to physical unit calibration.

use log::warn;
use ndarray::Array1;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::MIN_COS_PHASE_DIFF;
use crate::roi::Roi;
use crate::shot::ShotParameters;

/// Per-run calibration constants of the XTCAV setup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlobalCalibration {
    /// Camera pixel size (um).
    pub um_per_pix: f64,
    /// Deflector streaking strength.
    pub streak_strength: f64,
    /// RF amplitude at calibration time.
    pub rf_amp_calib: f64,
    /// RF phase at calibration time (degrees).
    pub rf_phase_calib: f64,
    /// Beam energy at the dump (MeV).
    pub dump_energy: f64,
    /// Dispersion at the dump screen.
    pub dump_dispersion: f64,
}

impl GlobalCalibration {
    /// Energy step of one pixel row (MeV).
    #[must_use]
    pub fn mev_per_pixel(&self) -> f64 {
        self.um_per_pix * self.dump_energy / self.dump_dispersion * 1e-3
    }

    /// Time step of one pixel column (fs) before the phase sign correction.
    #[must_use]
    pub fn raw_fs_per_pixel(&self, rf_amplitude: f64) -> f64 {
        -self.um_per_pix * self.rf_amp_calib / (0.3 * self.streak_strength * rf_amplitude)
    }
}

/// Time and energy axes of a processed image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicalUnits {
    /// Time axis (fs), centred on the reference centre of mass.
    pub xfs: Array1<f64>,
    /// Energy axis (MeV), centred on the reference centre of mass.
    pub y_mev: Array1<f64>,
    /// Signed time step per pixel (fs).
    pub xfs_per_pix: f64,
    pub y_mev_per_pix: f64,
    /// False when the RF phase is too far from the calibrated operating
    /// point; anything derived from the shot must be discarded.
    pub valid: bool,
    /// Cosine of the RF phase difference used to decide `valid`.
    pub cos_phase_diff: f64,
}

impl PhysicalUnits {
    /// Copy with the time axis reversed.
    #[must_use]
    pub fn mirrored_in_time(&self) -> Self {
        Self {
            xfs: self.xfs.iter().rev().copied().collect(),
            ..self.clone()
        }
    }
}

/// Calibrates the ROI axes around `center = (x, y)` in pixel coordinates.
#[must_use]
pub fn physical_units(
    roi: &Roi,
    center: (f64, f64),
    shot: &ShotParameters,
    calibration: &GlobalCalibration,
) -> PhysicalUnits {
    let y_mev_per_pix = calibration.mev_per_pixel();
    let raw_fs_per_pix = calibration.raw_fs_per_pixel(shot.rf_amplitude);

    let cos_phase_diff = (calibration.rf_phase_calib - shot.rf_phase)
        .to_radians()
        .cos();
    let valid = cos_phase_diff.abs() >= MIN_COS_PHASE_DIFF;
    if !valid {
        warn!(
            "RF phase of the bunch is far from 0 or 180 degrees (cos = {cos_phase_diff:.3})"
        );
    }

    let xfs_per_pix = cos_phase_diff.signum() * raw_fs_per_pix;
    let (cx, cy) = center;

    PhysicalUnits {
        xfs: roi.x_axis().mapv(|x| xfs_per_pix * (x - cx)),
        y_mev: roi.y_axis().mapv(|y| y_mev_per_pix * (y - cy)),
        xfs_per_pix,
        y_mev_per_pix,
        valid,
        cos_phase_diff,
    }
}
