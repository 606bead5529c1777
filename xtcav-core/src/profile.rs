//! Processed shot profiles, reference averages and reconstruction output.
#![allow(clippy::cast_precision_loss)]

use ndarray::{Array1, Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::FS_TO_S;
use crate::numeric::interp_linear;
use crate::roi::Roi;
use crate::shot::ShotParameters;
use crate::statistics::ImageStatistics;
use crate::units::PhysicalUnits;

/// Immutable snapshot of one processed shot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImageProfile {
    pub image_stats: Vec<ImageStatistics>,
    pub roi: Roi,
    pub shot: ShotParameters,
    pub units: PhysicalUnits,
}

/// One bunch of a profile resampled onto a master time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledBunch {
    /// Delay to bunch 0 (fs).
    pub dist_t: f64,
    /// Energy offset to bunch 0 (MeV).
    pub dist_e: f64,
    /// Electron current (electrons/s).
    pub e_current: Array1<f64>,
    /// Slice energy centroid relative to the bunch centroid (MeV).
    pub e_com_slice: Array1<f64>,
    /// Slice energy spread (MeV).
    pub e_rms_slice: Array1<f64>,
}

impl ImageProfile {
    #[must_use]
    pub fn num_bunches(&self) -> usize {
        self.image_stats.len()
    }

    /// Delay of `bunch` with respect to bunch 0 (fs).
    #[must_use]
    pub fn bunch_delay(&self, bunch: usize) -> f64 {
        (self.image_stats[bunch].x_com - self.image_stats[0].x_com) * self.units.xfs_per_pix
    }

    /// Energy offset of `bunch` with respect to bunch 0 (MeV).
    #[must_use]
    pub fn bunch_energy_offset(&self, bunch: usize) -> f64 {
        (self.image_stats[bunch].y_com - self.image_stats[0].y_com) * self.units.y_mev_per_pix
    }

    /// Time axis of `bunch` re-centred on its own delay.
    fn centred_time(&self, bunch: usize) -> Array1<f64> {
        let dist_t = self.bunch_delay(bunch);
        self.units.xfs.mapv(|t| t - dist_t)
    }

    /// Normalized x profile of `bunch` interpolated on `t` after centring.
    ///
    /// This is the curve the reference clustering compares.
    #[must_use]
    pub fn centred_profile(&self, bunch: usize, t: ArrayView1<f64>) -> Array1<f64> {
        let time = self.centred_time(bunch);
        interp_linear(time.view(), self.image_stats[bunch].x_profile.view(), t)
    }

    /// Physical curves of `bunch` on the master axis `t`.
    ///
    /// The electron current is converted with this shot's own time step and
    /// electron count before interpolation.
    #[must_use]
    pub fn resample_bunch(&self, bunch: usize, t: ArrayView1<f64>) -> ResampledBunch {
        let stats = &self.image_stats[bunch];
        let units = &self.units;
        let time = self.centred_time(bunch);

        let dt_orig = units.xfs_per_pix.abs();
        let num_electrons = self.shot.num_electrons();
        let e_current = stats
            .x_profile
            .mapv(|p| p / (dt_orig * FS_TO_S) * num_electrons);
        let e_com_slice = stats
            .y_com_slice
            .mapv(|y| (y - stats.y_com) * units.y_mev_per_pix);
        let e_rms_slice = stats.y_rms_slice.mapv(|s| s * units.y_mev_per_pix);

        ResampledBunch {
            dist_t: self.bunch_delay(bunch),
            dist_e: self.bunch_energy_offset(bunch),
            e_current: interp_linear(time.view(), e_current.view(), t),
            e_com_slice: interp_linear(time.view(), e_com_slice.view(), t),
            e_rms_slice: interp_linear(time.view(), e_rms_slice.view(), t),
        }
    }
}

/// Averaged no-lasing references of one bunch, one row per group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReferenceBunch {
    /// Electron current (electrons/s), groups x time.
    pub e_current: Array2<f64>,
    /// Slice energy centroid (MeV), groups x time.
    pub e_com_slice: Array2<f64>,
    /// Slice energy spread (MeV), groups x time.
    pub e_rms_slice: Array2<f64>,
    /// Delay to bunch 0 (fs).
    pub dist_t: Array1<f64>,
    /// Energy offset to bunch 0 (MeV).
    pub dist_e: Array1<f64>,
    /// Total time spread (fs).
    pub t_rms: Array1<f64>,
    /// Total energy spread (MeV).
    pub e_rms: Array1<f64>,
    /// Unix time of the last shot of each group.
    pub event_time: Vec<u64>,
    /// Fiducial of the last shot of each group.
    pub event_fiducial: Vec<u32>,
}

impl ReferenceBunch {
    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.e_current.nrows()
    }
}

/// No-lasing references for every bunch on one shared master time axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AveragedProfiles {
    /// Master time axis (fs).
    pub t: Array1<f64>,
    pub bunches: Vec<ReferenceBunch>,
}

impl AveragedProfiles {
    #[must_use]
    pub fn num_bunches(&self) -> usize {
        self.bunches.len()
    }

    /// Step of the master time axis (fs).
    #[must_use]
    pub fn dt(&self) -> f64 {
        let n = self.t.len();
        if n < 2 {
            return 0.0;
        }
        (self.t[n - 1] - self.t[0]) / (n - 1) as f64
    }
}

/// Reconstructed X-ray pulse of one bunch.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BunchPulse {
    /// Power from the energy-loss method (GW).
    pub power_ecom: Array1<f64>,
    /// Power from the energy-spread method (GW).
    pub power_erms: Array1<f64>,
    /// Energy-loss power before gas detector normalization, scaled to GW.
    pub power_raw_ecom: Array1<f64>,
    /// Energy-spread power before gas detector normalization, in arbitrary
    /// units. Unlike `power_raw_ecom` it carries no GW scaling: the method
    /// has no absolute unit before normalization.
    pub power_raw_erms: Array1<f64>,
    /// Agreement between the two methods, 1 for identical curves.
    pub power_agreement: f64,
    /// Delay to bunch 0 (fs).
    pub delay: f64,
    /// Delay change with respect to the matched reference group (fs).
    pub delay_change: f64,
    /// Energy offset to bunch 0 (MeV).
    pub energy_diff: f64,
    /// Energy offset change with respect to the matched reference group (MeV).
    pub energy_diff_change: f64,
    /// X-ray energy from the energy-loss method (J).
    pub energy_ecom: f64,
    /// X-ray energy from the energy-spread method (J).
    pub energy_erms: f64,
    pub lasing_e_current: Array1<f64>,
    pub nolasing_e_current: Array1<f64>,
    pub lasing_ecom: Array1<f64>,
    pub nolasing_ecom: Array1<f64>,
    pub lasing_erms: Array1<f64>,
    pub nolasing_erms: Array1<f64>,
    /// Index of the reference group the shot was matched to.
    pub group: usize,
}

/// Full reconstruction of one lasing shot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseCharacterization {
    /// Master time axis (fs).
    pub t: Array1<f64>,
    /// Gas detector energy used for normalization (J).
    pub xray_energy: f64,
    pub bunches: Vec<BunchPulse>,
}

impl PulseCharacterization {
    #[must_use]
    pub fn num_bunches(&self) -> usize {
        self.bunches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::E_CHARGE;
    use crate::units::PhysicalUnits;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn two_bunch_profile() -> ImageProfile {
        let roi = Roi::new(4, 0, 2, 0);
        let mut first = ImageStatistics::degenerate(&roi);
        first.image_fraction = 0.5;
        first.x_com = 1.0;
        first.y_com = 0.0;
        first.x_profile = array![0.1, 0.3, 0.1, 0.0];
        first.y_com_slice = array![0.0, 0.5, 1.0, 0.0];
        let mut second = first.clone();
        second.x_com = 2.0;
        second.y_com = 1.0;
        ImageProfile {
            image_stats: vec![first, second],
            roi,
            shot: ShotParameters {
                dump_charge: 100.0 * E_CHARGE,
                ..ShotParameters::default()
            },
            units: PhysicalUnits {
                xfs: array![-2.0, 0.0, 2.0, 4.0],
                y_mev: array![0.0, 3.0],
                xfs_per_pix: 2.0,
                y_mev_per_pix: 3.0,
                valid: true,
                cos_phase_diff: 1.0,
            },
        }
    }

    #[test]
    fn test_bunch_offsets() {
        let profile = two_bunch_profile();
        assert_relative_eq!(profile.bunch_delay(1), 2.0);
        assert_relative_eq!(profile.bunch_energy_offset(1), 3.0);
        assert_relative_eq!(profile.bunch_delay(0), 0.0);
    }

    #[test]
    fn test_resample_on_native_axis_converts_current() {
        let profile = two_bunch_profile();
        let t = profile.units.xfs.clone();
        let curves = profile.resample_bunch(0, t.view());
        let scale = 100.0 / (2.0 * FS_TO_S);
        assert_relative_eq!(curves.e_current[1], 0.3 * scale, max_relative = 1e-12);
        assert_relative_eq!(curves.e_com_slice[2], 3.0);
        assert_relative_eq!(curves.e_current[3], 0.0);
    }

    #[test]
    fn test_resample_recentres_on_delay() {
        let profile = two_bunch_profile();
        let t = array![-4.0, -2.0, 0.0, 2.0];
        let centred = profile.centred_profile(1, t.view());
        assert_eq!(centred.to_vec(), vec![0.1, 0.3, 0.1, 0.0]);
    }
}
