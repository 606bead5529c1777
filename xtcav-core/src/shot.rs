//! Shot-to-shot scalars reported by the facility.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DUMP_CHARGE, DEFAULT_EBEAM_CHARGE, DEFAULT_ENERGY_DETECTOR, DEFAULT_RF_AMPLITUDE,
    DEFAULT_RF_PHASE, E_CHARGE,
};

/// Per-event beam and RF readings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShotParameters {
    /// Electron beam charge (nC).
    pub ebeam_charge: f64,
    /// Charge at the dump (C).
    pub dump_charge: f64,
    /// Deflector RF amplitude.
    pub rf_amplitude: f64,
    /// Deflector RF phase (degrees).
    pub rf_phase: f64,
    /// X-ray pulse energy from the gas detector (J).
    pub xray_energy: f64,
    pub unix_time: u64,
    pub fiducial: u32,
    /// False when the facility flagged the readings as unreliable.
    pub valid: bool,
}

impl Default for ShotParameters {
    fn default() -> Self {
        Self {
            ebeam_charge: DEFAULT_EBEAM_CHARGE,
            dump_charge: DEFAULT_DUMP_CHARGE,
            rf_amplitude: DEFAULT_RF_AMPLITUDE,
            rf_phase: DEFAULT_RF_PHASE,
            xray_energy: 1e-3 * DEFAULT_ENERGY_DETECTOR,
            unix_time: 0,
            fiducial: 0,
            valid: true,
        }
    }
}

impl ShotParameters {
    /// Number of electrons reaching the dump.
    #[must_use]
    pub fn num_electrons(&self) -> f64 {
        self.dump_charge / E_CHARGE
    }

    /// Sets the gas detector energy (J).
    #[must_use]
    pub fn with_xray_energy(mut self, energy: f64) -> Self {
        self.xray_energy = energy;
        self
    }

    /// Sets the event identifiers.
    #[must_use]
    pub fn with_event(mut self, unix_time: u64, fiducial: u32) -> Self {
        self.unix_time = unix_time;
        self.fiducial = fiducial;
        self
    }
}
