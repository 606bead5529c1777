//! Physical constants and facility defaults.

/// Electron charge in coulombs.
pub const E_CHARGE: f64 = 1.602_176_565e-19;

/// Femtoseconds to seconds.
pub const FS_TO_S: f64 = 1e-15;

/// Side of the top-left patch used to estimate the camera noise.
pub const SNR_BORDER: usize = 100;

/// Minimum fraction of non-zero pixels after denoising.
pub const VALID_PIXEL_FRACTION: f64 = 0.001;

/// Minimum |cos| of the RF phase difference for a usable calibration.
pub const MIN_COS_PHASE_DIFF: f64 = 0.5;

/// Fraction of the peak electron current used to bound the lasing region.
pub const CURRENT_THRESHOLD: f64 = 0.1;

// Shot defaults used when the facility does not report a value.

/// Electron beam charge (nC).
pub const DEFAULT_EBEAM_CHARGE: f64 = 5.0;

/// Charge reaching the beam dump (C).
pub const DEFAULT_DUMP_CHARGE: f64 = 175e-12;

/// Deflector RF amplitude (MV).
pub const DEFAULT_RF_AMPLITUDE: f64 = 20.0;

/// Deflector RF phase (degrees).
pub const DEFAULT_RF_PHASE: f64 = 90.0;

/// Gas detector reading (mJ).
pub const DEFAULT_ENERGY_DETECTOR: f64 = 0.2;
