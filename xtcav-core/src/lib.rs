//! xtcav-core: Core types and per-shot numerics for XTCAV pulse reconstruction.
//!
//! This crate provides the value types passed between pipeline stages
//! (ROI, image statistics, physical units, processed profiles, averaged
//! references and reconstructed pulses) together with the stateless
//! computations on them: statistics extraction and unit calibration.
//!

pub mod background;
pub mod constants;
pub mod error;
pub mod numeric;
pub mod profile;
pub mod roi;
pub mod shot;
pub mod statistics;
pub mod units;

pub use background::DarkBackground;
pub use error::{Error, Rejection, Result, ShotWarning};
pub use profile::{
    AveragedProfiles, BunchPulse, ImageProfile, PulseCharacterization, ReferenceBunch,
    ResampledBunch,
};
pub use roi::{Roi, RoiBounds};
pub use shot::ShotParameters;
pub use statistics::{image_statistics, ImageStatistics};
pub use units::{physical_units, GlobalCalibration, PhysicalUnits};
