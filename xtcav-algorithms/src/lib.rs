//! xtcav-algorithms: Processing and reconstruction stages for XTCAV images.
//!
//! This crate provides the stateful stages of the pipeline:
//! - **Single-shot processing** - denoising, bunch segmentation, ROI
//!   refinement and statistics of one camera image
//! - **Reference averaging** - grouping of no-lasing shots (gap statistic,
//!   hierarchical, SVD, DBSCAN, correlation) and per-group averages
//! - **Lasing reconstruction** - X-ray power from the energy loss and the
//!   energy spread of a lasing shot
//!
#![warn(missing_docs)]

mod averaging;
pub mod clustering;
pub mod denoise;
mod lasing;
mod processing;
pub mod segmentation;
mod union_find;

pub use averaging::{master_time_axis, AveragingConfig, ReferenceAverager};
pub use clustering::{
    ClusteringMethod, DbscanConfig, GapStatistic, GapStatisticConfig, GroupSelector, Grouping,
    GroupingStrategy,
};
pub use lasing::{power_agreement, LasingReconstructor};
pub use processing::{
    mask_image, refine_roi, ProcessedShot, ShotProcessingConfig, SingleShotProcessor,
};
pub use segmentation::{BunchSegmenter, ConnectedComponentConfig, ConnectedComponentSegmenter};

// Re-export core types used in this crate's signatures
pub use xtcav_core::{
    AveragedProfiles, DarkBackground, Error, GlobalCalibration, ImageProfile,
    PulseCharacterization, Rejection, Result, Roi, ShotParameters, ShotWarning,
};
