#![allow(dead_code, clippy::cast_precision_loss)]

use ndarray::Array2;
use xtcav_algorithms::{GlobalCalibration, Roi, ShotProcessingConfig, SingleShotProcessor};

/// Adds a round Gaussian spot of `amplitude` centred on `(x, y)` pixels.
pub fn add_gaussian(image: &mut Array2<f64>, x: f64, y: f64, sigma: f64, amplitude: f64) {
    for ((r, c), v) in image.indexed_iter_mut() {
        let dx = c as f64 - x;
        let dy = r as f64 - y;
        *v += amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
    }
}

pub fn gaussian_image(size: usize, x: f64, y: f64, sigma: f64) -> Array2<f64> {
    let mut image = Array2::zeros((size, size));
    add_gaussian(&mut image, x, y, sigma, 1000.0);
    image
}

pub fn calibration() -> GlobalCalibration {
    GlobalCalibration {
        um_per_pix: 23.63,
        streak_strength: 5.0,
        rf_amp_calib: 20.0,
        rf_phase_calib: 90.0,
        dump_energy: 4000.0,
        dump_dispersion: 0.5,
    }
}

pub fn full_roi(size: usize) -> Roi {
    Roi::new(size, 0, size, 0)
}

/// Processor with a threshold low enough for a lone spot inside the noise
/// patch.
pub fn processor(num_bunches: usize) -> SingleShotProcessor {
    let config = ShotProcessingConfig::default()
        .with_num_bunches(num_bunches)
        .with_snr_filter(2.0);
    SingleShotProcessor::new(config, calibration()).unwrap()
}
