mod common;

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use xtcav_algorithms::{
    BunchSegmenter, DarkBackground, Rejection, Roi, ShotParameters, ShotProcessingConfig,
    ShotWarning, SingleShotProcessor,
};

use common::{add_gaussian, calibration, full_roi, gaussian_image, processor};

#[test]
fn test_single_gaussian_centre_of_mass() {
    let image = gaussian_image(200, 50.0, 50.0, 5.0);
    let shot = processor(1)
        .process(Some(image.view()), &full_roi(200), &ShotParameters::default())
        .unwrap();

    let stats = &shot.profile.image_stats[0];
    assert_abs_diff_eq!(stats.x_com, 50.0, epsilon = 1.0);
    assert_abs_diff_eq!(stats.y_com, 50.0, epsilon = 1.0);
    assert_abs_diff_eq!(stats.image_fraction, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(shot.image.sum(), 1.0, epsilon = 1e-9);
    assert!(shot.warnings.is_empty());
}

#[test]
fn test_roi_is_refined_to_signal() {
    let image = gaussian_image(200, 50.0, 50.0, 5.0);
    let roi = full_roi(200);
    let tight = processor(1)
        .process(Some(image.view()), &roi, &ShotParameters::default())
        .unwrap();
    let refined = &tight.profile.roi;
    assert!(refined.x0() > 30 && refined.x0() < 50);
    assert!(refined.x0() + refined.x_n() > 50 && refined.x0() + refined.x_n() < 70);
    assert_eq!(tight.image.dim(), (1, refined.y_n(), refined.x_n()));

    let config = ShotProcessingConfig::default()
        .with_snr_filter(2.0)
        .with_roi_expand(2.0);
    let wide = SingleShotProcessor::new(config, calibration())
        .unwrap()
        .process(Some(image.view()), &roi, &ShotParameters::default())
        .unwrap();
    assert!(wide.profile.roi.x_n() > refined.x_n());
    assert!(wide.profile.roi.x0() < refined.x0());
}

#[test]
fn test_time_axis_always_increasing() {
    let mut image = Array2::zeros((200, 200));
    // Asymmetric in time: strong head, weak tail.
    add_gaussian(&mut image, 50.0, 50.0, 4.0, 1000.0);
    add_gaussian(&mut image, 58.0, 50.0, 4.0, 500.0);
    let roi = full_roi(200);

    // Phase difference 0 gives a negative time step, 180 a positive one.
    let reversed = processor(1)
        .process(Some(image.view()), &roi, &ShotParameters::default())
        .unwrap();
    let forward_shot = ShotParameters {
        rf_phase: 270.0,
        ..ShotParameters::default()
    };
    let forward = processor(1)
        .process(Some(image.view()), &roi, &forward_shot)
        .unwrap();

    assert!(reversed.profile.units.xfs_per_pix < 0.0);
    assert!(forward.profile.units.xfs_per_pix > 0.0);
    for shot in [&reversed, &forward] {
        let xfs = &shot.profile.units.xfs;
        assert!(xfs.windows(2).into_iter().all(|w| w[1] > w[0]));
    }

    let mirrored: Vec<f64> = forward.profile.image_stats[0]
        .x_profile
        .iter()
        .rev()
        .copied()
        .collect();
    assert_eq!(reversed.profile.image_stats[0].x_profile.to_vec(), mirrored);
    assert_abs_diff_eq!(
        reversed.profile.image_stats[0].x_com,
        forward.profile.image_stats[0].x_com
    );
}

#[test]
fn test_two_bunches() {
    let mut image = Array2::zeros((200, 200));
    add_gaussian(&mut image, 40.0, 60.0, 5.0, 1000.0);
    add_gaussian(&mut image, 120.0, 60.0, 5.0, 1000.0);
    let shot = processor(2)
        .process(Some(image.view()), &full_roi(200), &ShotParameters::default())
        .unwrap();

    let stats = &shot.profile.image_stats;
    assert_eq!(stats.len(), 2);
    assert_abs_diff_eq!(stats[0].x_com, 40.0, epsilon = 1.0);
    assert_abs_diff_eq!(stats[1].x_com, 120.0, epsilon = 1.0);
    assert_abs_diff_eq!(stats[0].image_fraction, 0.5, epsilon = 0.01);
    assert_abs_diff_eq!(shot.profile.bunch_energy_offset(1), 0.0, epsilon = 1.0);
}

#[test]
fn test_rejections() {
    let roi = full_roi(200);
    let shot = ShotParameters::default();

    assert_eq!(
        processor(1).process(None, &roi, &shot).unwrap_err(),
        Rejection::Empty
    );

    let blank = Array2::zeros((200, 200));
    assert_eq!(
        processor(1).process(Some(blank.view()), &roi, &shot).unwrap_err(),
        Rejection::Empty
    );

    let mut saturated = gaussian_image(200, 50.0, 50.0, 5.0);
    saturated[[10, 10]] = 70_000.0;
    assert!(matches!(
        processor(1).process(Some(saturated.view()), &roi, &shot),
        Err(Rejection::Saturated { .. })
    ));

    let image = gaussian_image(200, 50.0, 50.0, 5.0);
    assert_eq!(
        processor(2).process(Some(image.view()), &roi, &shot).unwrap_err(),
        Rejection::BunchCountMismatch {
            expected: 2,
            found: 1
        }
    );

    let quadrature = ShotParameters {
        rf_phase: 0.0,
        ..ShotParameters::default()
    };
    assert!(matches!(
        processor(1).process(Some(image.view()), &roi, &quadrature),
        Err(Rejection::InvalidCalibration { .. })
    ));

    assert!(matches!(
        processor(1).process(Some(image.view()), &Roi::new(100, 0, 200, 0), &shot),
        Err(Rejection::ShapeMismatch { .. })
    ));
}

#[test]
fn test_dark_background() {
    let roi = full_roi(200);
    let shot = ShotParameters::default();
    let mut image = gaussian_image(200, 50.0, 50.0, 5.0);
    image += 30.0;

    let dark = DarkBackground::new(Array2::from_elem((220, 220), 30.0), Roi::new(220, 0, 220, 0))
        .unwrap();
    let subtracted = processor(1)
        .with_dark_background(dark)
        .process(Some(image.view()), &roi, &shot)
        .unwrap();
    assert!(subtracted.warnings.is_empty());
    assert_abs_diff_eq!(subtracted.profile.image_stats[0].x_com, 50.0, epsilon = 1.0);

    let small = DarkBackground::new(Array2::zeros((100, 100)), Roi::new(100, 0, 100, 0)).unwrap();
    let unsubtracted = processor(1)
        .with_dark_background(small)
        .process(Some(image.view()), &roi, &shot)
        .unwrap();
    assert_eq!(unsubtracted.warnings, vec![ShotWarning::IncompatibleRoi]);
}

/// Puts the whole signal in the first bunch and leaves the others empty.
struct FirstBunchOnly;

impl BunchSegmenter for FirstBunchOnly {
    fn segment(&self, mask: ArrayView2<bool>, num_bunches: usize) -> Option<Array3<bool>> {
        let (rows, cols) = mask.dim();
        let mut out = Array3::from_elem((num_bunches, rows, cols), false);
        out.index_axis_mut(Axis(0), 0).assign(&mask);
        Some(out)
    }

    fn name(&self) -> &'static str {
        "FirstBunchOnly"
    }
}

#[test]
fn test_empty_bunch_is_a_warning() {
    let image = gaussian_image(200, 50.0, 50.0, 5.0);
    let config = ShotProcessingConfig::default()
        .with_num_bunches(2)
        .with_snr_filter(2.0);
    let shot = SingleShotProcessor::new(config, calibration())
        .unwrap()
        .with_segmenter(FirstBunchOnly)
        .process(Some(image.view()), &full_roi(200), &ShotParameters::default())
        .unwrap();

    assert_eq!(shot.warnings, vec![ShotWarning::DegenerateBunch { bunch: 1 }]);
    let stats = &shot.profile.image_stats;
    assert_eq!(stats.len(), 2);
    assert!(stats[1].is_degenerate());
    assert_abs_diff_eq!(stats[0].image_fraction, 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(stats[1].x_com, shot.profile.roi.x_mid());
    assert_abs_diff_eq!(stats[0].x_com, 50.0, epsilon = 1.0);
}
