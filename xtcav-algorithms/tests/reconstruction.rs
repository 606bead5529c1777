mod common;

use approx::assert_relative_eq;
use ndarray::Array2;
use xtcav_algorithms::{
    AveragingConfig, ClusteringMethod, Error, GapStatisticConfig, ImageProfile,
    LasingReconstructor, PulseCharacterization, ReferenceAverager, ShotParameters,
};
use xtcav_core::constants::{E_CHARGE, FS_TO_S};

use common::{add_gaussian, full_roi, gaussian_image, processor};

fn profile_of(sigma: f64, shot: &ShotParameters) -> ImageProfile {
    let image = gaussian_image(200, 50.0, 50.0, sigma);
    processor(1)
        .process(Some(image.view()), &full_roi(200), shot)
        .unwrap()
        .profile
}

#[test]
fn test_identical_lasing_shot_puts_all_energy_in_offset() {
    let shot = ShotParameters::default().with_xray_energy(1e-3);
    let reference_profile = profile_of(5.0, &shot);
    let reference = ReferenceAverager::default()
        .average(std::slice::from_ref(&reference_profile))
        .unwrap();
    assert_eq!(reference.bunches[0].num_groups(), 1);

    let pulse = LasingReconstructor::new(&reference)
        .reconstruct(&reference_profile)
        .unwrap();
    let bunch = &pulse.bunches[0];

    assert_eq!(bunch.group, 0);
    assert_relative_eq!(bunch.delay_change, 0.0);
    assert!(bunch.power_raw_ecom.iter().all(|&p| p == 0.0));
    assert!(bunch.power_erms.iter().all(|&p| p == 0.0));
    assert_eq!(bunch.lasing_ecom, bunch.nolasing_ecom);
    // The integrated current is the electron count, so the offset carries
    // the whole gas detector energy.
    assert_relative_eq!(bunch.energy_ecom, 1e-3, max_relative = 0.05);
    assert_eq!(pulse.t, reference.t);
}

/// Same shot after lasing: every slice loses half a pixel of energy and
/// gains energy spread.
fn lased(profile: &ImageProfile) -> ImageProfile {
    let mut lasing = profile.clone();
    for stats in &mut lasing.image_stats {
        stats.y_com_slice.mapv_inplace(|y| y - 0.5);
        stats.y_rms_slice.mapv_inplace(|s| s * 1.3 + 0.1);
    }
    lasing
}

/// Energy-loss energy summed over bunches, rebuilt from the per-slice
/// outputs with the shot-wide offset per electron.
fn expected_ecom_energy(pulse: &PulseCharacterization, dt: f64, num_electrons: f64) -> f64 {
    let raw_energy: f64 = pulse
        .bunches
        .iter()
        .map(|b| b.power_raw_ecom.sum() / 1e-9)
        .sum::<f64>()
        * dt
        * FS_TO_S;
    let offset = (pulse.xray_energy - raw_energy) / num_electrons;
    pulse
        .bunches
        .iter()
        .map(|b| {
            let mut total = 0.0;
            for i in 0..b.lasing_e_current.len() {
                let loss = (b.nolasing_ecom[i] - b.lasing_ecom[i]) * E_CHARGE * 1e6;
                total += (loss + offset) * b.lasing_e_current[i];
            }
            total * dt * FS_TO_S
        })
        .sum()
}

fn check_normalization(pulse: &PulseCharacterization, dt: f64, num_electrons: f64) {
    let spread_scale: f64 = pulse
        .bunches
        .iter()
        .map(|b| b.power_raw_erms.sum())
        .sum::<f64>()
        * dt
        * FS_TO_S;
    assert!(spread_scale > 0.0);

    for b in &pulse.bunches {
        for i in 0..b.lasing_e_current.len() {
            let current = b.lasing_e_current[i];
            let raw_ecom = (b.nolasing_ecom[i] - b.lasing_ecom[i]) * (E_CHARGE * 1e6) * current;
            assert_relative_eq!(b.power_raw_ecom[i], raw_ecom * 1e-9, max_relative = 1e-9);
            assert_relative_eq!(
                b.power_erms[i],
                pulse.xray_energy * b.power_raw_erms[i] / spread_scale * 1e-9,
                max_relative = 1e-9
            );
        }
        assert!(b.power_agreement < 1.0);
    }

    let erms_total: f64 = pulse.bunches.iter().map(|b| b.energy_erms).sum();
    assert_relative_eq!(erms_total, pulse.xray_energy, max_relative = 1e-9);

    let ecom_total: f64 = pulse.bunches.iter().map(|b| b.energy_ecom).sum();
    assert_relative_eq!(
        ecom_total,
        expected_ecom_energy(pulse, dt, num_electrons),
        max_relative = 1e-6
    );
}

#[test]
fn test_lasing_shot_is_normalized_to_gas_detector() {
    let shot = ShotParameters::default().with_xray_energy(1e-3);
    let reference_profile = profile_of(5.0, &shot);
    let reference = ReferenceAverager::default()
        .average(std::slice::from_ref(&reference_profile))
        .unwrap();

    let lasing = lased(&reference_profile);
    let pulse = LasingReconstructor::new(&reference)
        .reconstruct(&lasing)
        .unwrap();
    let bunch = &pulse.bunches[0];

    assert_eq!(bunch.group, 0);
    assert!(bunch.power_raw_ecom.iter().any(|&p| p > 0.0));
    assert!(bunch.power_raw_ecom.iter().all(|&p| p >= 0.0));
    assert_relative_eq!(bunch.energy_erms, 1e-3, max_relative = 1e-9);
    // The offset spreads the gas detector energy over the integrated current,
    // which only approximates the electron count on a sampled axis.
    assert_relative_eq!(bunch.energy_ecom, 1e-3, max_relative = 0.1);
    check_normalization(&pulse, reference.dt(), shot.num_electrons());
}

#[test]
fn test_two_bunch_energies_share_gas_detector() {
    let mut image = Array2::zeros((200, 200));
    add_gaussian(&mut image, 40.0, 60.0, 5.0, 1000.0);
    add_gaussian(&mut image, 120.0, 60.0, 5.0, 1000.0);
    let shot = ShotParameters::default().with_xray_energy(2e-3);
    let reference_profile = processor(2)
        .process(Some(image.view()), &full_roi(200), &shot)
        .unwrap()
        .profile;
    let reference = ReferenceAverager::default()
        .average(std::slice::from_ref(&reference_profile))
        .unwrap();

    let pulse = LasingReconstructor::new(&reference)
        .reconstruct(&lased(&reference_profile))
        .unwrap();

    assert_eq!(pulse.num_bunches(), 2);
    for bunch in &pulse.bunches {
        assert!(bunch.energy_erms > 0.0 && bunch.energy_erms < 2e-3);
    }
    check_normalization(&pulse, reference.dt(), shot.num_electrons());
}

#[test]
fn test_reference_bunch_count_must_match() {
    let shot = ShotParameters::default();
    let profile = profile_of(5.0, &shot);
    let reference = ReferenceAverager::default()
        .average(std::slice::from_ref(&profile))
        .unwrap();

    let mut two_bunches = profile.clone();
    two_bunches
        .image_stats
        .push(two_bunches.image_stats[0].clone());
    assert!(matches!(
        LasingReconstructor::new(&reference).reconstruct(&two_bunches),
        Err(Error::BunchCountMismatch {
            expected: 1,
            found: 2
        })
    ));
}

fn two_families() -> (ImageProfile, ImageProfile, Vec<ImageProfile>) {
    let narrow = profile_of(3.0, &ShotParameters::default().with_event(1, 10));
    let wide = profile_of(8.0, &ShotParameters::default().with_event(2, 20));
    let profiles = (0..6)
        .map(|i| if i % 2 == 0 { narrow.clone() } else { wide.clone() })
        .collect();
    (narrow, wide, profiles)
}

#[test]
fn test_seeded_averaging_is_reproducible() {
    let (_, _, profiles) = two_families();
    let config = AveragingConfig::default()
        .with_gap_statistic(GapStatisticConfig::default().with_seed(2024));
    let averager = ReferenceAverager::new(config);
    let first = averager.average(&profiles).unwrap();
    let second = averager.average(&profiles).unwrap();
    assert_eq!(first, second);
    assert!(first.bunches[0].num_groups() >= 2);
}

#[test]
fn test_lasing_shot_matches_its_family() {
    let (_, wide, profiles) = two_families();
    for method in [
        ClusteringMethod::Hierarchical,
        ClusteringMethod::Svd,
        ClusteringMethod::Cosine,
        ClusteringMethod::L1,
        ClusteringMethod::Legacy,
    ] {
        let config = AveragingConfig::default()
            .with_method(method.clone())
            .with_num_groups(2);
        let reference = ReferenceAverager::new(config).average(&profiles).unwrap();
        let bunch = &reference.bunches[0];
        assert_eq!(bunch.num_groups(), 2, "{}", method.name());
        assert_eq!(bunch.event_fiducial, vec![10, 20], "{}", method.name());

        let pulse = LasingReconstructor::new(&reference).reconstruct(&wide).unwrap();
        assert_eq!(pulse.bunches[0].group, 1, "{}", method.name());
    }
}

#[test]
fn test_dbscan_joins_nearby_families() {
    let (_, _, profiles) = two_families();
    let config = AveragingConfig::default()
        .with_method(ClusteringMethod::from_name("kmeans"))
        .with_num_groups(2);
    let reference = ReferenceAverager::new(config).average(&profiles).unwrap();
    assert_eq!(reference.bunches[0].num_groups(), 1);
}
