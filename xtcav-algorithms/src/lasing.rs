//! X-ray power reconstruction from a lasing shot.
//!
//! Lasing takes energy from the electrons and spreads it. Comparing a
//! lasing shot with the closest no-lasing reference gives the power twice:
//! from the loss of slice energy and from the growth of slice energy
//! spread. Both are normalized with the gas detector energy.

use std::ops::RangeInclusive;

use log::{debug, warn};
use ndarray::{Array1, ArrayView1, Zip};

use xtcav_core::constants::{CURRENT_THRESHOLD, E_CHARGE, FS_TO_S};
use xtcav_core::numeric::pearson_r2;
use xtcav_core::{
    AveragedProfiles, BunchPulse, Error, ImageProfile, PulseCharacterization, ReferenceBunch,
    Result,
};

/// One MeV in joules.
const JOULE_PER_MEV: f64 = E_CHARGE * 1e6;
const TO_GW: f64 = 1e-9;

/// Reconstructs lasing shots against a fixed no-lasing reference.
#[derive(Clone, Copy, Debug)]
pub struct LasingReconstructor<'a> {
    reference: &'a AveragedProfiles,
}

/// Per-bunch quantities computed before the shot-wide normalization.
struct BunchTerms {
    group: usize,
    delay: f64,
    delay_change: f64,
    energy_diff: f64,
    energy_diff_change: f64,
    lasing_e_current: Array1<f64>,
    nolasing_e_current: Array1<f64>,
    lasing_ecom: Array1<f64>,
    nolasing_ecom: Array1<f64>,
    lasing_erms: Array1<f64>,
    nolasing_erms: Array1<f64>,
    raw_ecom: Array1<f64>,
    raw_erms: Array1<f64>,
}

impl<'a> LasingReconstructor<'a> {
    /// Creates a reconstructor using `reference`.
    #[must_use]
    pub fn new(reference: &'a AveragedProfiles) -> Self {
        Self { reference }
    }

    /// Reconstructs the X-ray power of every bunch of `profile`.
    ///
    /// # Errors
    ///
    /// [`Error::BunchCountMismatch`] when the shot and the reference disagree
    /// on the number of bunches, [`Error::EmptyReference`] when a reference
    /// bunch has no group and [`Error::InvalidConfig`] when the shot carries
    /// no electrons.
    pub fn reconstruct(&self, profile: &ImageProfile) -> Result<PulseCharacterization> {
        let num_bunches = self.reference.num_bunches();
        if profile.num_bunches() != num_bunches {
            return Err(Error::BunchCountMismatch {
                expected: num_bunches,
                found: profile.num_bunches(),
            });
        }
        let num_electrons = profile.shot.num_electrons();
        if !(num_electrons > 0.0) {
            return Err(Error::InvalidConfig(
                "dump charge must be positive".into(),
            ));
        }

        let terms = (0..num_bunches)
            .map(|j| self.bunch_terms(profile, j))
            .collect::<Result<Vec<_>>>()?;

        let dt = self.reference.dt();
        let xray_energy = profile.shot.xray_energy;
        let ecom_energy: f64 = terms.iter().map(|b| b.raw_ecom.sum()).sum::<f64>() * dt * FS_TO_S;
        let e_offset = (xray_energy - ecom_energy) / num_electrons;
        let erms_scale: f64 = terms.iter().map(|b| b.raw_erms.sum()).sum::<f64>() * dt * FS_TO_S;
        if erms_scale == 0.0 {
            warn!("no energy spread growth in shot, energy-spread power set to zero");
        }
        debug!("energy offset per electron {e_offset:e} J, spread scale {erms_scale:e}");

        let bunches = terms
            .into_iter()
            .map(|b| finish_bunch(b, e_offset, erms_scale, xray_energy, dt))
            .collect();

        Ok(PulseCharacterization {
            t: self.reference.t.clone(),
            xray_energy,
            bunches,
        })
    }

    fn bunch_terms(&self, profile: &ImageProfile, bunch: usize) -> Result<BunchTerms> {
        let reference = &self.reference.bunches[bunch];
        if reference.num_groups() == 0 {
            return Err(Error::EmptyReference);
        }
        let lasing = profile.resample_bunch(bunch, self.reference.t.view());
        let group = best_group(lasing.e_current.view(), reference);

        let nolasing_e_current = reference.e_current.row(group).to_owned();
        let len = lasing.e_current.len();
        let mut lasing_ecom = Array1::<f64>::zeros(len);
        let mut nolasing_ecom = Array1::<f64>::zeros(len);
        let mut lasing_erms = Array1::<f64>::zeros(len);
        let mut nolasing_erms = Array1::<f64>::zeros(len);
        if let Some(range) = overlap(lasing.e_current.view(), nolasing_e_current.view()) {
            for i in range {
                lasing_ecom[i] = lasing.e_com_slice[i];
                nolasing_ecom[i] = reference.e_com_slice[[group, i]];
                lasing_erms[i] = lasing.e_rms_slice[i];
                nolasing_erms[i] = reference.e_rms_slice[[group, i]];
            }
        } else {
            debug!("bunch {bunch}: lasing and reference currents do not overlap");
        }

        let raw_ecom = Zip::from(&nolasing_ecom)
            .and(&lasing_ecom)
            .and(&lasing.e_current)
            .map_collect(|&no, &las, &current| (no - las) * JOULE_PER_MEV * current);
        let raw_erms = Zip::from(&lasing_erms)
            .and(&nolasing_erms)
            .and(&lasing.e_current)
            .map_collect(|&las, &no, &current| (las * las - no * no) * current.cbrt().powi(2));

        Ok(BunchTerms {
            group,
            delay: lasing.dist_t,
            delay_change: lasing.dist_t - reference.dist_t[group],
            energy_diff: lasing.dist_e,
            energy_diff_change: lasing.dist_e - reference.dist_e[group],
            lasing_e_current: lasing.e_current,
            nolasing_e_current,
            lasing_ecom,
            nolasing_ecom,
            lasing_erms,
            nolasing_erms,
            raw_ecom,
            raw_erms,
        })
    }
}

fn finish_bunch(
    b: BunchTerms,
    e_offset: f64,
    erms_scale: f64,
    xray_energy: f64,
    dt: f64,
) -> BunchPulse {
    let power_ecom = Zip::from(&b.nolasing_ecom)
        .and(&b.lasing_ecom)
        .and(&b.lasing_e_current)
        .map_collect(|&no, &las, &current| {
            ((no - las) * JOULE_PER_MEV + e_offset) * current * TO_GW
        });
    let power_erms = if erms_scale == 0.0 {
        Array1::zeros(b.raw_erms.len())
    } else {
        b.raw_erms.mapv(|p| xray_energy * p / erms_scale * TO_GW)
    };

    let integrate = |power: &Array1<f64>| power.sum() * dt * FS_TO_S / TO_GW;

    BunchPulse {
        power_agreement: power_agreement(power_ecom.view(), power_erms.view()),
        energy_ecom: integrate(&power_ecom),
        energy_erms: integrate(&power_erms),
        power_raw_ecom: b.raw_ecom.mapv(|p| p * TO_GW),
        power_raw_erms: b.raw_erms,
        power_ecom,
        power_erms,
        delay: b.delay,
        delay_change: b.delay_change,
        energy_diff: b.energy_diff,
        energy_diff_change: b.energy_diff_change,
        lasing_e_current: b.lasing_e_current,
        nolasing_e_current: b.nolasing_e_current,
        lasing_ecom: b.lasing_ecom,
        nolasing_ecom: b.nolasing_ecom,
        lasing_erms: b.lasing_erms,
        nolasing_erms: b.nolasing_erms,
        group: b.group,
    }
}

/// Reference group whose current is most correlated with `current`.
///
/// Undefined correlations count as zero; the first maximum wins.
fn best_group(current: ArrayView1<f64>, reference: &ReferenceBunch) -> usize {
    let mut best = 0;
    let mut best_r2 = f64::NEG_INFINITY;
    for (g, row) in reference.e_current.outer_iter().enumerate() {
        let r2 = pearson_r2(current, row).unwrap_or(0.0);
        if r2 > best_r2 {
            best = g;
            best_r2 = r2;
        }
    }
    best
}

/// First and last index where `current` exceeds its threshold.
fn support(current: ArrayView1<f64>) -> Option<(usize, usize)> {
    let peak = current.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    let threshold = CURRENT_THRESHOLD * peak;
    let first = current.iter().position(|&v| v > threshold)?;
    let last = current.iter().rposition(|&v| v > threshold)?;
    Some((first, last))
}

/// Inclusive index range where both currents exceed their thresholds.
fn overlap(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Option<RangeInclusive<usize>> {
    let (a_first, a_last) = support(a)?;
    let (b_first, b_last) = support(b)?;
    let first = a_first.max(b_first);
    let last = a_last.min(b_last);
    (first <= last).then_some(first..=last)
}

/// Agreement between two power curves: 1 for identical curves, lower as
/// they differ.
#[must_use]
pub fn power_agreement(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let residual: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum();
    if residual == 0.0 {
        return 1.0;
    }
    let spread = |v: ArrayView1<f64>| {
        let m = v.mean().unwrap_or(0.0);
        v.iter().map(|x| (x - m) * (x - m)).sum::<f64>()
    };
    let total = spread(a) + spread(b);
    if total == 0.0 {
        return f64::NEG_INFINITY;
    }
    1.0 - residual / total
}
