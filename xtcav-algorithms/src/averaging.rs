//! Averaging no-lasing profiles into grouped references.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

use log::info;
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use xtcav_core::{AveragedProfiles, Error, ImageProfile, ReferenceBunch, ResampledBunch, Result};

use crate::clustering::{ClusteringMethod, GapStatisticConfig, GroupSelector};

/// Parameters of the reference averaging.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AveragingConfig {
    /// Fixed number of groups; `None` estimates it with the gap statistic.
    pub num_groups: Option<usize>,
    /// Method assigning profiles to groups.
    pub method: ClusteringMethod,
    /// Gap statistic parameters.
    pub gap: GapStatisticConfig,
}

impl AveragingConfig {
    /// Fixes the number of groups.
    #[must_use]
    pub fn with_num_groups(mut self, num_groups: usize) -> Self {
        self.num_groups = Some(num_groups);
        self
    }

    /// Sets the grouping method.
    #[must_use]
    pub fn with_method(mut self, method: ClusteringMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the gap statistic parameters.
    #[must_use]
    pub fn with_gap_statistic(mut self, gap: GapStatisticConfig) -> Self {
        self.gap = gap;
        self
    }
}

/// Builds [`AveragedProfiles`] from processed no-lasing shots.
#[derive(Clone, Debug, Default)]
pub struct ReferenceAverager {
    config: AveragingConfig,
}

impl ReferenceAverager {
    /// Creates an averager.
    #[must_use]
    pub fn new(config: AveragingConfig) -> Self {
        Self { config }
    }

    fn selector(&self) -> GroupSelector {
        GroupSelector::new(self.config.method.clone())
            .with_num_groups(self.config.num_groups)
            .with_gap_statistic(self.config.gap.clone())
    }

    /// Groups and averages `profiles`, bunch by bunch.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyReference`] without profiles, [`Error::BunchCountMismatch`]
    /// when the profiles disagree on the number of bunches and
    /// [`Error::InvalidConfig`] when no usable time step exists.
    pub fn average(&self, profiles: &[ImageProfile]) -> Result<AveragedProfiles> {
        let first = profiles.first().ok_or(Error::EmptyReference)?;
        let num_bunches = first.num_bunches();
        if let Some(p) = profiles.iter().find(|p| p.num_bunches() != num_bunches) {
            return Err(Error::BunchCountMismatch {
                expected: num_bunches,
                found: p.num_bunches(),
            });
        }

        let t = master_time_axis(profiles)?;
        let selector = self.selector();
        let bunches = (0..num_bunches)
            .into_par_iter()
            .map(|j| average_bunch(profiles, j, t.view(), &selector))
            .collect();

        Ok(AveragedProfiles { t, bunches })
    }
}

/// Time axis covering every profile, sampled at half the finest pixel step.
///
/// # Errors
///
/// [`Error::EmptyReference`] without profiles and [`Error::InvalidConfig`]
/// when every profile has a zero or non-finite time step.
pub fn master_time_axis(profiles: &[ImageProfile]) -> Result<Array1<f64>> {
    if profiles.is_empty() {
        return Err(Error::EmptyReference);
    }
    let mut min_t = f64::INFINITY;
    let mut max_t = f64::NEG_INFINITY;
    let mut min_step = f64::INFINITY;
    for p in profiles {
        for &t in &p.units.xfs {
            min_t = min_t.min(t);
            max_t = max_t.max(t);
        }
        let step = p.units.xfs_per_pix.abs();
        if step > 0.0 {
            min_step = min_step.min(step);
        }
    }

    if !(min_step.is_finite() && min_t.is_finite() && max_t.is_finite()) {
        return Err(Error::InvalidConfig(
            "profiles have no usable time calibration".into(),
        ));
    }

    let dt = min_step / 2.0;
    let len = ((max_t + dt - min_t) / dt).ceil().max(0.0) as usize;
    Ok(Array1::from_shape_fn(len, |i| min_t + i as f64 * dt))
}

fn average_bunch(
    profiles: &[ImageProfile],
    bunch: usize,
    t: ArrayView1<f64>,
    selector: &GroupSelector,
) -> ReferenceBunch {
    let mut data = Array2::<f64>::zeros((profiles.len(), t.len()));
    for (mut row, p) in data.outer_iter_mut().zip(profiles) {
        row.assign(&p.centred_profile(bunch, t));
    }

    let grouping = selector.select(data.view());
    let num_groups = grouping.num_groups();
    info!("averaging no-lasing profiles of bunch {bunch} into {num_groups} groups");

    let mut reference = ReferenceBunch {
        e_current: Array2::zeros((num_groups, t.len())),
        e_com_slice: Array2::zeros((num_groups, t.len())),
        e_rms_slice: Array2::zeros((num_groups, t.len())),
        dist_t: Array1::zeros(num_groups),
        dist_e: Array1::zeros(num_groups),
        t_rms: Array1::zeros(num_groups),
        e_rms: Array1::zeros(num_groups),
        event_time: vec![0; num_groups],
        event_fiducial: vec![0; num_groups],
    };

    for g in 0..num_groups {
        let members = grouping.members(g);
        let Some(&last) = members.last() else {
            continue;
        };
        let curves: Vec<ResampledBunch> = members
            .iter()
            .map(|&i| profiles[i].resample_bunch(bunch, t))
            .collect();
        let count = curves.len() as f64;

        for c in &curves {
            reference.e_current.row_mut(g).scaled_add(1.0 / count, &c.e_current);
            reference.e_com_slice.row_mut(g).scaled_add(1.0 / count, &c.e_com_slice);
            reference.e_rms_slice.row_mut(g).scaled_add(1.0 / count, &c.e_rms_slice);
        }

        reference.dist_t[g] = mean_of(curves.iter().map(|c| c.dist_t));
        reference.dist_e[g] = mean_of(curves.iter().map(|c| c.dist_e));
        reference.t_rms[g] = mean_of(members.iter().map(|&i| {
            let p = &profiles[i];
            (p.image_stats[bunch].x_rms * p.units.xfs_per_pix).abs()
        }));
        reference.e_rms[g] = mean_of(members.iter().map(|&i| {
            let p = &profiles[i];
            (p.image_stats[bunch].y_rms * p.units.y_mev_per_pix).abs()
        }));
        reference.event_time[g] = profiles[last].shot.unix_time;
        reference.event_fiducial[g] = profiles[last].shot.fiducial;
    }

    reference
}

fn mean_of(values: impl Iterator<Item = f64>) -> f64 {
    values.collect::<Array1<f64>>().mean().unwrap_or(0.0)
}
