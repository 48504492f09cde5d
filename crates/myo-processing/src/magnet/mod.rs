//! Magnet position estimation for Beta 2 plates
//!
//! Each well's magnet pose is fitted independently per timepoint against the
//! nine flux readings of its three tri-axial sensors, after removing the
//! no-magnet baseline. Timepoints within a well run sequentially so each fit
//! starts from the previous solution; wells run in parallel with the
//! `parallel` feature.

pub mod model;
pub mod solver;

pub use model::{MagnetParams, WellGeometry, MEASUREMENTS_PER_WELL, PARAMETER_COUNT};
pub use solver::{FitResult, SolverSettings};

use crate::calibration::filters::{FilterFamily, FilterResponse, SosFilter};
use model::FluxVector;
use myo_core::constants::{AXES_PER_SENSOR, SENSORS_PER_WELL};
use myo_core::{MyoError, MyoResult};
use ndarray::{s, Array1, Array2, Array4, ArrayView3, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Baseline samples averaged in mean mode
pub const BASELINE_MEAN_NUM_DATA_POINTS: usize = 100;
/// Post-filter cutoff applied to the fitted parameters
pub const POST_FILTER_CUTOFF_HZ: f64 = 30.0;

/// How the no-magnet recording is aligned with the tissue recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineMode {
    /// Average the last `num_points` baseline samples into one correction
    Mean { num_points: usize },
    /// Repeat the baseline until it covers the tissue recording, then truncate
    Extended,
}

impl Default for BaselineMode {
    fn default() -> Self {
        BaselineMode::Mean {
            num_points: BASELINE_MEAN_NUM_DATA_POINTS,
        }
    }
}

/// What to report for a timepoint whose fit did not converge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NonConvergencePolicy {
    /// Keep the solver's best estimate
    #[default]
    KeepBestEffort,
    /// Write NaN into every parameter at that timepoint
    MarkUndefined,
}

/// Magnet estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnetFinderConfig {
    pub initial_params: MagnetParams,
    pub baseline_mode: BaselineMode,
    pub non_convergence: NonConvergencePolicy,
    pub solver: SolverSettings,
    pub geometry: WellGeometry,
    /// Zero-phase Butterworth low-pass applied to the fitted series
    pub post_filter_cutoff_hz: Option<f64>,
}

impl Default for MagnetFinderConfig {
    fn default() -> Self {
        MagnetFinderConfig {
            initial_params: MagnetParams::default(),
            baseline_mode: BaselineMode::default(),
            non_convergence: NonConvergencePolicy::default(),
            solver: SolverSettings::default(),
            geometry: WellGeometry::default(),
            post_filter_cutoff_hz: Some(POST_FILTER_CUTOFF_HZ),
        }
    }
}

/// Fitted parameters, each shaped (well, timepoint)
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetEstimate {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
    pub z: Array2<f64>,
    pub theta: Array2<f64>,
    pub phi: Array2<f64>,
    pub remn: Array2<f64>,
    /// Timepoints whose fit did not converge, regardless of policy
    pub unconverged: Array2<bool>,
}

impl MagnetEstimate {
    pub fn num_wells(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_timepoints(&self) -> usize {
        self.x.ncols()
    }

    /// X displacement series of one well
    pub fn displacement(&self, well: usize) -> Array1<f64> {
        self.x.row(well).to_owned()
    }

    pub fn unconverged_count(&self) -> usize {
        self.unconverged.iter().filter(|&&u| u).count()
    }
}

/// Per-well fit output before assembly
struct WellFit {
    params: Vec<MagnetParams>,
    unconverged: Vec<bool>,
}

/// Estimate magnet positions for every well and timepoint.
///
/// `tissue` and `baseline` are flux densities in mT shaped
/// (well, sensor, axis, timepoint).
pub fn find_magnet_positions(
    tissue: &Array4<f64>,
    baseline: &Array4<f64>,
    sampling_period_us: f64,
    config: &MagnetFinderConfig,
) -> MyoResult<MagnetEstimate> {
    validate_shapes(tissue, baseline)?;
    let corrected = subtract_baseline(tissue, baseline, config.baseline_mode)?;
    let (num_wells, num_timepoints) = (corrected.shape()[0], corrected.shape()[3]);

    info!(
        wells = num_wells,
        timepoints = num_timepoints,
        "Estimating magnet positions"
    );

    let fit_one = |well: usize| fit_well(well, corrected.index_axis(Axis(0), well), config);

    #[cfg(feature = "parallel")]
    let fits: Vec<WellFit> = (0..num_wells).into_par_iter().map(fit_one).collect::<MyoResult<_>>()?;
    #[cfg(not(feature = "parallel"))]
    let fits: Vec<WellFit> = (0..num_wells).map(fit_one).collect::<MyoResult<_>>()?;

    let mut params = [(); PARAMETER_COUNT].map(|_| Array2::<f64>::zeros((num_wells, num_timepoints)));
    let mut unconverged = Array2::from_elem((num_wells, num_timepoints), false);
    for (well, fit) in fits.iter().enumerate() {
        for (t, p) in fit.params.iter().enumerate() {
            let v = p.to_vector();
            for (k, array) in params.iter_mut().enumerate() {
                array[(well, t)] = v[k];
            }
        }
        for (t, &u) in fit.unconverged.iter().enumerate() {
            unconverged[(well, t)] = u;
        }
    }

    if let Some(cutoff) = config.post_filter_cutoff_hz {
        post_filter(&mut params, &unconverged, config.non_convergence, sampling_period_us, cutoff)?;
    }

    let failures = unconverged.iter().filter(|&&u| u).count();
    if failures > 0 {
        warn!(
            count = failures,
            policy = ?config.non_convergence,
            "Magnet fit did not converge at some timepoints"
        );
    }

    let [x, y, z, theta, phi, remn] = params;
    Ok(MagnetEstimate {
        x,
        y,
        z,
        theta,
        phi,
        remn,
        unconverged,
    })
}

fn validate_shapes(tissue: &Array4<f64>, baseline: &Array4<f64>) -> MyoResult<()> {
    let expected = [SENSORS_PER_WELL, AXES_PER_SENSOR];
    for (name, array) in [("tissue", tissue), ("baseline", baseline)] {
        if array.shape()[1..3] != expected {
            return Err(MyoError::ShapeMismatch {
                expected: format!("{} data shaped (well, {}, {}, time)", name, SENSORS_PER_WELL, AXES_PER_SENSOR),
                actual: format!("{:?}", array.shape()),
            });
        }
        if array.shape()[3] == 0 {
            return Err(MyoError::ShapeMismatch {
                expected: format!("{} data with at least one timepoint", name),
                actual: format!("{:?}", array.shape()),
            });
        }
    }
    if tissue.shape()[0] != baseline.shape()[0] {
        return Err(MyoError::ShapeMismatch {
            expected: format!("{} baseline wells", tissue.shape()[0]),
            actual: format!("{} baseline wells", baseline.shape()[0]),
        });
    }
    Ok(())
}

/// Tissue flux minus the aligned baseline flux
pub fn subtract_baseline(tissue: &Array4<f64>, baseline: &Array4<f64>, mode: BaselineMode) -> MyoResult<Array4<f64>> {
    let num_timepoints = tissue.shape()[3];
    let num_baseline = baseline.shape()[3];
    if num_baseline == 0 || tissue.shape()[..3] != baseline.shape()[..3] {
        return Err(MyoError::ShapeMismatch {
            expected: format!("baseline shaped {:?} with timepoints", &tissue.shape()[..3]),
            actual: format!("{:?}", baseline.shape()),
        });
    }
    match mode {
        BaselineMode::Mean { num_points } => {
            if num_points == 0 {
                return Err(MyoError::InvalidConfiguration {
                    message: "baseline mean needs at least one data point".to_string(),
                });
            }
            let start = num_baseline.saturating_sub(num_points);
            let mean = baseline
                .slice(s![.., .., .., start..])
                .mean_axis(Axis(3))
                .ok_or_else(|| MyoError::ShapeMismatch {
                    expected: "non-empty baseline".to_string(),
                    actual: format!("{:?}", baseline.shape()),
                })?;
            let mean = mean.insert_axis(Axis(3));
            Ok(tissue - &mean)
        }
        BaselineMode::Extended => {
            let mut corrected = tissue.clone();
            for t in 0..num_timepoints {
                let b = baseline.index_axis(Axis(3), t % num_baseline);
                let mut slot = corrected.index_axis_mut(Axis(3), t);
                slot -= &b;
            }
            Ok(corrected)
        }
    }
}

/// Fit every timepoint of one well.
///
/// Fails with `SolverFailure` when no timepoint yields a finite fit.
fn fit_well(well: usize, flux: ArrayView3<'_, f64>, config: &MagnetFinderConfig) -> MyoResult<WellFit> {
    let num_timepoints = flux.shape()[2];
    let mut params = Vec::with_capacity(num_timepoints);
    let mut unconverged = Vec::with_capacity(num_timepoints);
    let mut guess = config.initial_params.to_vector();
    let mut any_finite = false;

    for t in 0..num_timepoints {
        let mut measured = FluxVector::zeros();
        for sensor in 0..SENSORS_PER_WELL {
            for axis in 0..AXES_PER_SENSOR {
                measured[sensor * AXES_PER_SENSOR + axis] = flux[(sensor, axis, t)];
            }
        }

        let fit = solver::levenberg_marquardt(
            |p| config.geometry.predicted_flux(&MagnetParams::from_vector(p)) - measured,
            guess,
            &config.solver,
        );

        if !fit.converged {
            debug!(t, cost = fit.cost, iterations = fit.iterations, "magnet fit not converged");
        }
        if fit.cost.is_finite() && fit.params.iter().all(|v| v.is_finite()) {
            guess = fit.params;
            any_finite = true;
        }

        let estimate = match (fit.converged, config.non_convergence) {
            (false, NonConvergencePolicy::MarkUndefined) => MagnetParams::undefined(),
            _ => MagnetParams::from_vector(&fit.params),
        };
        params.push(estimate);
        unconverged.push(!fit.converged);
    }

    if !any_finite {
        return Err(MyoError::SolverFailure {
            reason: format!("no finite magnet fit for well {} over {} timepoints", well, num_timepoints),
        });
    }
    Ok(WellFit { params, unconverged })
}

/// Smooth every parameter series in place.
///
/// Undefined points are bridged by linear interpolation for filtering and
/// marked undefined again afterwards.
fn post_filter(
    params: &mut [Array2<f64>; PARAMETER_COUNT],
    unconverged: &Array2<bool>,
    policy: NonConvergencePolicy,
    sampling_period_us: f64,
    cutoff_hz: f64,
) -> MyoResult<()> {
    let fs = 1e6 / sampling_period_us;
    if cutoff_hz >= fs / 2.0 {
        debug!(cutoff_hz, fs, "post-filter cutoff at or above Nyquist, skipping");
        return Ok(());
    }
    let filter = SosFilter::design(FilterFamily::Butterworth, FilterResponse::Lowpass { cutoff_hz }, fs)?;

    for array in params.iter_mut() {
        for (well, mut row) in array.axis_iter_mut(Axis(0)).enumerate() {
            let mut series = row.to_vec();
            if !bridge_undefined(&mut series) {
                continue;
            }
            let smoothed = filter.filtfilt(&series);
            for (t, value) in row.iter_mut().enumerate() {
                let undefined = policy == NonConvergencePolicy::MarkUndefined && unconverged[(well, t)];
                *value = if undefined { f64::NAN } else { smoothed[t] };
            }
        }
    }
    Ok(())
}

/// Linearly interpolate over NaN gaps; edges take the nearest value.
/// Returns false when no finite value exists.
fn bridge_undefined(series: &mut [f64]) -> bool {
    let finite: Vec<usize> = (0..series.len()).filter(|&i| series[i].is_finite()).collect();
    let (Some(&first), Some(&last)) = (finite.first(), finite.last()) else {
        return false;
    };
    for i in 0..first {
        series[i] = series[first];
    }
    for i in last + 1..series.len() {
        series[i] = series[last];
    }
    for pair in finite.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for i in a + 1..b {
            let frac = (i - a) as f64 / (b - a) as f64;
            series[i] = series[a] + frac * (series[b] - series[a]);
        }
    }
    true
}
