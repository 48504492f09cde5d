//! Levenberg–Marquardt least squares for the 9×6 magnet fit

use super::model::{FluxVector, ParamVector, MEASUREMENTS_PER_WELL, PARAMETER_COUNT};
use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

type Jacobian = SMatrix<f64, MEASUREMENTS_PER_WELL, PARAMETER_COUNT>;
type Normal = SMatrix<f64, PARAMETER_COUNT, PARAMETER_COUNT>;

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e16;

/// Solver tolerances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative cost reduction below which the fit is converged
    pub cost_tolerance: f64,
    /// Relative step size below which the fit is converged
    pub step_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 200,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-10,
        }
    }
}

/// Outcome of one fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitResult {
    pub params: ParamVector,
    pub cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Minimise ½‖residual(p)‖² starting from `initial`.
///
/// The Jacobian is approximated by forward differences. Returns the best
/// parameters seen even when the tolerances are not met.
pub fn levenberg_marquardt<F>(residual: F, initial: ParamVector, settings: &SolverSettings) -> FitResult
where
    F: Fn(&ParamVector) -> FluxVector,
{
    let mut params = initial;
    let mut r = residual(&params);
    let mut cost = 0.5 * r.norm_squared();
    let mut damping = INITIAL_DAMPING;

    if !cost.is_finite() {
        return FitResult { params, cost, iterations: 0, converged: false };
    }

    for iteration in 1..=settings.max_iterations {
        if cost == 0.0 {
            return FitResult { params, cost, iterations: iteration - 1, converged: true };
        }
        let jac = forward_difference_jacobian(&residual, &params, &r);
        let jtj: Normal = jac.transpose() * jac;
        let gradient = jac.transpose() * r;

        loop {
            let mut lhs = jtj;
            for k in 0..PARAMETER_COUNT {
                lhs[(k, k)] += damping * jtj[(k, k)].max(1e-12);
            }
            let step = match lhs.cholesky() {
                Some(chol) => -chol.solve(&gradient),
                None => {
                    damping *= 10.0;
                    if damping > MAX_DAMPING {
                        return FitResult { params, cost, iterations: iteration, converged: false };
                    }
                    continue;
                }
            };

            let candidate = params + step;
            let r_new = residual(&candidate);
            let cost_new = 0.5 * r_new.norm_squared();

            if cost_new.is_finite() && cost_new < cost {
                let reduction = (cost - cost_new) / cost;
                let step_small = step.norm() <= settings.step_tolerance * (params.norm() + settings.step_tolerance);
                params = candidate;
                r = r_new;
                cost = cost_new;
                damping = (damping / 10.0).max(1e-12);
                if reduction <= settings.cost_tolerance || step_small {
                    return FitResult { params, cost, iterations: iteration, converged: true };
                }
                break;
            }

            damping *= 10.0;
            if damping > MAX_DAMPING {
                // no descent direction left: a stationary point
                let converged = gradient.norm() <= settings.step_tolerance.sqrt() * (1.0 + cost);
                return FitResult { params, cost, iterations: iteration, converged };
            }
        }
    }

    FitResult {
        params,
        cost,
        iterations: settings.max_iterations,
        converged: false,
    }
}

fn forward_difference_jacobian<F>(residual: &F, params: &ParamVector, r0: &FluxVector) -> Jacobian
where
    F: Fn(&ParamVector) -> FluxVector,
{
    let mut jac = Jacobian::zeros();
    for k in 0..PARAMETER_COUNT {
        let h = 1e-7 * params[k].abs().max(1.0);
        let mut shifted = *params;
        shifted[k] += h;
        let column = (residual(&shifted) - r0) / h;
        jac.set_column(k, &column);
    }
    jac
}
