// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Constrained Oxygen-Cost Fitter
//!
//! Regresses oxygen budgets on feature vectors. The unconstrained solution is
//! an ordinary least-squares fit; the constrained solution, used everywhere
//! downstream, forces every coefficient to be non-negative.
//!
//! Columns that carry no independent signal (all zero, or a linear
//! combination of columns with higher identification priority) are fixed to
//! zero in both solutions and reported as degenerate.

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;
use tracing::debug;

use super::features::FeatureVector;
use super::linalg::{least_squares, nnls, screen_columns};
use super::{evaluate, ModelError, Parameter, ParameterSet};
use crate::constants::model::{DEFAULT_NNLS_MAX_ITERATIONS, DEFAULT_RANK_TOLERANCE};

/// Columns are screened in this order; the earlier a column appears, the more
/// likely it is to be kept when several columns are collinear.
const IDENTIFICATION_PRIORITY: [Parameter; Parameter::COUNT] = [
    Parameter::StaticRate,
    Parameter::WallPush,
    Parameter::Arm,
    Parameter::Leg,
    Parameter::Dolphin,
    Parameter::IntensityTime,
    Parameter::AnaerobicRecovery,
];

/// One regression row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSample {
    pub features: FeatureVector,
    /// Oxygen budget in seconds
    pub target_s: f64,
}

impl FitSample {
    pub fn new(features: FeatureVector, target_s: f64) -> Self {
        Self { features, target_s }
    }
}

/// Fit quality over a set of predictions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitMetrics {
    pub attempts: usize,
    pub mean_abs_error_s: f64,
    pub median_abs_error_s: f64,
    pub max_abs_error_s: f64,
    /// Mean of |residual| / budget, as a fraction
    pub mean_abs_pct_error: Option<f64>,
}

impl FitMetrics {
    /// Compute metrics from `(predicted, budget)` pairs
    pub fn from_predictions(pairs: &[(f64, f64)]) -> Self {
        let mut errors: Vec<f64> = pairs
            .iter()
            .map(|(predicted, budget)| (predicted - budget).abs())
            .filter(|error| error.is_finite())
            .collect();
        errors.sort_by(f64::total_cmp);

        let attempts = errors.len();
        let mean_abs_error_s = if attempts == 0 {
            0.0
        } else {
            errors.iter().sum::<f64>() / attempts as f64
        };

        let pct: Vec<f64> = pairs
            .iter()
            .filter(|(predicted, budget)| predicted.is_finite() && budget.is_finite() && *budget > 0.0)
            .map(|(predicted, budget)| (predicted - budget).abs() / budget)
            .collect();

        Self {
            attempts,
            mean_abs_error_s,
            median_abs_error_s: median_sorted(&errors).unwrap_or(0.0),
            max_abs_error_s: errors.last().copied().unwrap_or(0.0),
            mean_abs_pct_error: if pct.is_empty() {
                None
            } else {
                Some(pct.iter().sum::<f64>() / pct.len() as f64)
            },
        }
    }
}

/// Median of an already sorted slice
pub(crate) fn median_sorted(sorted: &[f64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2]),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

/// Both parameter sets of a fit plus diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct FitOutcome {
    pub unconstrained: ParameterSet,
    pub constrained: ParameterSet,
    /// Coefficients fixed to zero because their column carried no signal
    pub degenerate: Vec<Parameter>,
    /// True when the unconstrained fit had a negative coefficient
    pub constraint_active: bool,
    pub nnls_iterations: usize,
    pub nnls_converged: bool,
    /// Metrics of the constrained solution
    pub metrics: FitMetrics,
}

impl FitOutcome {
    pub fn is_degenerate(&self, parameter: Parameter) -> bool {
        self.degenerate.contains(&parameter)
    }
}

/// Least-squares fitter with a non-negativity constraint
#[derive(Debug, Clone, Copy)]
pub struct OxygenCostFitter {
    rank_tolerance: f64,
    nnls_max_iterations: usize,
}

impl Default for OxygenCostFitter {
    fn default() -> Self {
        Self::new()
    }
}

impl OxygenCostFitter {
    /// Fewest samples that can determine every coefficient plus one degree of freedom
    pub const REQUIRED_SAMPLES: usize = Parameter::COUNT + 1;

    pub fn new() -> Self {
        Self {
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
            nnls_max_iterations: DEFAULT_NNLS_MAX_ITERATIONS,
        }
    }

    pub fn with_limits(rank_tolerance: f64, nnls_max_iterations: usize) -> Self {
        let defaults = Self::new();
        Self {
            rank_tolerance: if rank_tolerance.is_finite() && rank_tolerance > 0.0 {
                rank_tolerance
            } else {
                defaults.rank_tolerance
            },
            nnls_max_iterations: nnls_max_iterations.max(1),
        }
    }

    /// Fit both parameter sets
    ///
    /// Samples whose target is not a positive finite number are ignored.
    pub fn fit(&self, samples: &[FitSample]) -> Result<FitOutcome, ModelError> {
        let usable: Vec<&FitSample> = samples
            .iter()
            .filter(|sample| sample.target_s.is_finite() && sample.target_s > 0.0)
            .collect();

        if usable.len() < Self::REQUIRED_SAMPLES {
            return Err(ModelError::InsufficientData {
                required: Self::REQUIRED_SAMPLES,
                available: usable.len(),
            });
        }

        let rows = usable.len();
        let mut design = Array2::<f64>::zeros((rows, Parameter::COUNT));
        let mut target = Array1::<f64>::zeros(rows);
        for (row, sample) in usable.iter().enumerate() {
            for (parameter, value) in sample.features.iter() {
                design[[row, parameter.index()]] = if value.is_finite() { value } else { 0.0 };
            }
            target[row] = sample.target_s;
        }

        let priority: Vec<usize> = IDENTIFICATION_PRIORITY.iter().map(|p| p.index()).collect();
        let screen = screen_columns(design.view(), &priority, self.rank_tolerance);
        if screen.kept.is_empty() {
            return Err(ModelError::AllFeaturesDegenerate);
        }

        let mut kept = screen.kept.clone();
        kept.sort_unstable();
        let degenerate: Vec<Parameter> = {
            let mut dropped: Vec<Parameter> =
                screen.dropped.iter().map(|&column| Parameter::ALL[column]).collect();
            dropped.sort();
            dropped
        };

        let reduced = design.select(Axis(1), &kept);
        let ols = least_squares(reduced.view(), target.view())?;
        let unconstrained = expand(&kept, ols.iter().copied());

        let constraint_active = !unconstrained.is_non_negative();
        let (constrained, nnls_iterations, nnls_converged) = if constraint_active {
            let solution = nnls(reduced.view(), target.view(), self.nnls_max_iterations)?;
            let constrained = expand(&kept, solution.x.iter().map(|value| value.max(0.0)));
            (constrained, solution.iterations, solution.converged)
        } else {
            (unconstrained, 0, true)
        };

        let pairs: Vec<(f64, f64)> = usable
            .iter()
            .map(|sample| (evaluate(&constrained, &sample.features).predicted_o2_s, sample.target_s))
            .collect();
        let metrics = FitMetrics::from_predictions(&pairs);

        debug!(
            fit.samples = rows,
            fit.kept_columns = kept.len(),
            fit.constraint_active = constraint_active,
            fit.nnls_iterations = nnls_iterations,
            fit.mae_s = metrics.mean_abs_error_s,
            "Oxygen-cost fit complete"
        );

        Ok(FitOutcome {
            unconstrained,
            constrained,
            degenerate,
            constraint_active,
            nnls_iterations,
            nnls_converged,
            metrics,
        })
    }
}

/// Scatter a reduced solution back into canonical order; dropped columns stay zero
fn expand(kept: &[usize], values: impl Iterator<Item = f64>) -> ParameterSet {
    let mut params = ParameterSet::zeros();
    for (&column, value) in kept.iter().zip(values) {
        params.set(Parameter::ALL[column], value);
    }
    params
}
