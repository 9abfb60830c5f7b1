// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Penalty descent: refines a parameter set directly against the combined
//! penalty score by averaged subgradient steps, projecting back onto the
//! bounds and movement hierarchy after every step.

use serde::Serialize;
use tracing::{debug, warn};

use super::features::FeatureVector;
use super::scoring::PenaltyScorer;
use super::{evaluate, Parameter, ParameterSet};
use crate::constants::descent::{
    ARM_LEG_RATIO_MAX, LEARNING_RATE, MAX_ITERATIONS, STATIC_MIN, TOLERANCE, WALL_LEG_EPS,
};
use crate::models::positive;

/// Whole-attempt features with the observed budget and distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentSample {
    pub features: FeatureVector,
    pub budget_s: f64,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescentOutcome {
    pub params: ParameterSet,
    pub iterations: usize,
    /// True when the update norm fell below the tolerance
    pub converged: bool,
    pub initial_penalty: Option<f64>,
    pub final_penalty: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
pub struct PenaltyDescent {
    learning_rate: f64,
    max_iterations: usize,
    tolerance: f64,
    scorer: PenaltyScorer,
}

impl Default for PenaltyDescent {
    fn default() -> Self {
        Self::new()
    }
}

impl PenaltyDescent {
    pub fn new() -> Self {
        Self {
            learning_rate: LEARNING_RATE,
            max_iterations: MAX_ITERATIONS,
            tolerance: TOLERANCE,
            scorer: PenaltyScorer::new(),
        }
    }

    pub fn with_limits(learning_rate: f64, max_iterations: usize, tolerance: f64) -> Self {
        Self {
            learning_rate: if positive(learning_rate) { learning_rate } else { LEARNING_RATE },
            max_iterations,
            tolerance: if positive(tolerance) { tolerance } else { TOLERANCE },
            scorer: PenaltyScorer::new(),
        }
    }

    pub fn with_scorer(mut self, scorer: PenaltyScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Project a parameter set onto the feasible region
    ///
    /// Every coefficient is non-negative and the static rate is at least
    /// [`STATIC_MIN`]. A wall push never costs less than a leg kick, and an
    /// arm pull never costs more than [`ARM_LEG_RATIO_MAX`] leg kicks.
    pub fn enforce_bounds(params: &mut ParameterSet) {
        for parameter in Parameter::ALL {
            let value = params.get(parameter);
            let value = if value.is_finite() { value } else { 0.0 };
            let floor = if parameter == Parameter::StaticRate { STATIC_MIN } else { 0.0 };
            params.set(parameter, value.max(floor));
        }

        let leg = params.get(Parameter::Leg);
        if params.get(Parameter::WallPush) < leg {
            params.set(Parameter::WallPush, leg + WALL_LEG_EPS);
        }
        if leg > 0.0 {
            let max_arm = leg * ARM_LEG_RATIO_MAX;
            if params.get(Parameter::Arm) > max_arm {
                params.set(Parameter::Arm, max_arm);
            }
        }
    }

    /// Combined penalty of one sample and its derivative with respect to the prediction
    fn penalty_and_slope(&self, sample: &DescentSample, prediction: f64) -> Option<(f64, f64)> {
        let budget = sample.budget_s;
        let mut weighted = 0.0;
        let mut slope = 0.0;
        let mut total_weight = 0.0;

        let residual = prediction - budget;
        if residual.is_finite() && positive(budget) {
            let weight = self.scorer.sta.for_residual(residual);
            let sign = if residual >= 0.0 { 1.0 } else { -1.0 };
            weighted += self.scorer.combined_sta_weight * weight * residual.abs() / budget;
            slope += self.scorer.combined_sta_weight * weight * sign / budget;
            total_weight += self.scorer.combined_sta_weight;
        }

        let distance = sample.distance_m;
        if positive(prediction) && positive(distance) && positive(budget) {
            let numerator = budget * distance;
            let delta = numerator / prediction - distance;
            let weight = self.scorer.distance.for_residual(delta);
            let sign = if delta >= 0.0 { 1.0 } else { -1.0 };
            let d_distance = -numerator / (prediction * prediction);
            weighted += self.scorer.combined_distance_weight * weight * delta.abs() / distance;
            slope += self.scorer.combined_distance_weight * weight * sign * d_distance / distance;
            total_weight += self.scorer.combined_distance_weight;
        }

        (total_weight > 0.0).then(|| (weighted / total_weight, slope / total_weight))
    }

    /// Mean combined penalty of a parameter set over the samples
    pub fn mean_penalty(&self, params: &ParameterSet, samples: &[DescentSample]) -> Option<f64> {
        let penalties: Vec<f64> = samples
            .iter()
            .filter_map(|sample| {
                let prediction = evaluate(params, &sample.features).predicted_o2_s;
                self.penalty_and_slope(sample, prediction).map(|(penalty, _)| penalty)
            })
            .collect();
        (!penalties.is_empty()).then(|| penalties.iter().sum::<f64>() / penalties.len() as f64)
    }

    pub fn refine(&self, initial: &ParameterSet, samples: &[DescentSample]) -> DescentOutcome {
        let mut params = *initial;
        Self::enforce_bounds(&mut params);
        let initial_penalty = self.mean_penalty(&params, samples);

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            iterations += 1;

            let mut gradient = [0.0; Parameter::COUNT];
            let mut valid = 0usize;
            for sample in samples {
                let prediction = evaluate(&params, &sample.features).predicted_o2_s;
                let Some((penalty, slope)) = self.penalty_and_slope(sample, prediction) else {
                    continue;
                };
                if !penalty.is_finite() {
                    continue;
                }
                valid += 1;
                if slope.is_finite() {
                    for (slot, value) in gradient.iter_mut().zip(sample.features.values()) {
                        *slot += slope * value;
                    }
                }
            }

            if valid == 0 {
                warn!("No valid samples contributed to the penalty gradient");
                iterations -= 1;
                break;
            }

            let mut update_norm = 0.0;
            for parameter in Parameter::ALL {
                let step = self.learning_rate * gradient[parameter.index()] / valid as f64;
                update_norm += step * step;
                params.set(parameter, params.get(parameter) - step);
            }
            Self::enforce_bounds(&mut params);

            if update_norm.sqrt() < self.tolerance {
                converged = true;
                break;
            }
        }

        let final_penalty = self.mean_penalty(&params, samples);
        debug!(
            descent.iterations = iterations,
            descent.converged = converged,
            descent.initial_penalty = ?initial_penalty,
            descent.final_penalty = ?final_penalty,
            "Penalty descent finished"
        );

        DescentOutcome {
            params,
            iterations,
            converged,
            initial_penalty,
            final_penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propulsion::features::{FeatureInputs, FeatureVectorBuilder};

    fn samples() -> Vec<DescentSample> {
        let builder = FeatureVectorBuilder::new();
        (0..6)
            .map(|i| {
                let f = i as f64;
                let features = builder
                    .build(&FeatureInputs {
                        intensity: 0.9 + 0.04 * f,
                        wall_pushes: 2.0 + f,
                        arm_pulls: 12.0 + 4.0 * f,
                        leg_kicks: 18.0 + 5.0 * f,
                        dolphin_kicks: 0.0,
                        duration_s: 110.0 + 25.0 * f,
                    })
                    .vector;
                DescentSample {
                    features,
                    budget_s: 330.0 + 20.0 * f,
                    distance_m: 100.0 + 25.0 * f,
                }
            })
            .collect()
    }

    #[test]
    fn test_bounds_and_hierarchy() {
        let mut params = ParameterSet::from_values([1.0, 9.0, 2.0, -0.5, f64::NAN, 0.1, 0.2]);
        PenaltyDescent::enforce_bounds(&mut params);

        assert!(params.is_non_negative());
        assert_eq!(params.get(Parameter::StaticRate), STATIC_MIN);
        assert_eq!(params.get(Parameter::Dolphin), 0.0);
        assert_eq!(params.get(Parameter::IntensityTime), 0.0);
        assert!(params.get(Parameter::WallPush) >= params.get(Parameter::Leg));
        assert!((params.get(Parameter::Arm) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_refine_lowers_penalty_of_overshooting_start() {
        let mut values = *ParameterSet::reference().values();
        for value in values.iter_mut() {
            *value *= 2.0;
        }
        let start = ParameterSet::from_values(values);
        let descent = PenaltyDescent::with_limits(1e-5, 500, 1e-12);

        let outcome = descent.refine(&start, &samples());

        assert!(outcome.final_penalty.unwrap() < outcome.initial_penalty.unwrap());
        assert!(outcome.params.get(Parameter::StaticRate) >= STATIC_MIN);
        assert!(outcome.params.get(Parameter::WallPush) >= outcome.params.get(Parameter::Leg));
        assert!(
            outcome.params.get(Parameter::Arm)
                <= outcome.params.get(Parameter::Leg) * ARM_LEG_RATIO_MAX + 1e-12
        );
        assert_eq!(outcome.iterations, 500);
    }

    #[test]
    fn test_refine_without_samples_returns_bounded_start() {
        let outcome = PenaltyDescent::new().refine(&ParameterSet::zeros(), &[]);
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.converged);
        assert_eq!(outcome.final_penalty, None);
        assert_eq!(outcome.params.get(Parameter::StaticRate), STATIC_MIN);
    }
}
