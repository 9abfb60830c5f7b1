// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Penalty Scoring
//!
//! Residuals are normalized by their reference value (budget or achieved
//! distance) and weighted asymmetrically: over-predicting oxygen cost or
//! distance costs more than under-predicting it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::constants::scoring::{
    COMBINED_DISTANCE_WEIGHT, COMBINED_STA_WEIGHT, DISTANCE_OVER_WEIGHT, DISTANCE_UNDER_WEIGHT,
    STA_OVER_WEIGHT, STA_UNDER_WEIGHT,
};
use crate::models::positive;

/// Weights applied to positive (over) and negative (under) residuals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyWeights {
    pub over: f64,
    pub under: f64,
}

impl PenaltyWeights {
    pub fn sta() -> Self {
        Self {
            over: STA_OVER_WEIGHT,
            under: STA_UNDER_WEIGHT,
        }
    }

    pub fn distance() -> Self {
        Self {
            over: DISTANCE_OVER_WEIGHT,
            under: DISTANCE_UNDER_WEIGHT,
        }
    }

    /// Weight for a residual; zero counts as over
    pub fn for_residual(&self, residual: f64) -> f64 {
        if residual >= 0.0 {
            self.over
        } else {
            self.under
        }
    }
}

/// Weighted |residual| / reference, `None` when either side is unusable
pub fn asymmetric_penalty(residual: f64, reference: f64, weights: &PenaltyWeights) -> Option<f64> {
    if !residual.is_finite() || !positive(reference) {
        return None;
    }
    Some(weights.for_residual(residual) * residual.abs() / reference)
}

/// What the scorer needs to know about one attempt
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreInput {
    pub budget_s: f64,
    pub predicted_o2_s: f64,
    pub actual_distance_m: Option<f64>,
    pub predicted_distance_m: Option<f64>,
}

/// Penalties of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttemptPenalty {
    pub sta: Option<f64>,
    pub distance: Option<f64>,
    pub combined: Option<f64>,
}

/// Dataset-level penalty score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PenaltyScore {
    pub sta_penalty: Option<f64>,
    pub distance_penalty: Option<f64>,
    pub combined: Option<f64>,
    pub sta_attempts: usize,
    pub distance_attempts: usize,
}

/// A named parameter set and its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub name: String,
    pub rank: usize,
    pub score: PenaltyScore,
}

/// Scores predictions against observed budgets and distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenaltyScorer {
    pub sta: PenaltyWeights,
    pub distance: PenaltyWeights,
    pub combined_sta_weight: f64,
    pub combined_distance_weight: f64,
}

impl Default for PenaltyScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl PenaltyScorer {
    pub fn new() -> Self {
        Self {
            sta: PenaltyWeights::sta(),
            distance: PenaltyWeights::distance(),
            combined_sta_weight: COMBINED_STA_WEIGHT,
            combined_distance_weight: COMBINED_DISTANCE_WEIGHT,
        }
    }

    pub fn sta_penalty(&self, input: &ScoreInput) -> Option<f64> {
        asymmetric_penalty(input.predicted_o2_s - input.budget_s, input.budget_s, &self.sta)
    }

    pub fn distance_penalty(&self, input: &ScoreInput) -> Option<f64> {
        match (input.predicted_distance_m, input.actual_distance_m) {
            (Some(predicted), Some(actual)) => {
                asymmetric_penalty(predicted - actual, actual, &self.distance)
            }
            _ => None,
        }
    }

    /// Weighted mean of the available components
    pub fn combine(&self, sta: Option<f64>, distance: Option<f64>) -> Option<f64> {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        if let Some(sta) = sta {
            weighted += self.combined_sta_weight * sta;
            total_weight += self.combined_sta_weight;
        }
        if let Some(distance) = distance {
            weighted += self.combined_distance_weight * distance;
            total_weight += self.combined_distance_weight;
        }
        (total_weight > 0.0).then(|| weighted / total_weight)
    }

    pub fn attempt(&self, input: &ScoreInput) -> AttemptPenalty {
        let sta = self.sta_penalty(input);
        let distance = self.distance_penalty(input);
        AttemptPenalty {
            sta,
            distance,
            combined: self.combine(sta, distance),
        }
    }

    /// Average penalties over a dataset
    ///
    /// Attempts missing a component are left out of that component's mean.
    pub fn score(&self, inputs: &[ScoreInput]) -> PenaltyScore {
        let sta: Vec<f64> = inputs.iter().filter_map(|input| self.sta_penalty(input)).collect();
        let distance: Vec<f64> = inputs
            .iter()
            .filter_map(|input| self.distance_penalty(input))
            .collect();

        let sta_penalty = mean(&sta);
        let distance_penalty = mean(&distance);
        PenaltyScore {
            sta_penalty,
            distance_penalty,
            combined: self.combine(sta_penalty, distance_penalty),
            sta_attempts: sta.len(),
            distance_attempts: distance.len(),
        }
    }

    /// Order named candidates by combined score, best first
    ///
    /// Candidates without a combined score sort last; ties keep input order.
    pub fn rank(&self, candidates: Vec<(String, PenaltyScore)>) -> Vec<RankedCandidate> {
        let mut candidates = candidates;
        candidates.sort_by(|(_, a), (_, b)| match (a.combined, b.combined) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        candidates
            .into_iter()
            .enumerate()
            .map(|(index, (name, score))| RankedCandidate {
                name,
                rank: index + 1,
                score,
            })
            .collect()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
