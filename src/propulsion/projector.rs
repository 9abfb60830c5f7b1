// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Distance Projection
//!
//! Distance is re-derived from the oxygen-per-split identity rather than by
//! rescaling the achieved distance, so edited what-if compositions project
//! the same way as recorded attempts.

use serde::Serialize;
use std::fmt;

use super::features::{BuiltFeatures, FeatureInputs, FeatureVectorBuilder};
use super::{evaluate, ParameterSet, Prediction};
use crate::constants::model::DEFAULT_SPLIT_DISTANCE_M;
use crate::models::{positive, Attempt, MovementCounts};

/// Why a projection could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    NonPositiveBudget,
    NonPositiveSplitCost,
    NonPositiveSplitDistance,
    /// The attempt has no split to cost
    NoSplitComposition,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::NonPositiveBudget => "oxygen budget is not a positive number",
            UnavailableReason::NonPositiveSplitCost => "split cost is not a positive number",
            UnavailableReason::NonPositiveSplitDistance => "split distance is not a positive number",
            UnavailableReason::NoSplitComposition => "no split could be formed from the attempt",
        };
        f.write_str(text)
    }
}

/// Distance an oxygen budget supports
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Projection {
    Available {
        /// Splits the budget pays for (may be fractional)
        split_count: f64,
        distance_m: f64,
    },
    Unavailable {
        reason: UnavailableReason,
    },
}

impl Projection {
    pub fn is_available(&self) -> bool {
        matches!(self, Projection::Available { .. })
    }

    pub fn distance_m(&self) -> Option<f64> {
        match self {
            Projection::Available { distance_m, .. } => Some(*distance_m),
            Projection::Unavailable { .. } => None,
        }
    }

    pub fn split_count(&self) -> Option<f64> {
        match self {
            Projection::Available { split_count, .. } => Some(*split_count),
            Projection::Unavailable { .. } => None,
        }
    }
}

/// Project distance from an oxygen budget and a per-split cost
///
/// ```rust
/// use apnea_o2_model::propulsion::project_distance;
///
/// let projection = project_distance(420.0, 35.0, 50.0);
/// assert_eq!(projection.split_count(), Some(12.0));
/// assert_eq!(projection.distance_m(), Some(600.0));
/// assert!(!project_distance(0.0, 35.0, 50.0).is_available());
/// ```
pub fn project_distance(budget_s: f64, split_cost_s: f64, split_distance_m: f64) -> Projection {
    let reason = if !positive(budget_s) {
        Some(UnavailableReason::NonPositiveBudget)
    } else if !positive(split_cost_s) {
        Some(UnavailableReason::NonPositiveSplitCost)
    } else if !positive(split_distance_m) {
        Some(UnavailableReason::NonPositiveSplitDistance)
    } else {
        None
    };
    if let Some(reason) = reason {
        return Projection::Unavailable { reason };
    }

    let split_count = budget_s / split_cost_s;
    let distance_m = split_count * split_distance_m;
    if !distance_m.is_finite() {
        return Projection::Unavailable {
            reason: UnavailableReason::NonPositiveSplitCost,
        };
    }
    Projection::Available {
        split_count,
        distance_m,
    }
}

/// Number of splits in an attempt, never less than one
///
/// Returns `None` for a non-positive distance. An invalid split distance falls
/// back to the default pool length.
pub fn estimate_split_count(distance_m: f64, split_distance_m: f64) -> Option<f64> {
    if !positive(distance_m) {
        return None;
    }
    let split_distance = if positive(split_distance_m) {
        split_distance_m
    } else {
        DEFAULT_SPLIT_DISTANCE_M
    };
    Some((distance_m / split_distance).max(1.0))
}

/// An athlete's typical opening split
///
/// Each figure replaces the corresponding attempt average when building a
/// [`SplitComposition`]; missing figures fall back to those averages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OpeningSplit {
    pub split_time_s: Option<f64>,
    pub arm_pulls: Option<f64>,
    pub leg_kicks: Option<f64>,
}

/// Movements and time of one representative split
///
/// A composition can be edited and re-costed with any parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SplitComposition {
    pub split_distance_m: f64,
    pub split_time_s: f64,
    pub intensity: f64,
    pub counts: MovementCounts,
}

impl SplitComposition {
    /// Representative split of an attempt
    ///
    /// Time, arm pulls and leg kicks come from the athlete's opening split
    /// when known. Otherwise they, like the wall pushes and dolphin kicks,
    /// are the attempt totals spread evenly over the splits. Every split
    /// carries at least one wall push.
    pub fn from_attempt(
        attempt: &Attempt,
        intensity: f64,
        opening: OpeningSplit,
        split_distance_m: f64,
    ) -> Option<Self> {
        let split_distance = if positive(split_distance_m) {
            split_distance_m
        } else {
            DEFAULT_SPLIT_DISTANCE_M
        };
        let splits = estimate_split_count(attempt.distance_m, split_distance)?;

        let split_time_s = opening
            .split_time_s
            .filter(|time| positive(*time))
            .unwrap_or(attempt.total_time_s / splits);
        if !positive(split_time_s) {
            return None;
        }

        let per_split = attempt.totals.scaled(splits);
        let wall_pushes = if positive(per_split.wall_pushes) {
            per_split.wall_pushes
        } else {
            1.0
        };
        let counted = |value: Option<f64>| value.filter(|count| count.is_finite() && *count >= 0.0);
        let counts = MovementCounts::new(
            wall_pushes,
            counted(opening.arm_pulls).unwrap_or_else(|| finite_or_zero(per_split.arm_pulls)),
            counted(opening.leg_kicks).unwrap_or_else(|| finite_or_zero(per_split.leg_kicks)),
            finite_or_zero(per_split.dolphin_kicks),
        );

        Some(Self {
            split_distance_m: split_distance,
            split_time_s,
            intensity,
            counts,
        })
    }

    pub fn with_counts(mut self, counts: MovementCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_split_time(mut self, split_time_s: f64) -> Self {
        self.split_time_s = split_time_s;
        self
    }

    pub fn features(&self, builder: &FeatureVectorBuilder) -> BuiltFeatures {
        builder.build(&FeatureInputs::from_counts(
            self.intensity,
            &self.counts,
            self.split_time_s,
        ))
    }

    /// Oxygen cost of one split under `params`
    pub fn split_cost(&self, params: &ParameterSet, builder: &FeatureVectorBuilder) -> Prediction {
        evaluate(params, &self.features(builder).vector)
    }

    /// Distance `budget_s` supports at this composition
    pub fn project(
        &self,
        params: &ParameterSet,
        builder: &FeatureVectorBuilder,
        budget_s: f64,
    ) -> Projection {
        let cost = self.split_cost(params, builder).predicted_o2_s;
        project_distance(budget_s, cost, self.split_distance_m)
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}
