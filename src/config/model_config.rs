// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Oxygen model configuration: intensity, fit, scoring, descent and band
//! parameters plus manual coefficient overrides

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{bands, descent, model, scoring};
use crate::propulsion::descent::PenaltyDescent;
use crate::propulsion::scoring::{PenaltyScorer, PenaltyWeights};
use crate::propulsion::{FeatureVectorBuilder, ModelError, MovementIntensityEstimator, OxygenCostFitter, ParameterSet};

/// All tunable model parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub intensity: IntensitySettings,
    pub fit: FitSettings,
    pub scoring: ScoringSettings,
    pub descent: DescentSettings,
    pub bands: BandSettings,
    /// Coefficient overrides keyed by canonical parameter name
    pub manual: HashMap<String, f64>,
}

/// Movement intensity and split geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntensitySettings {
    pub split_distance_m: f64,
    pub arm_leg_ratio: f64,
    pub intensity_floor: f64,
}

/// Least-squares fit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    pub rank_tolerance: f64,
    pub nnls_max_iterations: usize,
    /// Attempts shorter than this are left out of the fit
    pub min_distance_m: f64,
    /// Leave out attempts whose swim time is not below the STA budget
    pub require_budget_margin: bool,
}

/// Penalty weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub sta: PenaltyWeights,
    pub distance: PenaltyWeights,
    pub combined_sta_weight: f64,
    pub combined_distance_weight: f64,
}

/// Penalty descent refinement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescentSettings {
    pub enabled: bool,
    pub learning_rate: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// Fit band construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandSettings {
    pub min_points: usize,
    pub sample_count: usize,
    pub coverage_target: f64,
    pub widen_factor: f64,
    pub max_widenings: usize,
    pub mad_scale: f64,
    pub min_distance_half_width: f64,
    pub min_cost_half_width: f64,
    pub min_movement_half_width: f64,
    /// Widening cap for the movement intensity and work bias bands
    pub movement_max_widenings: usize,
}

impl ModelConfig {
    /// Apply the `[manual]` overrides to a base parameter set
    pub fn manual_parameters(&self, base: ParameterSet) -> Result<ParameterSet, ModelError> {
        base.with_overrides(&self.manual)
    }

    pub fn estimator(&self) -> MovementIntensityEstimator {
        MovementIntensityEstimator::with_arm_leg_ratio(self.intensity.arm_leg_ratio)
    }

    pub fn builder(&self) -> FeatureVectorBuilder {
        FeatureVectorBuilder::with_intensity_floor(self.intensity.intensity_floor)
    }

    pub fn fitter(&self) -> OxygenCostFitter {
        OxygenCostFitter::with_limits(self.fit.rank_tolerance, self.fit.nnls_max_iterations)
    }

    pub fn scorer(&self) -> PenaltyScorer {
        PenaltyScorer {
            sta: self.scoring.sta,
            distance: self.scoring.distance,
            combined_sta_weight: self.scoring.combined_sta_weight,
            combined_distance_weight: self.scoring.combined_distance_weight,
        }
    }

    pub fn descent(&self) -> PenaltyDescent {
        PenaltyDescent::with_limits(
            self.descent.learning_rate,
            self.descent.max_iterations,
            self.descent.tolerance,
        )
        .with_scorer(self.scorer())
    }
}

impl Default for IntensitySettings {
    fn default() -> Self {
        Self {
            split_distance_m: model::DEFAULT_SPLIT_DISTANCE_M,
            arm_leg_ratio: model::DEFAULT_ARM_LEG_RATIO,
            intensity_floor: model::INTENSITY_FLOOR,
        }
    }
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            rank_tolerance: model::DEFAULT_RANK_TOLERANCE,
            nnls_max_iterations: model::DEFAULT_NNLS_MAX_ITERATIONS,
            min_distance_m: 0.0,
            require_budget_margin: true,
        }
    }
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            sta: PenaltyWeights::sta(),
            distance: PenaltyWeights::distance(),
            combined_sta_weight: scoring::COMBINED_STA_WEIGHT,
            combined_distance_weight: scoring::COMBINED_DISTANCE_WEIGHT,
        }
    }
}

impl Default for DescentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            learning_rate: descent::LEARNING_RATE,
            max_iterations: descent::MAX_ITERATIONS,
            tolerance: descent::TOLERANCE,
        }
    }
}

impl Default for BandSettings {
    fn default() -> Self {
        Self {
            min_points: bands::MIN_POINTS,
            sample_count: bands::SAMPLE_COUNT,
            coverage_target: bands::COVERAGE_TARGET,
            widen_factor: bands::WIDEN_FACTOR,
            max_widenings: bands::MAX_WIDENINGS,
            mad_scale: bands::MAD_SCALE,
            min_distance_half_width: bands::MIN_DISTANCE_HALF_WIDTH,
            min_cost_half_width: bands::MIN_COST_HALF_WIDTH,
            min_movement_half_width: bands::MIN_MOVEMENT_HALF_WIDTH,
            movement_max_widenings: bands::MOVEMENT_MAX_WIDENINGS,
        }
    }
}
