// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Propulsion Oxygen Model
//!
//! Linear oxygen bookkeeping for dynamic apnea swims. Every attempt is reduced
//! to a fixed-order feature vector (intensity-scaled movement counts plus swim
//! time terms) and its predicted oxygen cost is the dot product of that vector
//! with a [`ParameterSet`].
//!
//! This module includes:
//! - Movement intensity estimation from the opening split
//! - Feature vector construction
//! - Least-squares fitting with a non-negativity constraint
//! - Distance projection from an oxygen budget
//! - Asymmetric penalty scoring, optional penalty descent and fit bands
//! - The dataset pipeline and the manual tuning session

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

pub mod bands;
pub mod descent;
pub mod features;
pub mod fitter;
pub mod intensity;
pub mod linalg;
pub mod pipeline;
pub mod projector;
pub mod scoring;
pub mod session;

pub use features::{FeatureInputs, FeatureVector, FeatureVectorBuilder};
pub use fitter::{FitMetrics, FitOutcome, FitSample, OxygenCostFitter};
pub use intensity::{IntensityTable, MovementIntensityEstimator};
pub use pipeline::{AttemptPrediction, DatasetModel, DatasetReport};
pub use projector::{project_distance, OpeningSplit, Projection, SplitComposition};
pub use scoring::{PenaltyScore, PenaltyScorer};
pub use session::TuningSession;

/// Errors raised by the oxygen model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Too few valid attempts for the number of coefficients
    #[error("Insufficient data to fit: need at least {required} valid attempts, have {available}")]
    InsufficientData { required: usize, available: usize },

    /// No feature column carries any identifiable signal
    #[error("Every feature column is degenerate; no coefficient can be identified")]
    AllFeaturesDegenerate,

    /// Unknown, negative or non-finite coefficient
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Linear algebra failure
    #[error("Numerical failure: {0}")]
    Numerical(String),
}

/// Canonical model coefficients, in design-matrix column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    WallPush,
    Arm,
    Leg,
    Dolphin,
    IntensityTime,
    AnaerobicRecovery,
    StaticRate,
}

impl Parameter {
    pub const COUNT: usize = 7;

    pub const ALL: [Parameter; Parameter::COUNT] = [
        Parameter::WallPush,
        Parameter::Arm,
        Parameter::Leg,
        Parameter::Dolphin,
        Parameter::IntensityTime,
        Parameter::AnaerobicRecovery,
        Parameter::StaticRate,
    ];

    /// Serialized key of the coefficient
    pub fn key(self) -> &'static str {
        match self {
            Parameter::WallPush => "wall_push_o2_cost",
            Parameter::Arm => "arm_o2_cost",
            Parameter::Leg => "leg_o2_cost",
            Parameter::Dolphin => "dolphin_o2_cost",
            Parameter::IntensityTime => "intensity_time_o2_cost",
            Parameter::AnaerobicRecovery => "anaerobic_recovery_o2_cost",
            Parameter::StaticRate => "static_o2_rate",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|parameter| parameter.key() == key.trim())
    }

    /// Column index in the design matrix
    pub fn index(self) -> usize {
        self as usize
    }

    /// Coefficients multiplying an intensity-scaled movement count
    pub fn is_movement(self) -> bool {
        matches!(
            self,
            Parameter::WallPush | Parameter::Arm | Parameter::Leg | Parameter::Dolphin
        )
    }

    /// Canonical keys in column order
    pub fn order() -> Vec<&'static str> {
        Self::ALL.iter().map(|parameter| parameter.key()).collect()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Parameter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

pub(crate) fn serialize_keyed<S: Serializer>(
    values: &[f64; Parameter::COUNT],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(Parameter::COUNT))?;
    for parameter in Parameter::ALL {
        map.serialize_entry(parameter.key(), &values[parameter.index()])?;
    }
    map.end()
}

/// Oxygen cost per unit of each feature
///
/// Produced by the fitter or edited by hand. Fitted constrained sets and
/// manual overrides are evaluated through the same [`evaluate`] function.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParameterSet {
    values: [f64; Parameter::COUNT],
}

impl ParameterSet {
    pub fn zeros() -> Self {
        Self::default()
    }

    pub fn from_values(values: [f64; Parameter::COUNT]) -> Self {
        Self { values }
    }

    /// Hand-tuned starting point used before any fit is available
    pub fn reference() -> Self {
        let mut values = [0.0; Parameter::COUNT];
        for parameter in Parameter::ALL {
            values[parameter.index()] = crate::constants::model::reference_coefficient(parameter);
        }
        Self { values }
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        self.values[parameter.index()]
    }

    pub(crate) fn set(&mut self, parameter: Parameter, value: f64) {
        self.values[parameter.index()] = value;
    }

    pub fn values(&self) -> &[f64; Parameter::COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL
            .into_iter()
            .map(move |parameter| (parameter, self.values[parameter.index()]))
    }

    /// Replace one coefficient; overrides must be finite and non-negative
    pub fn with_override(mut self, parameter: Parameter, value: f64) -> Result<Self, ModelError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "{} must be a finite non-negative value (got {})",
                parameter, value
            )));
        }
        self.set(parameter, value);
        Ok(self)
    }

    /// Apply a batch of overrides keyed by canonical parameter name
    pub fn with_overrides(self, overrides: &HashMap<String, f64>) -> Result<Self, ModelError> {
        let mut keys: Vec<&String> = overrides.keys().collect();
        keys.sort();
        keys.into_iter().try_fold(self, |params, key| {
            let parameter = Parameter::from_key(key)
                .ok_or_else(|| ModelError::InvalidParameter(format!("unknown parameter '{}'", key)))?;
            params.with_override(parameter, overrides[key])
        })
    }

    /// Smallest coefficient of the set
    pub fn min_coefficient(&self) -> f64 {
        self.values.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn is_non_negative(&self) -> bool {
        self.values.iter().all(|value| *value >= 0.0)
    }
}

impl Serialize for ParameterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_keyed(&self.values, serializer)
    }
}

/// Oxygen attributed to each feature for one prediction (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ComponentCosts {
    values: [f64; Parameter::COUNT],
}

impl ComponentCosts {
    pub fn get(&self, parameter: Parameter) -> f64 {
        self.values[parameter.index()]
    }

    /// Oxygen spent on movements (wall pushes, arm pulls, kicks)
    pub fn movement_total(&self) -> f64 {
        Parameter::ALL
            .iter()
            .filter(|parameter| parameter.is_movement())
            .map(|parameter| self.values[parameter.index()])
            .sum()
    }
}

impl Serialize for ComponentCosts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_keyed(&self.values, serializer)
    }
}

/// Predicted oxygen cost of one feature vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Dot product of features and coefficients, in seconds of STA
    pub predicted_o2_s: f64,
    pub component_costs: ComponentCosts,
}

impl Prediction {
    /// Predicted minus actual oxygen budget
    pub fn residual(&self, budget_s: f64) -> f64 {
        self.predicted_o2_s - budget_s
    }
}

/// Evaluate a parameter set against a feature vector
///
/// The single prediction path for fitted and manually edited coefficients.
pub fn evaluate(params: &ParameterSet, features: &FeatureVector) -> Prediction {
    let mut components = [0.0; Parameter::COUNT];
    for parameter in Parameter::ALL {
        components[parameter.index()] = params.get(parameter) * features.get(parameter);
    }
    Prediction {
        predicted_o2_s: components.iter().sum(),
        component_costs: ComponentCosts { values: components },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_keys_round_trip() {
        for parameter in Parameter::ALL {
            assert_eq!(Parameter::from_key(parameter.key()), Some(parameter));
        }
        assert_eq!(Parameter::from_key("unknown"), None);
        assert_eq!(Parameter::order()[0], "wall_push_o2_cost");
        assert_eq!(Parameter::order()[6], "static_o2_rate");
    }

    #[test]
    fn test_evaluate_is_dot_product() {
        let features = FeatureVectorBuilder::new().build(&FeatureInputs {
            intensity: 1.0,
            wall_pushes: 2.0,
            arm_pulls: 10.0,
            leg_kicks: 20.0,
            dolphin_kicks: 0.0,
            duration_s: 100.0,
        });
        let params = ParameterSet::from_values([1.0, 2.0, 0.5, 3.0, 0.1, 0.2, 1.0]);

        let prediction = evaluate(&params, &features.vector);
        // 2 + 20 + 10 + 0 + 10 - 20 + 100
        assert!((prediction.predicted_o2_s - 122.0).abs() < 1e-12);
        assert!((prediction.component_costs.movement_total() - 32.0).abs() < 1e-12);
        assert!((prediction.residual(100.0) - 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_overrides_reject_invalid_values() {
        let params = ParameterSet::reference();
        assert!(params.with_override(Parameter::Arm, -1.0).is_err());
        assert!(params.with_override(Parameter::Arm, f64::NAN).is_err());

        let mut overrides = HashMap::new();
        overrides.insert("arm_o2_cost".to_string(), 4.0);
        let updated = params.with_overrides(&overrides).unwrap();
        assert_eq!(updated.get(Parameter::Arm), 4.0);
        assert_eq!(updated.get(Parameter::Leg), params.get(Parameter::Leg));

        overrides.insert("fin_o2_cost".to_string(), 1.0);
        assert!(matches!(
            params.with_overrides(&overrides),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parameter_set_serializes_as_keyed_map() {
        let json = serde_json::to_value(ParameterSet::reference()).unwrap();
        assert_eq!(json["static_o2_rate"], 1.0);
        assert_eq!(json.as_object().unwrap().len(), Parameter::COUNT);
    }
}
