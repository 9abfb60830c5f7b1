// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Feature vector construction for the oxygen-cost regression

use super::{serialize_keyed, Parameter};
use crate::constants::model::INTENSITY_FLOOR;
use crate::models::{Attempt, MovementCounts};
use serde::{Serialize, Serializer};

/// Regression features of one attempt (or one split), in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector {
    values: [f64; Parameter::COUNT],
}

impl FeatureVector {
    pub fn from_values(values: [f64; Parameter::COUNT]) -> Self {
        Self { values }
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        self.values[parameter.index()]
    }

    pub fn values(&self) -> &[f64; Parameter::COUNT] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (Parameter, f64)> + '_ {
        Parameter::ALL
            .into_iter()
            .map(move |parameter| (parameter, self.values[parameter.index()]))
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_keyed(&self.values, serializer)
    }
}

/// Raw inputs of the builder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureInputs {
    pub intensity: f64,
    pub wall_pushes: f64,
    pub arm_pulls: f64,
    pub leg_kicks: f64,
    pub dolphin_kicks: f64,
    pub duration_s: f64,
}

impl FeatureInputs {
    pub fn from_counts(intensity: f64, counts: &MovementCounts, duration_s: f64) -> Self {
        Self {
            intensity,
            wall_pushes: counts.wall_pushes,
            arm_pulls: counts.arm_pulls,
            leg_kicks: counts.leg_kicks,
            dolphin_kicks: counts.dolphin_kicks,
            duration_s,
        }
    }

    /// Whole-attempt inputs
    pub fn from_attempt(attempt: &Attempt, intensity: f64) -> Self {
        Self::from_counts(intensity, &attempt.totals, attempt.total_time_s)
    }
}

/// Builder output: the vector plus the inputs that had to be sanitized
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltFeatures {
    pub vector: FeatureVector,
    /// Input fields that were negative or non-finite and were replaced
    pub sanitized: Vec<&'static str>,
}

impl BuiltFeatures {
    pub fn is_clean(&self) -> bool {
        self.sanitized.is_empty()
    }
}

/// Converts movement counts and swim time into a [`FeatureVector`]
///
/// Never fails: invalid counts degrade to zero so a single bad annotation
/// cannot block a batch fit.
#[derive(Debug, Clone, Copy)]
pub struct FeatureVectorBuilder {
    intensity_floor: f64,
}

impl Default for FeatureVectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureVectorBuilder {
    pub fn new() -> Self {
        Self {
            intensity_floor: INTENSITY_FLOOR,
        }
    }

    pub fn with_intensity_floor(intensity_floor: f64) -> Self {
        Self {
            intensity_floor: if intensity_floor.is_finite() && intensity_floor > 0.0 {
                intensity_floor
            } else {
                INTENSITY_FLOOR
            },
        }
    }

    pub fn build(&self, inputs: &FeatureInputs) -> BuiltFeatures {
        let mut sanitized = Vec::new();

        let intensity = if !inputs.intensity.is_finite() {
            sanitized.push("intensity");
            1.0
        } else if inputs.intensity < self.intensity_floor {
            sanitized.push("intensity");
            self.intensity_floor
        } else {
            inputs.intensity
        };

        let wall = clamp_count(inputs.wall_pushes, "wall_pushes", &mut sanitized);
        let arms = clamp_count(inputs.arm_pulls, "arm_pulls", &mut sanitized);
        let legs = clamp_count(inputs.leg_kicks, "leg_kicks", &mut sanitized);
        let dolphins = clamp_count(inputs.dolphin_kicks, "dolphin_kicks", &mut sanitized);
        let duration = clamp_count(inputs.duration_s, "duration_s", &mut sanitized);

        let mut values = [0.0; Parameter::COUNT];
        values[Parameter::WallPush.index()] = intensity * wall;
        values[Parameter::Arm.index()] = intensity * arms;
        values[Parameter::Leg.index()] = intensity * legs;
        values[Parameter::Dolphin.index()] = intensity * dolphins;
        values[Parameter::IntensityTime.index()] = intensity * duration;
        // Negative so that a non-negative coefficient removes oxygen as time grows
        values[Parameter::AnaerobicRecovery.index()] = -duration;
        values[Parameter::StaticRate.index()] = duration;

        BuiltFeatures {
            vector: FeatureVector { values },
            sanitized,
        }
    }
}

fn clamp_count(value: f64, field: &'static str, sanitized: &mut Vec<&'static str>) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        sanitized.push(field);
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> FeatureInputs {
        FeatureInputs {
            intensity: 1.25,
            wall_pushes: 4.0,
            arm_pulls: 28.0,
            leg_kicks: 40.0,
            dolphin_kicks: 2.0,
            duration_s: 180.0,
        }
    }

    #[test]
    fn test_feature_values() {
        let built = FeatureVectorBuilder::new().build(&inputs());
        let vector = built.vector;

        assert!(built.is_clean());
        assert_eq!(vector.get(Parameter::WallPush), 5.0);
        assert_eq!(vector.get(Parameter::Arm), 35.0);
        assert_eq!(vector.get(Parameter::Leg), 50.0);
        assert_eq!(vector.get(Parameter::Dolphin), 2.5);
        assert_eq!(vector.get(Parameter::IntensityTime), 225.0);
        assert_eq!(vector.get(Parameter::AnaerobicRecovery), -180.0);
        assert_eq!(vector.get(Parameter::StaticRate), 180.0);
    }

    #[test]
    fn test_negative_and_nan_counts_become_zero() {
        let mut raw = inputs();
        raw.arm_pulls = -3.0;
        raw.leg_kicks = f64::NAN;
        raw.dolphin_kicks = f64::INFINITY;

        let built = FeatureVectorBuilder::new().build(&raw);

        assert_eq!(built.vector.get(Parameter::Arm), 0.0);
        assert_eq!(built.vector.get(Parameter::Leg), 0.0);
        assert_eq!(built.vector.get(Parameter::Dolphin), 0.0);
        assert_eq!(built.sanitized, vec!["arm_pulls", "leg_kicks", "dolphin_kicks"]);
        assert!(built.vector.values().iter().all(|value| value.is_finite()));
    }

    #[test]
    fn test_intensity_is_floored_not_zeroed() {
        let mut raw = inputs();
        raw.intensity = 0.0;
        let built = FeatureVectorBuilder::new().build(&raw);
        assert!(built.vector.get(Parameter::Arm) > 0.0);
        assert_eq!(built.sanitized, vec!["intensity"]);

        raw.intensity = f64::NAN;
        let built = FeatureVectorBuilder::new().build(&raw);
        assert_eq!(built.vector.get(Parameter::Arm), 28.0);
    }

    #[test]
    fn test_time_terms_bypass_intensity() {
        let mut raw = inputs();
        raw.intensity = 2.0;
        let vector = FeatureVectorBuilder::new().build(&raw).vector;

        assert_eq!(vector.get(Parameter::StaticRate), 180.0);
        assert_eq!(vector.get(Parameter::AnaerobicRecovery), -180.0);
        assert_eq!(vector.get(Parameter::IntensityTime), 360.0);
    }
}
