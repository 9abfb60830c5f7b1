// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Constants Module
//!
//! Model constants, race-sheet column names and environment-based
//! configuration values.

/// Oxygen model defaults
pub mod model {
    use crate::propulsion::Parameter;

    /// Smallest movement intensity allowed into a feature vector
    pub const INTENSITY_FLOOR: f64 = 1e-3;

    /// Neutral movement intensity
    pub const NEUTRAL_INTENSITY: f64 = 1.0;

    /// Default split length in meters (one pool length)
    pub const DEFAULT_SPLIT_DISTANCE_M: f64 = 50.0;

    /// One arm pull carries the load of 1.5 leg kicks
    pub const DEFAULT_ARM_LEG_RATIO: f64 = 1.5;

    /// Per-√row residual below which a unit-norm feature column counts as dependent
    pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-5;

    /// Active-set iteration cap for the non-negative solve
    pub const DEFAULT_NNLS_MAX_ITERATIONS: usize = 500;

    /// Hand-tuned coefficients used as the manual baseline and descent start
    pub fn reference_coefficient(parameter: Parameter) -> f64 {
        match parameter {
            Parameter::WallPush => 2.5,
            Parameter::Arm => 3.5,
            Parameter::Leg => 2.5,
            Parameter::Dolphin => 0.0,
            Parameter::IntensityTime => 0.39,
            Parameter::AnaerobicRecovery => 0.1,
            Parameter::StaticRate => 1.0,
        }
    }
}

/// Penalty weights for ranking parameter sets
pub mod scoring {
    /// Oxygen-budget residual weights
    pub const STA_OVER_WEIGHT: f64 = 1.0;
    pub const STA_UNDER_WEIGHT: f64 = 0.6;

    /// Distance residual weights; over-promising distance is the costlier error
    pub const DISTANCE_OVER_WEIGHT: f64 = 1.6;
    pub const DISTANCE_UNDER_WEIGHT: f64 = 0.6;

    /// Relative weight of each penalty in the combined score
    pub const COMBINED_STA_WEIGHT: f64 = 1.0;
    pub const COMBINED_DISTANCE_WEIGHT: f64 = 2.0;
}

/// Penalty descent refinement defaults
pub mod descent {
    pub const LEARNING_RATE: f64 = 1e-5;
    pub const MAX_ITERATIONS: usize = 40_000;
    pub const TOLERANCE: f64 = 1e-6;
    /// Wall push must cost at least this much more than a leg kick
    pub const WALL_LEG_EPS: f64 = 1e-6;
    /// Arm pull cost may not exceed this multiple of the leg kick cost
    pub const ARM_LEG_RATIO_MAX: f64 = 1.5;
    /// Lower bound on the static oxygen rate
    pub const STATIC_MIN: f64 = 1.0;
}

/// Fit band defaults
pub mod bands {
    pub const MIN_POINTS: usize = 5;
    pub const SAMPLE_COUNT: usize = 25;
    pub const COVERAGE_TARGET: f64 = 0.6;
    pub const WIDEN_FACTOR: f64 = 1.2;
    pub const MAX_WIDENINGS: usize = 12;
    /// Scale factor turning a MAD into a normal-consistent deviation
    pub const MAD_SCALE: f64 = 1.4826;
    pub const MIN_DISTANCE_HALF_WIDTH: f64 = 1.0;
    pub const MIN_COST_HALF_WIDTH: f64 = 0.1;
    /// Movement intensity and work bias are unitless ratios near one
    pub const MIN_MOVEMENT_HALF_WIDTH: f64 = 0.01;
    pub const MOVEMENT_MAX_WIDENINGS: usize = 10;
}

/// Race sheet and roster column names
pub mod columns {
    pub const NAME: &str = "Name";
    pub const DISTANCE: &str = "Dist";
    pub const TOTAL_TIME: &str = "TT";
    pub const TOTAL_WALL_PUSHES: &str = "TW";
    pub const TOTAL_ARM_PULLS: &str = "TA";
    pub const TOTAL_KICKS: &str = "TK";
    pub const TOTAL_DOLPHIN_KICKS: &str = "TDK";
    pub const STYLE_KICKS_PER_PULL: &str = "ST_K";
    pub const STYLE_WALL_KICKS: &str = "ST_WK";
    pub const STYLE_DOLPHIN_PER_PULL: &str = "ST_DK";
    pub const STA: &str = "STA";

    /// Prefixes of per-checkpoint columns (`T50`, `A50`, `K50`)
    pub const TIME_PREFIX: char = 'T';
    pub const ARM_PREFIX: char = 'A';
    pub const KICK_PREFIX: char = 'K';
}

/// Environment-based configuration
pub mod env_config {
    use std::env;

    /// Directory holding the race sheets
    pub fn data_root() -> Option<String> {
        env::var("APNEA_DATA_ROOT").ok()
    }

    /// STA personal-best roster file
    pub fn sta_file() -> Option<String> {
        env::var("APNEA_STA_FILE").ok()
    }

    /// Output JSON path
    pub fn output_path() -> Option<String> {
        env::var("APNEA_OUTPUT").ok()
    }

    /// Get log level from environment or default
    pub fn log_level() -> String {
        env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    }
}

/// Project defaults
pub mod defaults {
    pub const CONFIG_FILE: &str = "apnea_model.toml";
    pub const CONFIG_DIR: &str = "apnea-o2-model";
    pub const DATA_ROOT: &str = "data/aida_greece_2025";
    pub const STA_FILE: &str = "STA_PB.csv";
    pub const OUTPUT_FILE: &str = "data/dashboard_data/propulsion_fit.json";
    pub const SERVICE_NAME: &str = "apnea-o2-model";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propulsion::Parameter;

    #[test]
    fn test_reference_coefficients_are_non_negative() {
        for parameter in Parameter::ALL {
            assert!(model::reference_coefficient(parameter) >= 0.0);
        }
        assert_eq!(model::reference_coefficient(Parameter::StaticRate), descent::STATIC_MIN);
    }

    #[test]
    fn test_overshoot_weights_dominate() {
        assert!(scoring::STA_OVER_WEIGHT > scoring::STA_UNDER_WEIGHT);
        assert!(scoring::DISTANCE_OVER_WEIGHT > scoring::DISTANCE_UNDER_WEIGHT);
    }
}
