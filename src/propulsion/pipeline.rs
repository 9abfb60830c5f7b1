// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Dataset Pipeline
//!
//! Runs the whole model over one explicit [`Dataset`]: intensity estimation,
//! feature construction, the constrained fit, per-attempt predictions and
//! projections, candidate scoring and fit bands. The result is a
//! [`DatasetReport`] ready for serialization.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use super::bands::{BandBuilder, BandInputs, BandPoint, FitBands};
use super::descent::{DescentOutcome, DescentSample};
use super::fitter::{FitMetrics, FitOutcome, FitSample};
use super::intensity::IntensityTable;
use super::projector::{Projection, SplitComposition, UnavailableReason};
use super::scoring::{AttemptPenalty, PenaltyScore, RankedCandidate, ScoreInput};
use super::{evaluate, ComponentCosts, FeatureInputs, FeatureVector, ModelError, Parameter, ParameterSet};
use crate::config::ModelConfig;
use crate::logging::ModelLogger;
use crate::models::{Attempt, AthleteKey, Dataset, Discipline};

/// Candidate names used in the ranking
pub const FITTED: &str = "fitted";
pub const REFERENCE: &str = "reference";
pub const MANUAL: &str = "manual";
pub const REFINED: &str = "refined";

/// Why an attempt was left out of the fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Distance, time or budget missing or not positive
    InvalidAttempt,
    BelowMinimumDistance,
    /// Swim time at or above the STA budget
    NoBudgetMargin,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExclusionReason::InvalidAttempt => "distance, time or oxygen budget is missing",
            ExclusionReason::BelowMinimumDistance => "distance below the configured minimum",
            ExclusionReason::NoBudgetMargin => "swim time is not below the oxygen budget",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedAttempt {
    pub athlete: String,
    pub distance_m: f64,
    pub reason: ExclusionReason,
}

/// A valid attempt with its intensity, features and average split
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedAttempt {
    pub attempt: Attempt,
    pub intensity: f64,
    pub features: FeatureVector,
    pub sanitized: Vec<&'static str>,
    pub composition: Option<SplitComposition>,
}

/// Everything the fit needs, computed once per dataset
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub name: String,
    pub discipline: Discipline,
    pub intensity: IntensityTable,
    pub attempts: Vec<PreparedAttempt>,
    pub excluded: Vec<ExcludedAttempt>,
}

impl PreparedDataset {
    pub fn fit_samples(&self) -> Vec<FitSample> {
        self.attempts
            .iter()
            .map(|prepared| FitSample::new(prepared.features, prepared.attempt.oxygen_budget_s))
            .collect()
    }

    pub fn descent_samples(&self) -> Vec<DescentSample> {
        self.attempts
            .iter()
            .map(|prepared| DescentSample {
                features: prepared.features,
                budget_s: prepared.attempt.oxygen_budget_s,
                distance_m: prepared.attempt.distance_m,
            })
            .collect()
    }
}

/// Model output for one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptPrediction {
    pub athlete: String,
    pub distance_m: f64,
    pub total_time_s: f64,
    pub budget_s: f64,
    pub intensity: f64,
    pub predicted_o2_s: f64,
    /// Predicted minus budget
    pub residual_s: f64,
    pub features: FeatureVector,
    pub component_costs: ComponentCosts,
    pub split_cost_s: Option<f64>,
    pub split_count: Option<f64>,
    pub projected_distance_m: Option<f64>,
    pub projection: Projection,
    pub composition: Option<SplitComposition>,
    pub penalty: AttemptPenalty,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sanitized: Vec<&'static str>,
}

impl AttemptPrediction {
    fn score_input(&self) -> ScoreInput {
        ScoreInput {
            budget_s: self.budget_s,
            predicted_o2_s: self.predicted_o2_s,
            actual_distance_m: Some(self.distance_m),
            predicted_distance_m: self.projected_distance_m,
        }
    }
}

/// Serialized result of one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    pub discipline: Discipline,
    pub parameter_order: Vec<&'static str>,
    /// Candidate whose coefficients produced `attempts`
    pub active_candidate: String,
    pub parameters: ParameterSet,
    pub constrained: ParameterSet,
    pub unconstrained: ParameterSet,
    pub degenerate: Vec<Parameter>,
    pub constraint_active: bool,
    pub metrics: FitMetrics,
    pub intensity: IntensityTable,
    pub score: PenaltyScore,
    pub refined: Option<DescentOutcome>,
    pub candidates: Vec<RankedCandidate>,
    pub bands: FitBands,
    pub attempts: Vec<AttemptPrediction>,
    pub excluded_attempts: Vec<ExcludedAttempt>,
    pub generated_at: DateTime<Utc>,
}

impl DatasetReport {
    /// Predictions of one athlete, in dataset order
    pub fn predictions_for<'a>(&'a self, athlete: &str) -> impl Iterator<Item = &'a AttemptPrediction> + 'a {
        let key = AthleteKey::new(athlete);
        self.attempts
            .iter()
            .filter(move |prediction| AthleteKey::new(&prediction.athlete) == key)
    }

    pub fn candidate(&self, name: &str) -> Option<&RankedCandidate> {
        self.candidates.iter().find(|candidate| candidate.name == name)
    }
}

/// Fits and evaluates datasets with one model configuration
#[derive(Debug, Clone, Default)]
pub struct DatasetModel {
    config: ModelConfig,
}

impl DatasetModel {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Fit and evaluate a dataset end to end
    pub fn run(&self, dataset: &Dataset) -> Result<DatasetReport, ModelError> {
        let prepared = self.prepare(dataset);
        let fit = self.fit(&prepared)?;
        self.report(&prepared, &fit)
    }

    /// Estimate intensities, screen attempts and build whole-attempt features
    pub fn prepare(&self, dataset: &Dataset) -> PreparedDataset {
        let intensity = self.config.estimator().estimate(&dataset.attempts);
        let builder = self.config.builder();

        let mut attempts = Vec::new();
        let mut excluded = Vec::new();
        for attempt in &dataset.attempts {
            if let Some(reason) = self.exclusion(attempt) {
                ModelLogger::log_skipped_attempt(&dataset.name, &attempt.athlete, &reason.to_string());
                excluded.push(ExcludedAttempt {
                    athlete: attempt.athlete.clone(),
                    distance_m: attempt.distance_m,
                    reason,
                });
                continue;
            }

            let athlete_intensity = intensity.intensity_for(&attempt.key);
            let built = builder.build(&FeatureInputs::from_attempt(attempt, athlete_intensity));
            if !built.is_clean() {
                ModelLogger::log_sanitized_inputs(&dataset.name, &attempt.athlete, &built.sanitized);
            }
            let composition = SplitComposition::from_attempt(
                attempt,
                athlete_intensity,
                intensity.opening_split(&attempt.key),
                self.config.intensity.split_distance_m,
            );

            attempts.push(PreparedAttempt {
                attempt: attempt.clone(),
                intensity: athlete_intensity,
                features: built.vector,
                sanitized: built.sanitized,
                composition,
            });
        }

        info!(
            dataset.name = %dataset.name,
            dataset.prepared = attempts.len(),
            dataset.excluded = excluded.len(),
            intensity.athletes = intensity.athletes.len(),
            "Dataset prepared"
        );

        PreparedDataset {
            name: dataset.name.clone(),
            discipline: dataset.discipline,
            intensity,
            attempts,
            excluded,
        }
    }

    fn exclusion(&self, attempt: &Attempt) -> Option<ExclusionReason> {
        if !attempt.is_valid() {
            Some(ExclusionReason::InvalidAttempt)
        } else if attempt.distance_m < self.config.fit.min_distance_m {
            Some(ExclusionReason::BelowMinimumDistance)
        } else if self.config.fit.require_budget_margin && attempt.oxygen_budget_s <= attempt.total_time_s {
            Some(ExclusionReason::NoBudgetMargin)
        } else {
            None
        }
    }

    pub fn fit(&self, prepared: &PreparedDataset) -> Result<FitOutcome, ModelError> {
        let fit = self.config.fitter().fit(&prepared.fit_samples())?;
        for parameter in &fit.degenerate {
            ModelLogger::log_degenerate_parameter(&prepared.name, parameter.key());
        }
        ModelLogger::log_fit_summary(
            &prepared.name,
            fit.metrics.attempts,
            fit.metrics.mean_abs_error_s,
            fit.metrics.mean_abs_pct_error,
            fit.constraint_active,
        );
        Ok(fit)
    }

    /// Evaluate every prepared attempt with one parameter set
    pub fn predict(&self, prepared: &PreparedDataset, params: &ParameterSet) -> Vec<AttemptPrediction> {
        let builder = self.config.builder();
        let scorer = self.config.scorer();

        prepared
            .attempts
            .iter()
            .map(|entry| {
                let attempt = &entry.attempt;
                let prediction = evaluate(params, &entry.features);
                let split_cost = entry
                    .composition
                    .map(|composition| composition.split_cost(params, &builder).predicted_o2_s);
                let projection = match entry.composition {
                    Some(composition) => composition.project(params, &builder, attempt.oxygen_budget_s),
                    None => Projection::Unavailable {
                        reason: UnavailableReason::NoSplitComposition,
                    },
                };

                let projected_distance_m = projection.distance_m();
                let penalty = scorer.attempt(&ScoreInput {
                    budget_s: attempt.oxygen_budget_s,
                    predicted_o2_s: prediction.predicted_o2_s,
                    actual_distance_m: Some(attempt.distance_m),
                    predicted_distance_m: projected_distance_m,
                });

                AttemptPrediction {
                    athlete: attempt.athlete.clone(),
                    distance_m: attempt.distance_m,
                    total_time_s: attempt.total_time_s,
                    budget_s: attempt.oxygen_budget_s,
                    intensity: entry.intensity,
                    predicted_o2_s: prediction.predicted_o2_s,
                    residual_s: prediction.residual(attempt.oxygen_budget_s),
                    features: entry.features,
                    component_costs: prediction.component_costs,
                    split_cost_s: split_cost,
                    split_count: projection.split_count(),
                    projected_distance_m,
                    projection,
                    composition: entry.composition,
                    penalty,
                    sanitized: entry.sanitized.clone(),
                }
            })
            .collect()
    }

    pub fn score(&self, predictions: &[AttemptPrediction]) -> PenaltyScore {
        let inputs: Vec<ScoreInput> = predictions.iter().map(AttemptPrediction::score_input).collect();
        self.config.scorer().score(&inputs)
    }

    /// Build the report for an already fitted dataset
    ///
    /// Manual overrides are applied on top of the constrained fit and, when
    /// present, become the active candidate.
    pub fn report(&self, prepared: &PreparedDataset, fit: &FitOutcome) -> Result<DatasetReport, ModelError> {
        let manual = if self.config.manual.is_empty() {
            None
        } else {
            Some(self.config.manual_parameters(fit.constrained)?)
        };

        let mut candidates = vec![
            (FITTED.to_string(), fit.constrained),
            (REFERENCE.to_string(), ParameterSet::reference()),
        ];
        if let Some(manual) = manual {
            candidates.push((MANUAL.to_string(), manual));
        }

        let refined = if self.config.descent.enabled {
            let outcome = self
                .config
                .descent()
                .refine(&fit.constrained, &prepared.descent_samples());
            candidates.push((REFINED.to_string(), outcome.params));
            Some(outcome)
        } else {
            None
        };

        let scored: Vec<(String, PenaltyScore)> = candidates
            .iter()
            .map(|(name, params)| (name.clone(), self.score(&self.predict(prepared, params))))
            .collect();
        let ranking = self.config.scorer().rank(scored);
        for candidate in &ranking {
            ModelLogger::log_candidate_score(
                &prepared.name,
                &candidate.name,
                candidate.rank,
                candidate.score.combined,
            );
        }

        let (active_candidate, parameters) = match manual {
            Some(manual) => (MANUAL.to_string(), manual),
            None => (FITTED.to_string(), fit.constrained),
        };
        let attempts = self.predict(prepared, &parameters);
        let score = self.score(&attempts);
        let bands = self.bands(prepared, &attempts);

        debug!(
            dataset.name = %prepared.name,
            report.candidate = %active_candidate,
            report.attempts = attempts.len(),
            "Report assembled"
        );

        Ok(DatasetReport {
            dataset: prepared.name.clone(),
            discipline: prepared.discipline,
            parameter_order: Parameter::order(),
            active_candidate,
            parameters,
            constrained: fit.constrained,
            unconstrained: fit.unconstrained,
            degenerate: fit.degenerate.clone(),
            constraint_active: fit.constraint_active,
            metrics: fit.metrics.clone(),
            intensity: prepared.intensity.clone(),
            score,
            refined,
            candidates: ranking,
            bands,
            attempts,
            excluded_attempts: prepared.excluded.clone(),
            generated_at: Utc::now(),
        })
    }

    fn bands(&self, prepared: &PreparedDataset, predictions: &[AttemptPrediction]) -> FitBands {
        let distance_fit = predictions
            .iter()
            .filter_map(|p| p.projected_distance_m.map(|projected| BandPoint::new(p.distance_m, projected)))
            .collect();
        let distance_cost = predictions
            .iter()
            .filter_map(|p| p.split_cost_s.map(|cost| BandPoint::new(p.distance_m, cost)))
            .collect();

        // Athletes sit at their longest fitted attempt
        let mut longest: BTreeMap<&AthleteKey, f64> = BTreeMap::new();
        for entry in &prepared.attempts {
            let distance = longest.entry(&entry.attempt.key).or_insert(entry.attempt.distance_m);
            *distance = distance.max(entry.attempt.distance_m);
        }
        let mut movement_intensity = Vec::new();
        let mut work_bias = Vec::new();
        for (key, athlete) in &prepared.intensity.athletes {
            let Some(&distance) = longest.get(key) else {
                continue;
            };
            movement_intensity.push(BandPoint::new(distance, athlete.intensity));
            if let Some(bias) = athlete.work_bias {
                work_bias.push(BandPoint::new(distance, bias));
            }
        }

        BandBuilder::from_settings(&self.config.bands).build(&BandInputs {
            distance_fit,
            distance_cost,
            movement_intensity,
            work_bias,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{MovementCounts, Segment};

    pub(crate) const TRUTH: [f64; Parameter::COUNT] = [2.0, 3.0, 1.5, 0.8, 0.2, 0.0, 1.1];

    /// Attempt with a varied opening split and declared totals
    pub(crate) fn synthetic_attempt(i: usize) -> Attempt {
        let distance = 100.0 + 25.0 * (i % 6) as f64;
        let laps = (distance / 50.0).ceil();
        let first = Segment {
            checkpoint_m: 50,
            distance_m: 50.0,
            elapsed_s: 45.0 + ((i * 7) % 11) as f64,
            counts: MovementCounts::new(1.0, 5.0 + (i % 3) as f64, 6.0 + ((i * 5) % 4) as f64, (i % 2) as f64),
        };
        let totals = MovementCounts::new(
            laps,
            4.0 * distance / 50.0 + (i % 5) as f64,
            5.0 * distance / 50.0 + ((i * 3) % 7) as f64,
            (i % 4) as f64,
        );
        let total_time = distance + ((i * 13) % 17) as f64;
        Attempt::with_totals(
            &format!("Athlete {}", i),
            Discipline::Dnf,
            distance,
            total_time,
            1000.0,
            vec![first],
            totals,
        )
    }

    /// Dataset whose budgets are exactly the `TRUTH` predictions
    pub(crate) fn synthetic_dataset(count: usize, config: &ModelConfig) -> Dataset {
        let mut attempts: Vec<Attempt> = (0..count).map(synthetic_attempt).collect();
        let table = config.estimator().estimate(&attempts);
        let builder = config.builder();
        let truth = ParameterSet::from_values(TRUTH);
        for attempt in &mut attempts {
            let features = builder.build(&FeatureInputs::from_attempt(attempt, table.intensity_for(&attempt.key)));
            attempt.oxygen_budget_s = evaluate(&truth, &features.vector).predicted_o2_s;
        }
        Dataset::new("DNF", Discipline::Dnf, attempts)
    }

    #[test]
    fn test_run_recovers_generating_coefficients() {
        let config = ModelConfig::default();
        let dataset = synthetic_dataset(18, &config);

        let report = DatasetModel::new(config).run(&dataset).unwrap();

        for parameter in Parameter::ALL {
            assert!(
                (report.constrained.get(parameter) - TRUTH[parameter.index()]).abs() < 1e-5,
                "{} = {}",
                parameter,
                report.constrained.get(parameter)
            );
        }
        assert!(report.degenerate.contains(&Parameter::AnaerobicRecovery));
        assert!(report.metrics.mean_abs_error_s < 1e-6);
        assert_eq!(report.active_candidate, FITTED);
        assert_eq!(report.attempts.len(), 18);
        assert!(report.excluded_attempts.is_empty());
        assert_eq!(report.candidates.len(), 2);
        assert!(report.refined.is_none());
        assert!(report.attempts.iter().all(|a| a.residual_s.abs() < 1e-6));
    }

    #[test]
    fn test_exclusions_are_reported() {
        let mut config = ModelConfig::default();
        config.fit.min_distance_m = 110.0;
        let mut dataset = synthetic_dataset(18, &config);
        // 100 m attempts fall below the minimum
        let short = dataset.attempts.iter().filter(|a| a.distance_m < 110.0).count();
        dataset.attempts[1].oxygen_budget_s = f64::NAN;
        dataset.attempts[2].oxygen_budget_s = dataset.attempts[2].total_time_s;

        let prepared = DatasetModel::new(config).prepare(&dataset);

        let reasons: Vec<ExclusionReason> = prepared.excluded.iter().map(|e| e.reason).collect();
        assert_eq!(reasons.iter().filter(|r| **r == ExclusionReason::BelowMinimumDistance).count(), short);
        assert!(reasons.contains(&ExclusionReason::InvalidAttempt));
        assert!(reasons.contains(&ExclusionReason::NoBudgetMargin));
        assert_eq!(prepared.attempts.len() + prepared.excluded.len(), 18);
    }

    #[test]
    fn test_budget_margin_can_be_disabled() {
        let mut config = ModelConfig::default();
        config.fit.require_budget_margin = false;
        let mut dataset = synthetic_dataset(10, &config);
        dataset.attempts[0].oxygen_budget_s = dataset.attempts[0].total_time_s * 0.5;

        let prepared = DatasetModel::new(config).prepare(&dataset);
        assert!(prepared.excluded.is_empty());
    }

    #[test]
    fn test_too_few_attempts_is_an_error() {
        let config = ModelConfig::default();
        let dataset = synthetic_dataset(7, &config);

        let result = DatasetModel::new(config).run(&dataset);
        assert!(matches!(
            result,
            Err(ModelError::InsufficientData {
                required: 8,
                available: 7
            })
        ));
    }

    #[test]
    fn test_manual_override_becomes_active_without_refitting() {
        let mut config = ModelConfig::default();
        let dataset = synthetic_dataset(18, &config);
        let baseline = DatasetModel::new(config.clone()).run(&dataset).unwrap();

        config.manual.insert("arm_o2_cost".to_string(), 5.0);
        let report = DatasetModel::new(config).run(&dataset).unwrap();

        assert_eq!(report.active_candidate, MANUAL);
        assert_eq!(report.parameters.get(Parameter::Arm), 5.0);
        assert_eq!(report.constrained, baseline.constrained);
        assert!(report.candidate(MANUAL).is_some());
        // More oxygen per pull: every prediction overshoots
        assert!(report.attempts.iter().all(|a| a.residual_s > 0.0));
    }

    #[test]
    fn test_invalid_manual_override_fails_the_report() {
        let mut config = ModelConfig::default();
        let dataset = synthetic_dataset(18, &config);
        config.manual.insert("static_o2_rate".to_string(), -2.0);

        let result = DatasetModel::new(config).run(&dataset);
        assert!(matches!(result, Err(ModelError::InvalidParameter(_))));
    }

    #[test]
    fn test_descent_adds_refined_candidate() {
        let mut config = ModelConfig::default();
        config.descent.enabled = true;
        config.descent.max_iterations = 50;
        let dataset = synthetic_dataset(18, &config);

        let report = DatasetModel::new(config).run(&dataset).unwrap();

        assert!(report.refined.is_some());
        assert!(report.candidate(REFINED).is_some());
        assert_eq!(report.candidates.len(), 3);
        assert_eq!(report.active_candidate, FITTED);
    }

    #[test]
    fn test_predictions_carry_projection_and_bands() {
        let config = ModelConfig::default();
        let dataset = synthetic_dataset(18, &config);
        let report = DatasetModel::new(config).run(&dataset).unwrap();

        let first = report.predictions_for("athlete 0").next().unwrap();
        let split_cost = first.split_cost_s.unwrap();
        let projected = first.projected_distance_m.unwrap();
        assert!((projected - first.budget_s / split_cost * 50.0).abs() < 1e-9);
        assert!(first.composition.is_some());
        assert!(first.penalty.sta.unwrap() < 1e-6);

        assert!(report.bands.distance_fit.is_some());
        assert!(report.bands.distance_cost.is_some());

        let movement = report.bands.movement_intensity.as_ref().unwrap();
        assert_eq!(movement.metadata.source_points, 18);
        assert!(movement.metadata.coverage_ratio >= 0.6);
        assert_eq!(movement.metadata.x_min, 100.0);
        assert_eq!(movement.metadata.x_max, 225.0);
        let bias = report.bands.work_bias.as_ref().unwrap();
        assert!(bias.metadata.intercept > 0.0);
        assert!(bias.metadata.coverage_ratio >= 0.6);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["parameter_order"][6], "static_o2_rate");
        assert_eq!(json["degenerate"][0], "anaerobic_recovery_o2_cost");
        assert_eq!(json["discipline"], "DNF");
        assert_eq!(json["attempts"][0]["projection"]["status"], "available");
        assert_eq!(json["bands"]["work_bias"]["kind"], "work_bias");
    }

    #[test]
    fn test_composition_uses_opening_split() {
        let config = ModelConfig::default();
        let dataset = synthetic_dataset(10, &config);
        let report = DatasetModel::new(config).run(&dataset).unwrap();

        let first = report.predictions_for("athlete 1").next().unwrap();
        let composition = first.composition.unwrap();
        let opening = &dataset.attempts[1].segments[0];
        assert_eq!(composition.split_time_s, opening.elapsed_s);
        assert_eq!(composition.counts.arm_pulls, opening.counts.arm_pulls);
        assert_eq!(composition.counts.leg_kicks, opening.counts.leg_kicks);
    }

    #[test]
    fn test_attempt_without_composition_is_unavailable() {
        let config = ModelConfig::default();
        let dataset = synthetic_dataset(10, &config);
        let model = DatasetModel::new(config);
        let mut prepared = model.prepare(&dataset);
        prepared.attempts[0].composition = None;

        let predictions = model.predict(&prepared, &ParameterSet::from_values(TRUTH));

        assert_eq!(
            predictions[0].projection,
            Projection::Unavailable {
                reason: UnavailableReason::NoSplitComposition
            }
        );
        assert_eq!(predictions[0].split_cost_s, None);
        assert!(predictions[1].projection.is_available());
    }

    #[test]
    fn test_run_with_active_constraint() {
        let config = ModelConfig::default();
        let mut dataset = synthetic_dataset(18, &config);
        // Arm pulls save oxygen in the generating model
        let mut generating = TRUTH;
        generating[Parameter::Arm.index()] = -1.0;
        let truth = ParameterSet::from_values(generating);
        let table = config.estimator().estimate(&dataset.attempts);
        let builder = config.builder();
        for attempt in &mut dataset.attempts {
            let features = builder.build(&FeatureInputs::from_attempt(attempt, table.intensity_for(&attempt.key)));
            attempt.oxygen_budget_s = evaluate(&truth, &features.vector).predicted_o2_s;
        }

        let report = DatasetModel::new(config).run(&dataset).unwrap();

        assert!(report.unconstrained.get(Parameter::Arm) < 0.0);
        assert!(report.constraint_active);
        assert!(report.constrained.is_non_negative());
        assert_eq!(report.active_candidate, FITTED);
        assert_eq!(report.parameters, report.constrained);
        assert_ne!(report.constrained, report.unconstrained);

        // Metrics describe the constrained coefficients, not the OLS ones
        let pairs: Vec<(f64, f64)> = report
            .attempts
            .iter()
            .map(|prediction| (prediction.predicted_o2_s, prediction.budget_s))
            .collect();
        let expected = FitMetrics::from_predictions(&pairs);
        assert!((report.metrics.mean_abs_error_s - expected.mean_abs_error_s).abs() < 1e-9);
        assert!(report.metrics.mean_abs_error_s > 1e-3);
        assert!(report.attempts.iter().all(|a| a.predicted_o2_s.is_finite()));
    }
}
