// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use apnea_o2_model::models::{Attempt, Discipline, MovementCounts, Segment};
use apnea_o2_model::propulsion::projector::UnavailableReason;
use apnea_o2_model::propulsion::scoring::ScoreInput;
use apnea_o2_model::propulsion::{
    evaluate, project_distance, FeatureInputs, FeatureVectorBuilder, MovementIntensityEstimator, OpeningSplit,
    Parameter, ParameterSet, PenaltyScorer, Projection, SplitComposition,
};

#[test]
fn test_budget_420_with_split_cost_35() {
    let projection = project_distance(420.0, 35.0, 50.0);
    assert_eq!(projection.split_count(), Some(12.0));
    assert_eq!(projection.distance_m(), Some(600.0));
}

#[test]
fn test_unavailable_projection_is_not_zero() {
    assert_eq!(
        project_distance(420.0, 0.0, 50.0),
        Projection::Unavailable {
            reason: UnavailableReason::NonPositiveSplitCost
        }
    );
    assert_ne!(
        UnavailableReason::NoSplitComposition.to_string(),
        UnavailableReason::NonPositiveSplitCost.to_string()
    );
    assert_eq!(project_distance(f64::NAN, 35.0, 50.0).distance_m(), None);
}

#[test]
fn test_composition_projection_matches_split_cost() {
    let segments = vec![
        Segment {
            checkpoint_m: 50,
            distance_m: 50.0,
            elapsed_s: 50.0,
            counts: MovementCounts::new(1.0, 6.0, 8.0, 0.0),
        },
        Segment {
            checkpoint_m: 100,
            distance_m: 50.0,
            elapsed_s: 54.0,
            counts: MovementCounts::new(1.0, 7.0, 9.0, 0.0),
        },
    ];
    let attempt = Attempt::from_segments("Jane Doe", Discipline::Dnf, 100.0, 104.0, 390.0, segments);
    let builder = FeatureVectorBuilder::new();
    let params = ParameterSet::reference();

    // Without an opening split the totals are spread over both splits
    let averaged = SplitComposition::from_attempt(&attempt, 1.0, OpeningSplit::default(), 50.0).unwrap();
    assert_eq!(averaged.split_time_s, 52.0);
    assert_eq!(averaged.counts.arm_pulls, 6.5);

    // With one, time and counts all describe the first 50 m
    let table = MovementIntensityEstimator::new().estimate(std::slice::from_ref(&attempt));
    let composition =
        SplitComposition::from_attempt(&attempt, 1.0, table.opening_split(&attempt.key), 50.0).unwrap();
    assert_eq!(composition.split_time_s, 50.0);
    assert_eq!(composition.counts.arm_pulls, 6.0);
    assert_eq!(composition.counts.leg_kicks, 8.0);
    assert_eq!(composition.counts.wall_pushes, 1.0);

    let cost = composition.split_cost(&params, &builder).predicted_o2_s;
    let projection = composition.project(&params, &builder, attempt.oxygen_budget_s);
    assert!((projection.distance_m().unwrap() - 390.0 / cost * 50.0).abs() < 1e-9);

    // Fewer pulls per split cost less and carry further
    let lighter = composition.with_counts(MovementCounts::new(1.0, 5.0, 8.0, 0.0));
    assert!(lighter.project(&params, &builder, 390.0).distance_m() > projection.distance_m());
}

#[test]
fn test_sanitized_features_never_fail() {
    let built = FeatureVectorBuilder::new().build(&FeatureInputs {
        intensity: 1.2,
        wall_pushes: f64::NAN,
        arm_pulls: -3.0,
        leg_kicks: 10.0,
        dolphin_kicks: f64::INFINITY,
        duration_s: 100.0,
    });

    assert_eq!(built.vector.get(Parameter::WallPush), 0.0);
    assert_eq!(built.vector.get(Parameter::Arm), 0.0);
    assert_eq!(built.vector.get(Parameter::Dolphin), 0.0);
    assert!((built.vector.get(Parameter::Leg) - 12.0).abs() < 1e-12);
    assert_eq!(built.vector.get(Parameter::AnaerobicRecovery), -100.0);
    assert!(!built.is_clean());
}

#[test]
fn test_overshoot_costs_more_than_undershoot() {
    let scorer = PenaltyScorer::new();
    let over = ScoreInput {
        budget_s: 400.0,
        predicted_o2_s: 440.0,
        ..Default::default()
    };
    let under = ScoreInput {
        budget_s: 400.0,
        predicted_o2_s: 360.0,
        ..Default::default()
    };
    assert!(scorer.sta_penalty(&over) > scorer.sta_penalty(&under));

    let long = ScoreInput {
        actual_distance_m: Some(150.0),
        predicted_distance_m: Some(165.0),
        ..Default::default()
    };
    let short = ScoreInput {
        actual_distance_m: Some(150.0),
        predicted_distance_m: Some(135.0),
        ..Default::default()
    };
    assert!(scorer.distance_penalty(&long) > scorer.distance_penalty(&short));
}

#[test]
fn test_median_athlete_is_neutral_and_prediction_matches_features() {
    let split = |athlete: &str, time: f64| {
        Attempt::from_segments(
            athlete,
            Discipline::Dnf,
            50.0,
            time,
            300.0,
            vec![Segment {
                checkpoint_m: 50,
                distance_m: 50.0,
                elapsed_s: time,
                counts: MovementCounts::new(1.0, 6.0, 8.0, 0.0),
            }],
        )
    };
    let attempts = vec![split("A", 45.0), split("B", 50.0), split("C", 55.0)];

    let table = MovementIntensityEstimator::new().estimate(&attempts);
    let median = table.intensity_for(&attempts[1].key);
    assert!((median - 1.0).abs() < 1e-12);
    assert!(table.intensity_for(&attempts[0].key) > 1.0);

    let features = FeatureVectorBuilder::new().build(&FeatureInputs::from_attempt(&attempts[1], median));
    let prediction = evaluate(&ParameterSet::reference(), &features.vector);
    let expected: f64 = ParameterSet::reference()
        .iter()
        .map(|(parameter, value)| value * features.vector.get(parameter))
        .sum();
    assert!((prediction.predicted_o2_s - expected).abs() < 1e-9);
}
