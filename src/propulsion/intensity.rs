// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Movement Intensity
//!
//! Estimates how hard each athlete works per movement, relative to the
//! cohort. The opening split is treated as a fixed mechanical task: its work
//! (distance × speed²) is shared between arm pulls and kicks according to the
//! arm/leg ratio, and the work per pull and per kick are compared with the
//! cohort medians. An athlete at the median of both receives 1.0.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::fitter::median_sorted;
use super::projector::OpeningSplit;
use crate::constants::model::{DEFAULT_ARM_LEG_RATIO, INTENSITY_FLOOR, NEUTRAL_INTENSITY};
use crate::models::{positive, Attempt, AthleteKey, Segment};

/// Mechanical work of one opening split
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitWork {
    pub split_time_s: f64,
    pub distance_m: f64,
    pub speed_m_s: f64,
    pub arm_pulls: f64,
    pub leg_kicks: f64,
    /// Leg plus dolphin kicks
    pub kicks: f64,
    /// Fraction of the work attributed to the arms
    pub arm_share: f64,
    pub total_work: f64,
    pub arm_work: f64,
    pub kick_work: f64,
    pub arm_work_per_pull: Option<f64>,
    pub kick_work_per_kick: Option<f64>,
}

impl SplitWork {
    /// Kick work over arm work; `None` without arm work
    pub fn work_bias(&self) -> Option<f64> {
        (self.arm_work > 0.0).then(|| self.kick_work / self.arm_work)
    }
}

/// Cohort medians the per-athlete ratios are taken against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortBaseline {
    pub arm_leg_ratio: f64,
    /// Opening splits that contributed
    pub records: usize,
    pub split_time_s_median: Option<f64>,
    pub arm_work_per_pull_median: Option<f64>,
    pub kick_work_per_kick_median: Option<f64>,
}

/// Intensity of one athlete
///
/// Apart from `intensity`, every figure is the median over the athlete's
/// opening splits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AthleteIntensity {
    pub athlete: String,
    pub intensity: f64,
    pub split_time_s: Option<f64>,
    pub arm_pulls: Option<f64>,
    pub leg_kicks: Option<f64>,
    pub arm_work: Option<f64>,
    pub kick_work: Option<f64>,
    /// Kick work over arm work
    pub work_bias: Option<f64>,
    /// Opening splits the intensity was derived from
    pub splits: usize,
}

impl AthleteIntensity {
    pub fn opening_split(&self) -> OpeningSplit {
        OpeningSplit {
            split_time_s: self.split_time_s,
            arm_pulls: self.arm_pulls,
            leg_kicks: self.leg_kicks,
        }
    }
}

/// Per-athlete intensities for one dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensityTable {
    pub baseline: CohortBaseline,
    pub athletes: BTreeMap<AthleteKey, AthleteIntensity>,
}

impl IntensityTable {
    /// Intensity of an athlete, neutral when unknown
    pub fn intensity_for(&self, key: &AthleteKey) -> f64 {
        self.athletes
            .get(key)
            .map(|entry| entry.intensity)
            .unwrap_or(NEUTRAL_INTENSITY)
    }

    /// Typical opening split of an athlete; empty when unknown
    pub fn opening_split(&self, key: &AthleteKey) -> OpeningSplit {
        self.athletes
            .get(key)
            .map(AthleteIntensity::opening_split)
            .unwrap_or_default()
    }
}

/// Derives movement intensity from opening splits
#[derive(Debug, Clone, Copy)]
pub struct MovementIntensityEstimator {
    arm_leg_ratio: f64,
}

impl Default for MovementIntensityEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl MovementIntensityEstimator {
    pub fn new() -> Self {
        Self {
            arm_leg_ratio: DEFAULT_ARM_LEG_RATIO,
        }
    }

    /// Non-positive or non-finite ratios fall back to the default
    pub fn with_arm_leg_ratio(arm_leg_ratio: f64) -> Self {
        Self {
            arm_leg_ratio: if positive(arm_leg_ratio) {
                arm_leg_ratio
            } else {
                DEFAULT_ARM_LEG_RATIO
            },
        }
    }

    pub fn arm_leg_ratio(&self) -> f64 {
        self.arm_leg_ratio
    }

    /// Work decomposition of a split; `None` when timing or counts are unusable
    pub fn split_work(&self, segment: &Segment) -> Option<SplitWork> {
        if !segment.is_timed() {
            return None;
        }
        let arms = non_negative(segment.counts.arm_pulls);
        let legs = non_negative(segment.counts.leg_kicks);
        let kicks = legs + non_negative(segment.counts.dolphin_kicks);

        let speed = segment.distance_m / segment.elapsed_s;
        let total_work = segment.distance_m * speed * speed;
        let arm_share = self.arm_share(arms, kicks);
        let arm_work = total_work * arm_share;
        let kick_work = total_work - arm_work;

        let arm_work_per_pull = (arms > 0.0).then(|| arm_work / arms);
        let kick_work_per_kick = (kicks > 0.0).then(|| kick_work / kicks);
        if arm_work_per_pull.is_none() && kick_work_per_kick.is_none() {
            return None;
        }

        Some(SplitWork {
            split_time_s: segment.elapsed_s,
            distance_m: segment.distance_m,
            speed_m_s: speed,
            arm_pulls: arms,
            leg_kicks: legs,
            kicks,
            arm_share,
            total_work,
            arm_work,
            kick_work,
            arm_work_per_pull,
            kick_work_per_kick,
        })
    }

    fn arm_share(&self, arms: f64, kicks: f64) -> f64 {
        let numerator = self.arm_leg_ratio * arms;
        let denominator = numerator + kicks;
        if denominator <= 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }

    /// Cohort medians over a set of opening splits
    pub fn baseline(&self, records: &[SplitWork]) -> CohortBaseline {
        let times: Vec<f64> = records.iter().map(|record| record.split_time_s).collect();
        let arms: Vec<f64> = records.iter().filter_map(|record| record.arm_work_per_pull).collect();
        let kicks: Vec<f64> = records.iter().filter_map(|record| record.kick_work_per_kick).collect();

        CohortBaseline {
            arm_leg_ratio: self.arm_leg_ratio,
            records: records.len(),
            split_time_s_median: median(times),
            arm_work_per_pull_median: median(arms),
            kick_work_per_kick_median: median(kicks),
        }
    }

    /// Intensity of one split against the cohort; neutral when nothing compares
    pub fn intensity(&self, record: &SplitWork, baseline: &CohortBaseline) -> f64 {
        let ratios: Vec<f64> = [
            ratio(record.arm_work_per_pull, baseline.arm_work_per_pull_median),
            ratio(record.kick_work_per_kick, baseline.kick_work_per_kick_median),
        ]
        .into_iter()
        .flatten()
        .collect();

        if ratios.is_empty() {
            return NEUTRAL_INTENSITY;
        }
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        if mean.is_finite() {
            mean.max(INTENSITY_FLOOR)
        } else {
            NEUTRAL_INTENSITY
        }
    }

    /// Build the per-athlete table for a set of attempts
    ///
    /// Athletes with several attempts receive the median of their per-attempt
    /// intensities. Athletes without a usable opening split are absent and
    /// therefore neutral.
    pub fn estimate(&self, attempts: &[Attempt]) -> IntensityTable {
        let records: Vec<(&Attempt, SplitWork)> = attempts
            .iter()
            .filter(|attempt| !attempt.key.is_empty())
            .filter_map(|attempt| {
                let work = attempt.first_split().and_then(|split| self.split_work(split));
                if work.is_none() {
                    debug!(
                        athlete.name = %attempt.athlete,
                        "No usable opening split, intensity stays neutral"
                    );
                }
                work.map(|work| (attempt, work))
            })
            .collect();

        let works: Vec<SplitWork> = records.iter().map(|(_, work)| work.clone()).collect();
        let baseline = self.baseline(&works);

        let mut grouped: BTreeMap<AthleteKey, (String, Vec<f64>, Vec<&SplitWork>)> = BTreeMap::new();
        for (attempt, work) in &records {
            let entry = grouped
                .entry(attempt.key.clone())
                .or_insert_with(|| (attempt.athlete.clone(), Vec::new(), Vec::new()));
            entry.1.push(self.intensity(work, &baseline));
            entry.2.push(work);
        }

        let athletes = grouped
            .into_iter()
            .map(|(key, (athlete, intensities, works))| {
                let column = |field: fn(&SplitWork) -> f64| median(works.iter().map(|work| field(work)).collect());
                let arm_work = column(|work| work.arm_work);
                let kick_work = column(|work| work.kick_work);
                let work_bias = median(works.iter().filter_map(|work| work.work_bias()).collect()).or_else(|| {
                    match (arm_work, kick_work) {
                        (Some(arm), Some(kick)) if arm > 0.0 => Some(kick / arm),
                        _ => None,
                    }
                });

                let entry = AthleteIntensity {
                    athlete,
                    intensity: median(intensities).unwrap_or(NEUTRAL_INTENSITY),
                    split_time_s: column(|work| work.split_time_s),
                    arm_pulls: column(|work| work.arm_pulls),
                    leg_kicks: column(|work| work.leg_kicks),
                    arm_work,
                    kick_work,
                    work_bias,
                    splits: works.len(),
                };
                (key, entry)
            })
            .collect();

        IntensityTable { baseline, athletes }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

fn ratio(value: Option<f64>, median: Option<f64>) -> Option<f64> {
    match (value, median) {
        (Some(value), Some(median)) if positive(median) && value.is_finite() => Some(value / median),
        _ => None,
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|value| value.is_finite());
    values.sort_by(f64::total_cmp);
    median_sorted(&values)
}
