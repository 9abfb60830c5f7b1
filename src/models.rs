// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Data Models
//!
//! Core data structures shared by the ingestion boundary and the oxygen model.
//! Raw race-sheet columns never travel past [`crate::ingest`]: everything
//! downstream works on the typed records defined here.
//!
//! ## Core Models
//!
//! - [`Attempt`]: one recorded dynamic swim with its STA-derived oxygen budget
//! - [`Segment`]: the movements and timing of one split of an attempt
//! - [`MovementCounts`]: wall pushes, arm pulls, leg kicks and dolphin kicks
//! - [`Dataset`]: a named collection of attempts for one discipline
//! - [`AthleteKey`]: normalized athlete name used as the join key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Competition discipline of a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Discipline {
    /// Dynamic No Fins (breaststroke arm pulls with frog kicks)
    Dnf,
    /// Dynamic with Bifins (dolphin or flutter kicks, no arm pulls)
    Dynb,
}

impl Discipline {
    /// Short competition code ("DNF" / "DYNB")
    pub fn code(&self) -> &'static str {
        match self {
            Discipline::Dnf => "DNF",
            Discipline::Dynb => "DYNB",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Case and whitespace insensitive athlete identifier
///
/// ```rust
/// use apnea_o2_model::models::AthleteKey;
///
/// assert_eq!(AthleteKey::new("  Jane   DOE "), AthleteKey::new("jane doe"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AthleteKey(String);

impl AthleteKey {
    pub fn new(name: &str) -> Self {
        let normalized = name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Self(normalized)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AthleteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Counts of the propulsion movements tracked per split
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementCounts {
    pub wall_pushes: f64,
    pub arm_pulls: f64,
    pub leg_kicks: f64,
    pub dolphin_kicks: f64,
}

impl MovementCounts {
    pub fn new(wall_pushes: f64, arm_pulls: f64, leg_kicks: f64, dolphin_kicks: f64) -> Self {
        Self {
            wall_pushes,
            arm_pulls,
            leg_kicks,
            dolphin_kicks,
        }
    }

    /// Divide every count by `divisor`
    pub fn scaled(&self, divisor: f64) -> Self {
        Self {
            wall_pushes: self.wall_pushes / divisor,
            arm_pulls: self.arm_pulls / divisor,
            leg_kicks: self.leg_kicks / divisor,
            dolphin_kicks: self.dolphin_kicks / divisor,
        }
    }
}

impl std::ops::Add for MovementCounts {
    type Output = MovementCounts;

    fn add(self, other: MovementCounts) -> MovementCounts {
        MovementCounts {
            wall_pushes: self.wall_pushes + other.wall_pushes,
            arm_pulls: self.arm_pulls + other.arm_pulls,
            leg_kicks: self.leg_kicks + other.leg_kicks,
            dolphin_kicks: self.dolphin_kicks + other.dolphin_kicks,
        }
    }
}

/// One split of an attempt, between two timing checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Checkpoint label from the race sheet (e.g. "50")
    pub checkpoint_m: u32,
    /// Length swum in this segment in meters
    pub distance_m: f64,
    /// Time spent in this segment in seconds (NaN when not recorded)
    pub elapsed_s: f64,
    /// Movements performed in this segment
    pub counts: MovementCounts,
}

impl Segment {
    /// Segment with both a positive length and a positive time
    pub fn is_timed(&self) -> bool {
        self.distance_m.is_finite()
            && self.distance_m > 0.0
            && self.elapsed_s.is_finite()
            && self.elapsed_s > 0.0
    }
}

/// A single recorded dynamic apnea swim
///
/// Constructed once at the ingestion boundary and then read-only.
///
/// # Examples
///
/// ```rust
/// use apnea_o2_model::models::{Attempt, Discipline, MovementCounts, Segment};
///
/// let split = Segment {
///     checkpoint_m: 50,
///     distance_m: 50.0,
///     elapsed_s: 55.0,
///     counts: MovementCounts::new(1.0, 6.0, 8.0, 0.0),
/// };
/// let attempt = Attempt::from_segments("Jane Doe", Discipline::Dnf, 50.0, 55.0, 420.0, vec![split]);
///
/// assert!(attempt.is_valid());
/// assert_eq!(attempt.totals.arm_pulls, 6.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Athlete name as written on the sheet
    pub athlete: String,
    /// Normalized join key
    pub key: AthleteKey,
    pub discipline: Discipline,
    /// Total distance in meters
    pub distance_m: f64,
    /// Total elapsed time in seconds
    pub total_time_s: f64,
    /// STA personal best in seconds, used as the oxygen budget proxy
    pub oxygen_budget_s: f64,
    /// Per-split annotations in swim order
    pub segments: Vec<Segment>,
    /// Movement totals for the whole swim
    pub totals: MovementCounts,
}

impl Attempt {
    /// Build an attempt whose totals are the sum over its segments
    pub fn from_segments(
        athlete: &str,
        discipline: Discipline,
        distance_m: f64,
        total_time_s: f64,
        oxygen_budget_s: f64,
        segments: Vec<Segment>,
    ) -> Self {
        let totals = segments
            .iter()
            .fold(MovementCounts::default(), |acc, segment| acc + segment.counts);
        Self::with_totals(
            athlete,
            discipline,
            distance_m,
            total_time_s,
            oxygen_budget_s,
            segments,
            totals,
        )
    }

    /// Build an attempt with explicitly declared movement totals
    #[allow(clippy::too_many_arguments)]
    pub fn with_totals(
        athlete: &str,
        discipline: Discipline,
        distance_m: f64,
        total_time_s: f64,
        oxygen_budget_s: f64,
        segments: Vec<Segment>,
        totals: MovementCounts,
    ) -> Self {
        Self {
            athlete: athlete.trim().to_string(),
            key: AthleteKey::new(athlete),
            discipline,
            distance_m,
            total_time_s,
            oxygen_budget_s,
            segments,
            totals,
        }
    }

    /// Positive distance, duration and budget
    pub fn is_valid(&self) -> bool {
        positive(self.distance_m) && positive(self.total_time_s) && positive(self.oxygen_budget_s)
    }

    /// The opening split, when it has usable timing
    pub fn first_split(&self) -> Option<&Segment> {
        self.segments.first().filter(|segment| segment.is_timed())
    }
}

/// A named set of attempts for one discipline
///
/// Passed explicitly to every stage of the model; there is no process-wide
/// "active dataset".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub discipline: Discipline,
    pub attempts: Vec<Attempt>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, discipline: Discipline, attempts: Vec<Attempt>) -> Self {
        Self {
            name: name.into(),
            discipline,
            attempts,
        }
    }

    /// Look up the attempts of one athlete
    pub fn attempts_for<'a>(&'a self, athlete: &str) -> impl Iterator<Item = &'a Attempt> + 'a {
        let key = AthleteKey::new(athlete);
        self.attempts.iter().filter(move |attempt| attempt.key == key)
    }
}

pub(crate) fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(checkpoint: u32, time: f64, arms: f64, legs: f64) -> Segment {
        Segment {
            checkpoint_m: checkpoint,
            distance_m: 50.0,
            elapsed_s: time,
            counts: MovementCounts::new(1.0, arms, legs, 0.0),
        }
    }

    #[test]
    fn test_athlete_key_normalization() {
        assert_eq!(AthleteKey::new("Ana  Maria\tSilva "), AthleteKey::new("ana maria silva"));
        assert!(AthleteKey::new("   ").is_empty());
    }

    #[test]
    fn test_attempt_totals_from_segments() {
        let attempt = Attempt::from_segments(
            "Test",
            Discipline::Dnf,
            100.0,
            110.0,
            400.0,
            vec![segment(50, 52.0, 6.0, 9.0), segment(100, 58.0, 7.0, 10.0)],
        );

        assert_eq!(attempt.totals.wall_pushes, 2.0);
        assert_eq!(attempt.totals.arm_pulls, 13.0);
        assert_eq!(attempt.totals.leg_kicks, 19.0);
        assert_eq!(attempt.first_split().map(|s| s.elapsed_s), Some(52.0));
    }

    #[test]
    fn test_attempt_validity() {
        let mut attempt =
            Attempt::from_segments("Test", Discipline::Dnf, 100.0, 110.0, 400.0, Vec::new());
        assert!(attempt.is_valid());
        assert!(attempt.first_split().is_none());

        attempt.oxygen_budget_s = 0.0;
        assert!(!attempt.is_valid());

        attempt.oxygen_budget_s = 400.0;
        attempt.total_time_s = f64::NAN;
        assert!(!attempt.is_valid());
    }

    #[test]
    fn test_dataset_lookup_by_athlete() {
        let dataset = Dataset::new(
            "DNF",
            Discipline::Dnf,
            vec![
                Attempt::from_segments("Jane Doe", Discipline::Dnf, 100.0, 110.0, 400.0, Vec::new()),
                Attempt::from_segments("John Roe", Discipline::Dnf, 150.0, 160.0, 380.0, Vec::new()),
            ],
        );

        assert_eq!(dataset.attempts_for("JANE doe").count(), 1);
        assert_eq!(dataset.attempts_for("nobody").count(), 0);
    }
}
