// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Race Sheet Ingestion
//!
//! Reads hand-annotated race sheets and the STA personal-best roster into
//! typed [`Attempt`] records. Raw column names stop here.
//!
//! ## Race sheet columns
//!
//! | Column | Meaning |
//! |--------|---------|
//! | `Name`, `Dist`, `TT` | athlete, distance (m), total time |
//! | `T{n}` | cumulative time at checkpoint `n` metres |
//! | `A{n}` | arm pulls in the segment ending at `n` |
//! | `K{n}` | kicks in the segment ending at `n` |
//! | `TW`, `TA`, `TK`, `TDK` | declared totals (wall pushes, arms, kicks, dolphin kicks) |
//! | `ST_K`, `ST_WK`, `ST_DK` | style template: leg kicks per pull, kicks after the wall, dolphin kicks per pull |
//!
//! Unparseable cells are treated as missing and never abort a load.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::{BTreeSet, HashMap};
use std::io::Read;
use std::path::Path;

use crate::constants::columns;
use crate::constants::model::DEFAULT_SPLIT_DISTANCE_M;
use crate::models::{positive, Attempt, AthleteKey, Dataset, Discipline, MovementCounts, Segment};

/// Ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to read {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column '{column}' missing from {source_name}")]
    MissingColumn { source_name: String, column: String },
}

/// Parse `hh:mm:ss`, `mm:ss` or plain seconds
///
/// ```rust
/// use apnea_o2_model::ingest::parse_duration_seconds;
///
/// assert_eq!(parse_duration_seconds("6:30"), Some(390.0));
/// assert_eq!(parse_duration_seconds("1:02:03.5"), Some(3723.5));
/// assert_eq!(parse_duration_seconds("-"), None);
/// ```
pub fn parse_duration_seconds(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }
    let mut seconds = 0.0;
    let mut multiplier = 1.0;
    for part in text.split(':').rev() {
        let value: f64 = part.trim().parse().ok()?;
        seconds += value * multiplier;
        multiplier *= 60.0;
    }
    seconds.is_finite().then_some(seconds)
}

/// Parse a numeric cell; blanks and dashes are missing
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// STA personal bests keyed by athlete
#[derive(Debug, Clone, Default)]
pub struct StaRoster {
    budgets: HashMap<AthleteKey, f64>,
}

impl StaRoster {
    pub fn load(path: &Path) -> Result<Self, IngestError> {
        let reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|source| IngestError::Open {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_csv(reader, &path.display().to_string())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        let reader = ReaderBuilder::new().flexible(true).trim(Trim::All).from_reader(reader);
        Self::from_csv(reader, "roster")
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>, source_name: &str) -> Result<Self, IngestError> {
        let header = HeaderIndex::new(reader.headers()?);
        let name_column = header.require(columns::NAME, source_name)?;
        let sta_column = header.require(columns::STA, source_name)?;

        let mut budgets = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let key = AthleteKey::new(record.get(name_column).unwrap_or(""));
            let sta = record.get(sta_column).and_then(parse_duration_seconds);
            if let (false, Some(sta)) = (key.is_empty(), sta.filter(|value| *value > 0.0)) {
                budgets.insert(key, sta);
            }
        }
        Ok(Self { budgets })
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self {
            budgets: entries
                .into_iter()
                .map(|(name, sta)| (AthleteKey::new(name), sta))
                .collect(),
        }
    }

    pub fn budget_for(&self, key: &AthleteKey) -> Option<f64> {
        self.budgets.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }
}

/// A sheet row that could not become an attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRow {
    /// 1-based data row number
    pub row: usize,
    pub athlete: String,
    pub reason: &'static str,
}

/// Result of reading one race sheet
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub dataset: Dataset,
    pub rejected: Vec<RejectedRow>,
    /// Attempts whose athlete is missing from the roster
    pub missing_budget: Vec<String>,
}

/// Reads one discipline's race sheet
#[derive(Debug, Clone)]
pub struct RaceSheetReader<'a> {
    name: String,
    discipline: Discipline,
    roster: &'a StaRoster,
}

impl<'a> RaceSheetReader<'a> {
    pub fn new(name: impl Into<String>, discipline: Discipline, roster: &'a StaRoster) -> Self {
        Self {
            name: name.into(),
            discipline,
            roster,
        }
    }

    pub fn load(&self, path: &Path) -> Result<LoadedDataset, IngestError> {
        let reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_path(path)
            .map_err(|source| IngestError::Open {
                path: path.display().to_string(),
                source,
            })?;
        self.read(reader)
    }

    pub fn from_reader<R: Read>(&self, reader: R) -> Result<LoadedDataset, IngestError> {
        let reader = ReaderBuilder::new().flexible(true).trim(Trim::All).from_reader(reader);
        self.read(reader)
    }

    fn read<R: Read>(&self, mut reader: csv::Reader<R>) -> Result<LoadedDataset, IngestError> {
        let header = HeaderIndex::new(reader.headers()?);
        header.require(columns::NAME, &self.name)?;
        header.require(columns::DISTANCE, &self.name)?;

        let mut attempts = Vec::new();
        let mut rejected = Vec::new();
        let mut missing_budget = Vec::new();

        for (index, record) in reader.records().enumerate() {
            let record = record?;
            let row = Row {
                header: &header,
                record: &record,
            };
            let athlete = row.text(columns::NAME).unwrap_or("").to_string();
            match self.attempt_from_row(&row) {
                Ok(attempt) => {
                    if !positive(attempt.oxygen_budget_s) {
                        missing_budget.push(attempt.athlete.clone());
                    }
                    attempts.push(attempt);
                }
                Err(reason) => rejected.push(RejectedRow {
                    row: index + 1,
                    athlete,
                    reason,
                }),
            }
        }

        Ok(LoadedDataset {
            dataset: Dataset::new(self.name.clone(), self.discipline, attempts),
            rejected,
            missing_budget,
        })
    }

    fn attempt_from_row(&self, row: &Row<'_>) -> Result<Attempt, &'static str> {
        let athlete = row.text(columns::NAME).unwrap_or("");
        if AthleteKey::new(athlete).is_empty() {
            return Err("missing athlete name");
        }
        let distance = row
            .number(columns::DISTANCE)
            .filter(|value| *value > 0.0)
            .ok_or("distance missing or not positive")?;
        let total_time = row.duration(columns::TOTAL_TIME).unwrap_or(f64::NAN);
        let budget = self
            .roster
            .budget_for(&AthleteKey::new(athlete))
            .unwrap_or(f64::NAN);

        let style = StyleTemplate::from_row(row);
        let segments = self.segments(row, distance, total_time, &style);
        let totals = self.totals(row, distance, &segments, &style);

        Ok(Attempt::with_totals(
            athlete,
            self.discipline,
            distance,
            total_time,
            budget,
            segments,
            totals,
        ))
    }

    /// Segments for every checkpoint up to the swim distance
    fn segments(&self, row: &Row<'_>, distance: f64, total_time: f64, style: &StyleTemplate) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut previous_distance = 0.0;
        let mut previous_time = 0.0;

        for &checkpoint in &row.header.checkpoints {
            if distance <= previous_distance {
                break;
            }
            let end = distance.min(checkpoint as f64);
            let length = end - previous_distance;
            if length <= 0.0 {
                continue;
            }

            let mut cumulative = row.duration(&format!("{}{}", columns::TIME_PREFIX, checkpoint));
            if cumulative.is_none() && end < checkpoint as f64 && total_time.is_finite() {
                cumulative = Some(total_time);
            }
            let elapsed = match cumulative {
                Some(time) if time >= previous_time => {
                    let elapsed = time - previous_time;
                    previous_time = time;
                    elapsed
                }
                _ => f64::NAN,
            };

            let arms = row.number(&format!("{}{}", columns::ARM_PREFIX, checkpoint));
            let kicks = row.number(&format!("{}{}", columns::KICK_PREFIX, checkpoint));
            let counts = match self.discipline {
                Discipline::Dnf => MovementCounts::new(
                    1.0,
                    arms.unwrap_or(0.0),
                    kicks.unwrap_or_else(|| style.leg_kicks_for(arms.unwrap_or(0.0))),
                    style.dolphin_kicks_for(arms.unwrap_or(0.0)),
                ),
                Discipline::Dynb => MovementCounts::new(1.0, arms.unwrap_or(0.0), 0.0, kicks.unwrap_or(0.0)),
            };

            segments.push(Segment {
                checkpoint_m: checkpoint,
                distance_m: length,
                elapsed_s: elapsed,
                counts,
            });
            previous_distance = end;
        }

        segments
    }

    /// Declared totals, falling back to the style template and then to the segment sums
    fn totals(&self, row: &Row<'_>, distance: f64, segments: &[Segment], style: &StyleTemplate) -> MovementCounts {
        let summed = segments
            .iter()
            .fold(MovementCounts::default(), |acc, segment| acc + segment.counts);

        let wall_pushes = row
            .number(columns::TOTAL_WALL_PUSHES)
            .filter(|value| *value > 0.0)
            .unwrap_or_else(|| {
                if segments.is_empty() {
                    (distance / DEFAULT_SPLIT_DISTANCE_M).ceil().max(1.0)
                } else {
                    segments.len() as f64
                }
            });
        let total_arms = row.number(columns::TOTAL_ARM_PULLS);
        let arm_pulls = total_arms.unwrap_or(summed.arm_pulls);
        let total_kicks = row.number(columns::TOTAL_KICKS);
        let total_dolphins = row.number(columns::TOTAL_DOLPHIN_KICKS);

        let (leg_kicks, dolphin_kicks) = match self.discipline {
            Discipline::Dnf => {
                let legs = total_kicks
                    .or_else(|| total_arms.map(|arms| style.kicks_per_pull * arms + style.wall_kicks * wall_pushes))
                    .unwrap_or(summed.leg_kicks);
                let dolphins = total_dolphins
                    .or_else(|| total_arms.map(|arms| style.dolphin_kicks_for(arms)))
                    .unwrap_or(summed.dolphin_kicks);
                (legs, dolphins)
            }
            Discipline::Dynb => (0.0, total_dolphins.or(total_kicks).unwrap_or(summed.dolphin_kicks)),
        };

        MovementCounts::new(wall_pushes, arm_pulls, leg_kicks, dolphin_kicks)
    }
}

/// Per-athlete stroke template of a DNF sheet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StyleTemplate {
    kicks_per_pull: f64,
    wall_kicks: f64,
    dolphins_per_pull: f64,
}

impl StyleTemplate {
    fn from_row(row: &Row<'_>) -> Self {
        let read = |column: &str| row.number(column).filter(|value| *value > 0.0).unwrap_or(0.0);
        Self {
            kicks_per_pull: read(columns::STYLE_KICKS_PER_PULL),
            wall_kicks: read(columns::STYLE_WALL_KICKS),
            dolphins_per_pull: read(columns::STYLE_DOLPHIN_PER_PULL),
        }
    }

    /// Leg kicks of one segment: kicks with the pulls plus those after the wall
    fn leg_kicks_for(&self, arms: f64) -> f64 {
        self.kicks_per_pull * arms + self.wall_kicks
    }

    fn dolphin_kicks_for(&self, arms: f64) -> f64 {
        self.dolphins_per_pull * arms
    }
}

struct HeaderIndex {
    positions: HashMap<String, usize>,
    /// Checkpoint distances found in `T{n}` / `A{n}` / `K{n}` headers, ascending
    checkpoints: Vec<u32>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let mut positions = HashMap::new();
        let mut checkpoints = BTreeSet::new();
        for (index, name) in headers.iter().enumerate() {
            let name = name.trim();
            positions.entry(name.to_string()).or_insert(index);
            if let Some(checkpoint) = checkpoint_of(name) {
                checkpoints.insert(checkpoint);
            }
        }
        Self {
            positions,
            checkpoints: checkpoints.into_iter().collect(),
        }
    }

    fn require(&self, column: &str, source_name: &str) -> Result<usize, IngestError> {
        self.positions
            .get(column)
            .copied()
            .ok_or_else(|| IngestError::MissingColumn {
                source_name: source_name.to_string(),
                column: column.to_string(),
            })
    }
}

fn checkpoint_of(header: &str) -> Option<u32> {
    let mut chars = header.chars();
    let prefix = chars.next()?;
    if ![columns::TIME_PREFIX, columns::ARM_PREFIX, columns::KICK_PREFIX].contains(&prefix) {
        return None;
    }
    let digits = chars.as_str();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|value| *value > 0)
}

struct Row<'a> {
    header: &'a HeaderIndex,
    record: &'a StringRecord,
}

impl<'a> Row<'a> {
    fn text(&self, column: &str) -> Option<&'a str> {
        let index = *self.header.positions.get(column)?;
        self.record.get(index)
    }

    fn number(&self, column: &str) -> Option<f64> {
        self.text(column).and_then(parse_number)
    }

    fn duration(&self, column: &str) -> Option<f64> {
        self.text(column).and_then(parse_duration_seconds)
    }
}
