// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! End-to-end fit over race sheets written to a temporary data root

use anyhow::Result;
use apnea_o2_model::config::Config;
use apnea_o2_model::ingest::{RaceSheetReader, StaRoster};
use apnea_o2_model::models::Discipline;
use apnea_o2_model::propulsion::{DatasetModel, ModelError, Parameter, TuningSession};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use tempfile::TempDir;

const ATHLETES: usize = 14;

fn format_time(seconds: f64) -> String {
    let whole = seconds.round() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

fn dnf_sheet() -> String {
    let mut sheet = String::from("Name,Dist,TT,T50,A50,K50,TW,TA,TK,TDK\n");
    for i in 0..ATHLETES {
        let distance = 100.0 + 25.0 * (i % 5) as f64;
        let laps = (distance / 50.0).ceil();
        let total_time = distance * 1.05 + ((i * 11) % 13) as f64;
        let first_split = 44.0 + ((i * 7) % 9) as f64;
        let arms = 5 + i % 3;
        let kicks = 7 + (i * 5) % 4;
        writeln!(
            sheet,
            "Athlete {},{},{},{},{},{},{},{},{},{}",
            i,
            distance,
            format_time(total_time),
            format_time(first_split),
            arms,
            kicks,
            laps,
            4.0 * laps + (i % 5) as f64,
            6.0 * laps + ((i * 3) % 7) as f64,
            (i % 4) as f64,
        )
        .unwrap();
    }
    // A row the reader has to reject
    sheet.push_str(",150,2:40,,,,,,,\n");
    sheet
}

fn roster() -> String {
    let mut roster = String::from("Name,STA\n");
    for i in 0..ATHLETES {
        // Names differ from the sheet in case and spacing
        writeln!(roster, " ATHLETE   {} ,{}", i, format_time(330.0 + ((i * 17) % 90) as f64)).unwrap();
    }
    roster
}

fn data_root() -> Result<(TempDir, Config)> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("DNF.csv"), dnf_sheet())?;
    fs::write(dir.path().join("STA_PB.csv"), roster())?;

    let mut config = Config::default();
    config.apply_overrides(
        Some(dir.path().to_string_lossy().to_string()),
        None,
        Some(dir.path().join("out.json").to_string_lossy().to_string()),
    );
    Ok((dir, config))
}

#[test]
fn test_fit_from_csv_files() -> Result<()> {
    let (_dir, config) = data_root()?;
    let roster = StaRoster::load(&config.data.sta_path())?;
    assert_eq!(roster.len(), ATHLETES);

    let source = config.data.dataset("DNF").expect("default DNF dataset");
    let loaded = RaceSheetReader::new(source.name.clone(), source.discipline, &roster)
        .load(&config.data.dataset_path(source))?;
    assert_eq!(loaded.dataset.attempts.len(), ATHLETES);
    assert_eq!(loaded.rejected.len(), 1);
    assert!(loaded.missing_budget.is_empty());

    let report = DatasetModel::new(config.model.clone()).run(&loaded.dataset)?;

    assert_eq!(report.discipline, Discipline::Dnf);
    assert_eq!(report.attempts.len() + report.excluded_attempts.len(), ATHLETES);
    assert!(report.constrained.is_non_negative());
    for parameter in &report.degenerate {
        assert_eq!(report.constrained.get(*parameter), 0.0);
        assert_eq!(report.unconstrained.get(*parameter), 0.0);
    }
    assert!(report.metrics.mean_abs_error_s.is_finite());
    assert_eq!(report.intensity.athletes.len(), ATHLETES);

    let json = serde_json::to_value(&report)?;
    assert_eq!(json["parameter_order"].as_array().map(|a| a.len()), Some(Parameter::COUNT));
    assert!(json["generated_at"].is_string());
    Ok(())
}

#[test]
fn test_constraint_is_idempotent_when_ols_is_feasible() -> Result<()> {
    let (_dir, config) = data_root()?;
    let roster = StaRoster::load(&config.data.sta_path())?;
    let loaded = RaceSheetReader::new("DNF", Discipline::Dnf, &roster)
        .load(&config.data.dataset_path(&config.data.datasets[0]))?;

    let report = DatasetModel::new(config.model.clone()).run(&loaded.dataset)?;
    if !report.constraint_active {
        assert_eq!(report.constrained, report.unconstrained);
    } else {
        assert!(report.unconstrained.min_coefficient() < 0.0);
    }
    Ok(())
}

#[test]
fn test_small_sheet_reports_insufficient_data() -> Result<()> {
    let roster = StaRoster::from_reader(roster().as_bytes())?;
    let sheet: String = dnf_sheet().lines().take(5).map(|line| format!("{}\n", line)).collect();
    let loaded = RaceSheetReader::new("DNF", Discipline::Dnf, &roster).from_reader(sheet.as_bytes())?;

    let result = DatasetModel::new(Default::default()).run(&loaded.dataset);
    assert!(matches!(result, Err(ModelError::InsufficientData { required: 8, .. })));
    Ok(())
}

#[test]
fn test_tuning_session_over_csv_dataset() -> Result<()> {
    let (_dir, config) = data_root()?;
    let roster = StaRoster::load(&config.data.sta_path())?;
    let loaded = RaceSheetReader::new("DNF", Discipline::Dnf, &roster)
        .load(&config.data.dataset_path(&config.data.datasets[0]))?;

    let session = TuningSession::open(&loaded.dataset, config.model.clone())?;
    let fitted = session.current().expect("initial report");

    let mut overrides = HashMap::new();
    overrides.insert("static_o2_rate".to_string(), 1.3);
    let first = session.begin();
    let second = session.begin();
    let newer = session.compute(&overrides)?;
    let older = session.compute(&HashMap::new())?;

    assert!(session.publish(second, newer));
    assert!(!session.publish(first, older));

    let current = session.current().expect("published report");
    assert_eq!(current.parameters.get(Parameter::StaticRate), 1.3);
    assert_eq!(current.constrained, fitted.constrained);
    Ok(())
}
