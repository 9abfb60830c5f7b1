// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::{anyhow, bail, Context, Result};
use apnea_o2_model::config::Config;
use apnea_o2_model::ingest::{RaceSheetReader, StaRoster};
use apnea_o2_model::logging::{LoggingConfig, ModelLogger};
use apnea_o2_model::models::MovementCounts;
use apnea_o2_model::propulsion::{Projection, SplitComposition, TuningSession};
use clap::Parser;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "apnea-what-if")]
#[command(about = "Re-cost one athlete's split with edited coefficients or movements")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    data_root: Option<String>,

    #[arg(long)]
    sta_file: Option<String>,

    /// Dataset to fit (e.g. DNF)
    #[arg(short, long)]
    dataset: String,

    /// Athlete whose longest attempt provides the split
    #[arg(short, long)]
    athlete: String,

    /// Coefficient override, e.g. `--set arm_o2_cost=3.2` (repeatable)
    #[arg(long = "set", value_parser = parse_override)]
    overrides: Vec<(String, f64)>,

    /// Wall pushes per split
    #[arg(long)]
    wall_pushes: Option<f64>,

    /// Arm pulls per split
    #[arg(long)]
    arms: Option<f64>,

    /// Leg kicks per split
    #[arg(long)]
    legs: Option<f64>,

    /// Dolphin kicks per split
    #[arg(long)]
    dolphins: Option<f64>,

    /// Split time in seconds
    #[arg(long)]
    split_time: Option<f64>,

    /// Oxygen budget in seconds instead of the athlete's STA
    #[arg(long)]
    budget: Option<f64>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_override(text: &str) -> Result<(String, f64), String> {
    let (key, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", text))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((key.trim().to_string(), value))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = LoggingConfig::from_env();
    let logging = if args.verbose { logging.verbose() } else { logging };
    logging.init()?;

    let mut config = Config::load(args.config.clone())?;
    config.apply_overrides(args.data_root.clone(), args.sta_file.clone(), None);

    let source = config
        .data
        .dataset(&args.dataset)
        .ok_or_else(|| anyhow!("Dataset '{}' is not configured", args.dataset))?;
    let roster = StaRoster::load(&config.data.sta_path())
        .with_context(|| format!("Failed to load STA roster from {}", config.data.sta_path().display()))?;
    let loaded = RaceSheetReader::new(source.name.clone(), source.discipline, &roster)
        .load(&config.data.dataset_path(source))
        .with_context(|| format!("Failed to read race sheet for {}", source.name))?;
    ModelLogger::log_dataset_loaded(&source.name, loaded.dataset.attempts.len(), loaded.rejected.len());
    if loaded.dataset.attempts_for(&args.athlete).next().is_none() {
        bail!("Athlete '{}' has no attempts in {}", args.athlete, source.name);
    }

    let session = TuningSession::open(&loaded.dataset, config.model.clone())?;
    let overrides: HashMap<String, f64> = args.overrides.iter().cloned().collect();
    let report = session
        .apply(&overrides)?
        .ok_or_else(|| anyhow!("No report was published"))?;

    let prediction = report
        .predictions_for(&args.athlete)
        .filter(|prediction| prediction.composition.is_some())
        .max_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
        .ok_or_else(|| anyhow!("No usable attempt for athlete '{}' in {}", args.athlete, source.name))?;
    let base = prediction
        .composition
        .ok_or_else(|| anyhow!("Attempt has no split composition"))?;

    let edited = edit_composition(base, &args);
    let builder = config.model.builder();
    let budget = args.budget.unwrap_or(prediction.budget_s);
    let split = edited.split_cost(&report.parameters, &builder);
    let projection = edited.project(&report.parameters, &builder, budget);

    info!(
        athlete.name = %prediction.athlete,
        what_if.split_cost_s = split.predicted_o2_s,
        what_if.distance_m = projection.distance_m().unwrap_or(f64::NAN),
        "What-if evaluated"
    );

    if args.json {
        let output = json!({
            "dataset": report.dataset,
            "athlete": prediction.athlete,
            "candidate": report.active_candidate,
            "parameters": report.parameters,
            "budget_s": budget,
            "baseline": {
                "composition": base,
                "split_cost_s": prediction.split_cost_s,
                "projected_distance_m": prediction.projected_distance_m,
            },
            "what_if": {
                "composition": edited,
                "split_cost_s": split.predicted_o2_s,
                "component_costs": split.component_costs,
                "projection": projection,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} / {} ({} m attempt)", report.dataset, prediction.athlete, prediction.distance_m);
    println!("Parameters: {}", report.active_candidate);
    println!("Oxygen budget: {:.1} s", budget);
    println!(
        "Split ({:.0} m): {:.1} s, {:.2} pushes, {:.2} pulls, {:.2} kicks, {:.2} dolphin kicks, intensity {:.3}",
        edited.split_distance_m,
        edited.split_time_s,
        edited.counts.wall_pushes,
        edited.counts.arm_pulls,
        edited.counts.leg_kicks,
        edited.counts.dolphin_kicks,
        edited.intensity
    );
    if let Some(cost) = prediction.split_cost_s {
        println!("Baseline split cost: {:.2} s", cost);
    }
    println!("What-if split cost: {:.2} s", split.predicted_o2_s);
    match projection {
        Projection::Available {
            split_count,
            distance_m,
        } => println!("Projected distance: {:.1} m ({:.2} splits)", distance_m, split_count),
        Projection::Unavailable { reason } => println!("Projected distance unavailable: {}", reason),
    }

    Ok(())
}

fn edit_composition(base: SplitComposition, args: &Args) -> SplitComposition {
    let counts = MovementCounts::new(
        args.wall_pushes.unwrap_or(base.counts.wall_pushes),
        args.arms.unwrap_or(base.counts.arm_pulls),
        args.legs.unwrap_or(base.counts.leg_kicks),
        args.dolphins.unwrap_or(base.counts.dolphin_kicks),
    );
    let edited = base.with_counts(counts);
    match args.split_time {
        Some(split_time) => edited.with_split_time(split_time),
        None => edited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_override() {
        assert_eq!(
            parse_override("arm_o2_cost = 3.5").unwrap(),
            ("arm_o2_cost".to_string(), 3.5)
        );
        assert!(parse_override("arm_o2_cost").is_err());
        assert!(parse_override("arm_o2_cost=abc").is_err());
    }
}
