// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use anyhow::{bail, Context, Result};
use apnea_o2_model::config::Config;
use apnea_o2_model::ingest::{RaceSheetReader, StaRoster};
use apnea_o2_model::logging::{LoggingConfig, ModelLogger};
use apnea_o2_model::propulsion::{DatasetModel, DatasetReport};
use clap::Parser;
use std::collections::BTreeMap;
use std::fs;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "apnea-fit")]
#[command(about = "Fit the oxygen-cost model to every configured race sheet")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Directory holding the race sheets and roster
    #[arg(long)]
    data_root: Option<String>,

    /// STA roster file, relative to the data root
    #[arg(long)]
    sta_file: Option<String>,

    /// Output JSON file
    #[arg(short, long)]
    output: Option<String>,

    /// Only fit these datasets (repeatable)
    #[arg(short, long = "dataset")]
    datasets: Vec<String>,

    /// Print the reports to stdout instead of writing the output file
    #[arg(long)]
    stdout: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let logging = LoggingConfig::from_env();
    let logging = if args.verbose { logging.verbose() } else { logging };
    logging.init()?;

    let mut config = Config::load(args.config.clone())?;
    config.apply_overrides(args.data_root.clone(), args.sta_file.clone(), args.output.clone());

    let sta_path = config.data.sta_path();
    let roster = StaRoster::load(&sta_path)
        .with_context(|| format!("Failed to load STA roster from {}", sta_path.display()))?;
    info!(roster.path = %sta_path.display(), roster.athletes = roster.len(), "STA roster loaded");

    let reports = fit_datasets(&config, &roster, &args.datasets);
    if reports.is_empty() {
        bail!("No dataset produced a report");
    }

    let json = serde_json::to_string_pretty(&reports)?;
    if args.stdout {
        println!("{}", json);
        return Ok(());
    }

    let output = &config.data.output;
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }
    fs::write(output, json).with_context(|| format!("Failed to write {}", output.display()))?;
    info!(output.path = %output.display(), output.datasets = reports.len(), "Reports written");

    Ok(())
}

fn fit_datasets(config: &Config, roster: &StaRoster, only: &[String]) -> BTreeMap<String, DatasetReport> {
    let model = DatasetModel::new(config.model.clone());
    let mut reports = BTreeMap::new();

    for source in &config.data.datasets {
        if !only.is_empty() && !only.iter().any(|name| name.eq_ignore_ascii_case(&source.name)) {
            continue;
        }

        let path = config.data.dataset_path(source);
        let loaded = match RaceSheetReader::new(source.name.clone(), source.discipline, roster).load(&path) {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(dataset.name = %source.name, dataset.path = %path.display(), "Failed to read race sheet: {}", e);
                continue;
            }
        };
        ModelLogger::log_dataset_loaded(&source.name, loaded.dataset.attempts.len(), loaded.rejected.len());
        if !loaded.missing_budget.is_empty() {
            warn!(
                dataset.name = %source.name,
                athletes = %loaded.missing_budget.join(", "),
                "Athletes without an STA personal best"
            );
        }

        match model.run(&loaded.dataset) {
            Ok(report) => {
                reports.insert(source.name.clone(), report);
            }
            Err(e) => ModelLogger::log_fit_failure(&source.name, &e),
        }
    }

    reports
}
