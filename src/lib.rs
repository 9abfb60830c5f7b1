// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Apnea Oxygen Model
//!
//! An oxygen-cost and propulsion model for dynamic apnea swims (Dynamic No
//! Fins and Dynamic with Bifins). Race sheets annotated per split are turned
//! into feature vectors, a linear oxygen-cost model is fitted against each
//! athlete's static apnea (STA) personal best, and the fitted coefficients
//! project how far a given oxygen budget should carry an athlete.
//!
//! ## Features
//!
//! - **Movement intensity**: per-athlete effort from the opening split
//! - **Constrained fit**: least squares with non-negative coefficients
//! - **Distance projection**: budget over per-split cost
//! - **Penalty scoring**: asymmetric ranking of candidate parameter sets
//! - **Manual tuning**: re-evaluate overrides without re-fitting
//!
//! ## Quick Start
//!
//! 1. Put the race sheets and `STA_PB.csv` under the data root
//! 2. Run `apnea-fit` to fit every configured dataset
//! 3. Run `apnea-what-if` to explore overrides for one athlete
//!
//! ## Architecture
//!
//! - **Models**: typed attempts, segments and movement counts
//! - **Ingest**: CSV race sheets and the STA roster
//! - **Propulsion**: the oxygen model itself
//! - **Config**: TOML configuration and environment overrides
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use apnea_o2_model::config::Config;
//! use apnea_o2_model::ingest::{RaceSheetReader, StaRoster};
//! use apnea_o2_model::propulsion::DatasetModel;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let roster = StaRoster::load(&config.data.sta_path())?;
//!
//!     for source in &config.data.datasets {
//!         let loaded = RaceSheetReader::new(source.name.clone(), source.discipline, &roster)
//!             .load(&config.data.dataset_path(source))?;
//!         let report = DatasetModel::new(config.model.clone()).run(&loaded.dataset)?;
//!         println!("{}: {:?}", report.dataset, report.metrics);
//!     }
//!
//!     Ok(())
//! }
//! ```

/// Common data models for apnea attempts
pub mod models;

/// Configuration management and persistence
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Race sheet and STA roster ingestion
pub mod ingest;

/// Oxygen-cost model, projection and scoring
pub mod propulsion;

/// Production logging and structured output
pub mod logging;
