// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Logging configuration with structured output
//!
//! Logs go to stderr so the binaries can keep stdout for results.

use anyhow::Result;
use serde_json::json;
use std::env;
use std::io;
use tracing::{debug, info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::constants::{defaults, env_config};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `apnea_o2_model=debug`
    ///
    /// Precedence, lowest first: the `info` default, then `RUST_LOG` (read
    /// once by [`LoggingConfig::from_env`]), then [`LoggingConfig::verbose`].
    /// [`LoggingConfig::init`] uses this value as is and does not consult the
    /// environment again.
    pub level: String,
    /// Output format (json, pretty, compact)
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
    /// Include span information for tracing
    pub include_spans: bool,
    /// Service name for structured logging
    pub service_name: String,
    pub service_version: String,
    /// Environment (development, production)
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, one event per line
    Json,
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_spans: false,
            service_name: defaults::SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let level = env_config::log_level();

        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") => LogFormat::Pretty,
            _ => LogFormat::Compact,
        };

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let is_production = environment == "production";

        Self {
            level,
            format,
            include_location: is_production || env::var("LOG_INCLUDE_LOCATION").is_ok(),
            include_spans: env::var("LOG_INCLUDE_SPANS").is_ok(),
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| defaults::SERVICE_NAME.to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment,
        }
    }

    /// Use debug level, overriding `RUST_LOG`
    pub fn verbose(mut self) -> Self {
        self.level = "debug".to_string();
        self
    }

    /// Initialize the global tracing subscriber
    pub fn init(&self) -> Result<()> {
        let env_filter = EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(env_filter);
        let span_events = if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        match self.format {
            LogFormat::Json => {
                let json_layer = fmt::layer()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stderr)
                    .with_span_events(span_events)
                    .json();

                registry.with(json_layer).try_init()?;
            }
            LogFormat::Pretty => {
                let pretty_layer = fmt::layer()
                    .pretty()
                    .with_file(self.include_location)
                    .with_line_number(self.include_location)
                    .with_target(true)
                    .with_writer(io::stderr)
                    .with_span_events(span_events);

                registry.with(pretty_layer).try_init()?;
            }
            LogFormat::Compact => {
                let compact_layer = fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(io::stderr)
                    .with_span_events(FmtSpan::NONE);

                registry.with(compact_layer).try_init()?;
            }
        }

        self.log_startup_info();
        Ok(())
    }

    fn log_startup_info(&self) {
        let config_summary = json!({
            "service": {
                "name": self.service_name,
                "version": self.service_version,
                "environment": self.environment
            },
            "logging": {
                "level": self.level,
                "format": format!("{:?}", self.format),
                "location": self.include_location,
                "spans": self.include_spans
            }
        });

        debug!(
            service.name = %self.service_name,
            service.version = %self.service_version,
            environment = %self.environment,
            "Logging configured: {}",
            config_summary
        );
    }
}

/// Initialize logging from environment
pub fn init_from_env() -> Result<()> {
    LoggingConfig::from_env().init()
}

/// Model-specific logging utilities
pub struct ModelLogger;

impl ModelLogger {
    /// Log a race sheet that was read
    pub fn log_dataset_loaded(dataset: &str, attempts: usize, rejected_rows: usize) {
        info!(
            dataset.name = %dataset,
            dataset.attempts = attempts,
            dataset.rejected_rows = rejected_rows,
            "Dataset loaded"
        );
    }

    /// Log an attempt left out of the fit
    pub fn log_skipped_attempt(dataset: &str, athlete: &str, reason: &str) {
        debug!(
            dataset.name = %dataset,
            athlete.name = %athlete,
            attempt.skip_reason = %reason,
            "Attempt excluded"
        );
    }

    /// Log movement fields that were replaced by zero
    pub fn log_sanitized_inputs(dataset: &str, athlete: &str, fields: &[&str]) {
        warn!(
            dataset.name = %dataset,
            athlete.name = %athlete,
            attempt.sanitized = %fields.join(","),
            "Non-finite or negative inputs replaced"
        );
    }

    /// Log a coefficient the data could not identify
    pub fn log_degenerate_parameter(dataset: &str, parameter: &str) {
        warn!(
            dataset.name = %dataset,
            fit.parameter = %parameter,
            "Coefficient is not identifiable and was fixed to zero"
        );
    }

    /// Log the outcome of a fit
    pub fn log_fit_summary(
        dataset: &str,
        attempts: usize,
        mean_abs_error_s: f64,
        mean_abs_pct_error: Option<f64>,
        constraint_active: bool,
    ) {
        info!(
            dataset.name = %dataset,
            fit.attempts = attempts,
            fit.mae_s = mean_abs_error_s,
            fit.mape = mean_abs_pct_error.unwrap_or(f64::NAN),
            fit.constraint_active = constraint_active,
            "Oxygen-cost model fitted"
        );
    }

    /// Log the score of one candidate parameter set
    pub fn log_candidate_score(dataset: &str, candidate: &str, rank: usize, combined: Option<f64>) {
        info!(
            dataset.name = %dataset,
            candidate.name = %candidate,
            candidate.rank = rank,
            candidate.combined = combined.unwrap_or(f64::NAN),
            "Candidate scored"
        );
    }

    /// Log a fit that could not be produced
    pub fn log_fit_failure(dataset: &str, error: &dyn std::fmt::Display) {
        warn!(
            dataset.name = %dataset,
            error = %error,
            "Dataset could not be fitted"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_logging_config_from_env() {
        env::set_var("LOG_FORMAT", "json");
        env::set_var("ENVIRONMENT", "production");
        env::set_var("SERVICE_NAME", "test-service");

        let config = LoggingConfig::from_env();

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.environment, "production");
        assert_eq!(config.service_name, "test-service");
        assert!(config.include_location);

        env::remove_var("LOG_FORMAT");
        env::remove_var("ENVIRONMENT");
        env::remove_var("SERVICE_NAME");
    }

    #[test]
    fn test_verbose_overrides_rust_log() {
        env::set_var("RUST_LOG", "warn");

        let config = LoggingConfig::from_env();
        assert_eq!(config.level, "warn");
        assert_eq!(config.verbose().level, "debug");

        env::remove_var("RUST_LOG");
        assert_eq!(LoggingConfig::from_env().level, "info");
    }

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::default();

        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.environment, "development");
        assert_eq!(config.service_name, "apnea-o2-model");
        assert!(!config.include_location);
        assert_eq!(config.verbose().level, "debug");
    }
}
