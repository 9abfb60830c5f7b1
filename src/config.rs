// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Configuration management for the apnea oxygen model

pub mod model_config;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{defaults, env_config};
use crate::models::Discipline;

pub use model_config::{
    BandSettings, DescentSettings, FitSettings, IntensitySettings, ModelConfig, ScoringSettings,
};

/// Top-level configuration: data locations plus model parameters
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    #[serde(flatten)]
    pub model: ModelConfig,
}

/// Where race sheets, the STA roster and the output live
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    /// Roster file, relative to `root` unless absolute
    pub sta_file: PathBuf,
    pub output: PathBuf,
    pub datasets: Vec<DatasetSource>,
}

/// One race sheet to fit
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DatasetSource {
    pub name: String,
    pub discipline: Discipline,
    /// Sheet file, relative to the data root unless absolute
    pub file: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(defaults::DATA_ROOT),
            sta_file: PathBuf::from(defaults::STA_FILE),
            output: PathBuf::from(defaults::OUTPUT_FILE),
            datasets: vec![
                DatasetSource {
                    name: "DNF".to_string(),
                    discipline: Discipline::Dnf,
                    file: PathBuf::from("DNF.csv"),
                },
                DatasetSource {
                    name: "DYNB".to_string(),
                    discipline: Discipline::Dynb,
                    file: PathBuf::from("DYNB.csv"),
                },
            ],
        }
    }
}

impl DataConfig {
    pub fn sta_path(&self) -> PathBuf {
        self.root.join(&self.sta_file)
    }

    pub fn dataset_path(&self, source: &DatasetSource) -> PathBuf {
        self.root.join(&source.file)
    }

    /// Find a configured dataset by name, case-insensitively
    pub fn dataset(&self, name: &str) -> Option<&DatasetSource> {
        self.datasets
            .iter()
            .find(|source| source.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Config {
    /// Load configuration
    ///
    /// Lookup order: explicit path, `apnea_model.toml` in the working
    /// directory, `apnea-o2-model/config.toml` in the user config directory,
    /// then built-in defaults. Environment variables (including a `.env`
    /// file) override the data paths afterwards.
    pub fn load(path: Option<String>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match Self::resolve_path(path) {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn resolve_path(path: Option<String>) -> Option<String> {
        if path.is_some() {
            return path;
        }
        if Path::new(defaults::CONFIG_FILE).exists() {
            return Some(defaults::CONFIG_FILE.to_string());
        }
        dirs::config_dir()
            .map(|dir| dir.join(defaults::CONFIG_DIR).join("config.toml"))
            .filter(|candidate| candidate.exists())
            .map(|candidate| candidate.to_string_lossy().to_string())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        debug!(config.path = %path, "Loaded configuration file");
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            env_config::data_root(),
            env_config::sta_file(),
            env_config::output_path(),
        );
    }

    /// Replace data paths with any provided values
    pub fn apply_overrides(
        &mut self,
        data_root: Option<String>,
        sta_file: Option<String>,
        output: Option<String>,
    ) {
        if let Some(root) = data_root {
            self.data.root = PathBuf::from(root);
        }
        if let Some(sta) = sta_file {
            self.data.sta_file = PathBuf::from(sta);
        }
        if let Some(output) = output {
            self.data.output = PathBuf::from(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.data.datasets.len(), 2);
        assert_eq!(config.data.sta_path(), PathBuf::from("data/aida_greece_2025/STA_PB.csv"));
        assert_eq!(config.data.dataset("dynb").map(|d| d.discipline), Some(Discipline::Dynb));
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_config_file_loading() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(
            temp_file,
            r#"
[data]
root = "/srv/apnea"
sta_file = "roster.csv"

[[data.datasets]]
name = "Pool DNF"
discipline = "DNF"
file = "pool_dnf.csv"

[intensity]
split_distance_m = 25.0

[fit]
min_distance_m = 50.0

[manual]
static_o2_rate = 1.2
"#
        )?;

        let config = Config::load(Some(temp_file.path().to_string_lossy().to_string()))?;

        assert_eq!(config.data.datasets.len(), 1);
        let source = config.data.dataset("pool dnf").expect("dataset configured");
        assert_eq!(source.discipline, Discipline::Dnf);
        assert_eq!(config.data.dataset_path(source), PathBuf::from("/srv/apnea/pool_dnf.csv"));
        assert_eq!(config.model.intensity.split_distance_m, 25.0);
        assert_eq!(config.model.fit.min_distance_m, 50.0);
        assert_eq!(config.model.manual.get("static_o2_rate"), Some(&1.2));
        assert_eq!(config.model.bands.min_points, 5);
        Ok(())
    }

    #[test]
    fn test_config_load_invalid_toml() -> Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        writeln!(temp_file, "this is not valid toml [[[")?;

        let result = Config::load_from_file(&temp_file.path().to_string_lossy());
        assert!(result.is_err());
        assert!(result
            .err()
            .map(|e| e.to_string().contains("Failed to parse config file"))
            .unwrap_or(false));
        Ok(())
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load(Some("/definitely/not/here/apnea.toml".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_path_overrides() {
        let mut config = Config::default();
        config.apply_overrides(Some("/data".to_string()), None, Some("out.json".to_string()));

        assert_eq!(config.data.root, PathBuf::from("/data"));
        assert_eq!(config.data.sta_file, PathBuf::from("STA_PB.csv"));
        assert_eq!(config.data.output, PathBuf::from("out.json"));
    }
}
