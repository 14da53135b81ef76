//! CLI configuration
//!
//! Optional TOML file; every field has a default so `caseflow run` works
//! with no config at all. CLI flags override file values.

use anyhow::{Context, Result};
use caseflow_pipeline::GateLimits;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_db_path() -> PathBuf {
    PathBuf::from("caseflow.db")
}

fn default_max_retries() -> u32 {
    3
}

/// Top-level configuration for the batch entry point
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Database file location
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Retry cap for failed items
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-service concurrency limits
    #[serde(default)]
    pub gates: GateLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            max_retries: default_max_retries(),
            gates: GateLimits::default(),
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/caseflow.toml")).unwrap();
        assert_eq!(config.db_path, PathBuf::from("caseflow.db"));
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/var/lib/caseflow/cases.db"

            [gates]
            analysis = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/caseflow/cases.db"));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.gates.analysis, 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<Config, _> = toml::from_str("db_pathh = \"typo.db\"");
        assert!(result.is_err());
    }
}
