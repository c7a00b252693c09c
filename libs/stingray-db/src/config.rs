//! Configuration for the data access layer

use anyhow::Context;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Data access layer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Maximum number of fan-out queries in flight per depth
    #[serde(default = "default_fan_out_concurrency")]
    pub fan_out_concurrency: usize,

    /// Include soft-deleted rows in searches
    #[serde(default)]
    pub show_deleted: bool,

    /// Table metadata produced by the generator (JSON or YAML)
    #[serde(default)]
    pub tables_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fan_out_concurrency: default_fan_out_concurrency(),
            show_deleted: false,
            tables_file: None,
        }
    }
}

impl Config {
    /// Read a YAML file, then let `STINGRAY_*` environment variables override it
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("STINGRAY_"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }
}

fn default_fan_out_concurrency() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.fan_out_concurrency, 8);
        assert!(!cfg.show_deleted);
        assert!(cfg.tables_file.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("show_deleted: true\n").unwrap();
        assert!(cfg.show_deleted);
        assert_eq!(cfg.fan_out_concurrency, 8);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_yaml::from_str::<Config>("fan_out: 3\n").is_err());
    }
}
