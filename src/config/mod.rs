//! Configuration for the postprocessing core
//!
//! The configuration is read once and shared read-only by every worker.

mod crawl;
mod logging;

pub use crawl::{AssetsConfig, CrawlConfig, SeenCheckConfig, TrapConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name written by `archivist init`
pub const DEFAULT_CONFIG_FILE: &str = "archivist.toml";

/// Process-wide configuration snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Hop, redirect, scope and pool settings
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Asset capture and extraction settings
    #[serde(default)]
    pub assets: AssetsConfig,
    /// Trap detection thresholds
    #[serde(default)]
    pub traps: TrapConfig,
    /// Seen-check store
    #[serde(default)]
    pub seencheck: SeenCheckConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.crawl.channel_capacity == 0 {
            errors.push("channel_capacity must be positive".to_string());
        }
        if self
            .crawl
            .domains_crawl
            .iter()
            .any(|d| d.trim().is_empty())
        {
            errors.push("domains_crawl entries must not be empty".to_string());
        }

        if self.traps.max_segment_repetition > 0 && self.traps.max_segment_repetition_threshold == 0 {
            errors.push(
                "max_segment_repetition_threshold must be positive when trap detection is enabled"
                    .to_string(),
            );
        }

        for (name, list) in [
            ("allowed_file_types", &self.assets.allowed_file_types),
            ("disallowed_file_types", &self.assets.disallowed_file_types),
        ] {
            for ext in list {
                let ext = ext.trim();
                if ext.is_empty() {
                    errors.push(format!("{} entries must not be empty", name));
                } else if ext.starts_with('.') {
                    errors.push(format!("{} entry '{}' must not start with a dot", name, ext));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(valid_config().validate().is_ok(), "default config should be valid");
    }

    #[test]
    fn validate_rejects_zero_channel_capacity() {
        let mut cfg = valid_config();
        cfg.crawl.channel_capacity = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("channel_capacity must be positive"));
    }

    #[test]
    fn validate_rejects_dotted_file_types() {
        let mut cfg = valid_config();
        cfg.assets.disallowed_file_types = vec![".mp4".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must not start with a dot"));
    }

    #[test]
    fn validate_rejects_zero_threshold_with_traps_enabled() {
        let mut cfg = valid_config();
        cfg.traps.max_segment_repetition_threshold = 0;
        assert!(cfg.validate().is_err());

        cfg.traps.max_segment_repetition = 0;
        assert!(cfg.validate().is_ok(), "threshold is irrelevant when traps are off");
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.crawl.channel_capacity = 0;
        cfg.crawl.domains_crawl = vec!["  ".to_string()];
        cfg.assets.allowed_file_types = vec![String::new()];
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("channel_capacity must be positive"));
        assert!(msg.contains("domains_crawl entries must not be empty"));
        assert!(msg.contains("allowed_file_types entries must not be empty"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [crawl]
            max_hops = 2

            [assets]
            max_assets = 10
            "#,
        )
        .unwrap();
        assert_eq!(cfg.crawl.max_hops, 2);
        assert_eq!(cfg.crawl.max_redirect, 20);
        assert_eq!(cfg.assets.max_assets, 10);
        assert_eq!(cfg.traps.max_segment_repetition, 3);
    }

    #[test]
    fn load_round_trips_written_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        let mut cfg = valid_config();
        cfg.crawl.domains_crawl = vec!["example.com".to_string()];
        std::fs::write(&path, cfg.to_toml().unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.crawl.domains_crawl, vec!["example.com".to_string()]);
    }
}
