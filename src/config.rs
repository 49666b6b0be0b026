//! Engine configuration.
//!
//! Loaded from an optional TOML file and overridden by environment variables
//! prefixed with `NODE_INDEXER__`, using `__` between nested keys
//! (`NODE_INDEXER__INDEXER__MAX_TREE_DEPTH=64`).

use crate::dimensions::{ConfiguredPresetSource, DimensionAxis};
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "NODE_INDEXER";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    pub indexer: IndexerSettings,
    pub index: IndexSettings,
    pub logging: LoggingSettings,
    /// Content dimensions and their presets, in axis order.
    pub dimensions: Vec<DimensionAxis>,
    /// TOML file with `[[node_types]]` definitions.
    pub node_types_path: Option<PathBuf>,
}

/// Behaviour of the projection engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// Ancestors visited before a tree is considered malformed.
    pub max_tree_depth: usize,
    /// Dimension combinations indexed at the same time during a re-index.
    pub reindex_concurrency: usize,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            max_tree_depth: 256,
            reindex_concurrency: 4,
        }
    }
}

/// Index storage location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub database_url: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://node-index.db".into(),
        }
    }
}

/// Log output.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl IndexerConfig {
    /// Load configuration from `path` (if given) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        Self::finish(builder)
    }

    /// Parse configuration from TOML text, ignoring the environment.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()
            .and_then(|built| built.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.indexer.max_tree_depth == 0 {
            return Err(ConfigError::Invalid("indexer.max_tree_depth must be positive".into()).into());
        }
        if self.indexer.reindex_concurrency == 0 {
            return Err(
                ConfigError::Invalid("indexer.reindex_concurrency must be positive".into()).into(),
            );
        }
        if self.index.database_url.is_empty() {
            return Err(ConfigError::Invalid("index.database_url is empty".into()).into());
        }
        Ok(())
    }

    /// Dimension preset source for the configured axes.
    pub fn preset_source(&self) -> Result<ConfiguredPresetSource> {
        ConfiguredPresetSource::new(self.dimensions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionPresetSource;
    use indoc::indoc;

    #[test]
    fn test_parse_full_config() {
        let config = IndexerConfig::from_toml_str(indoc! {r#"
            node_types_path = "config/node_types.toml"

            [indexer]
            max_tree_depth = 32
            reindex_concurrency = 2

            [index]
            database_url = "sqlite::memory:"

            [logging]
            filter = "node_indexer=debug"

            [[dimensions]]
            name = "language"
            default_preset = "en"

            [[dimensions.presets]]
            identifier = "en"
            values = ["en"]

            [[dimensions.presets]]
            identifier = "de_CH"
            values = ["de_CH", "de"]
        "#})
        .unwrap();

        assert_eq!(config.indexer.max_tree_depth, 32);
        assert_eq!(config.indexer.reindex_concurrency, 2);
        assert_eq!(config.index.database_url, "sqlite::memory:");
        assert_eq!(config.logging.filter, "node_indexer=debug");
        assert_eq!(
            config.node_types_path.as_deref(),
            Some(Path::new("config/node_types.toml"))
        );

        let axes = config.preset_source().unwrap().all_presets();
        assert_eq!(axes.len(), 1);
        assert_eq!(axes[0].presets[1].values, vec!["de_CH", "de"]);
    }

    #[test]
    fn test_defaults_apply() {
        let config = IndexerConfig::from_toml_str("").unwrap();
        assert_eq!(config.indexer.max_tree_depth, 256);
        assert_eq!(config.indexer.reindex_concurrency, 4);
        assert_eq!(config.index.database_url, "sqlite://node-index.db");
        assert!(config.dimensions.is_empty());
        assert!(config.node_types_path.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = IndexerConfig::from_toml_str(indoc! {r#"
            [indexer]
            max_tree_depth = 0
        "#});
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.toml");
        std::fs::write(&path, "[indexer]\nreindex_concurrency = 8\n").unwrap();

        let config = IndexerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.indexer.reindex_concurrency, 8);

        assert!(IndexerConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
