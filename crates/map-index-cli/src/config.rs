//! Layered CLI configuration
//!
//! Defaults, then the optional JSON file, then `MAP_INDEX_*` environment variables, then
//! command-line flags. Each layer only overrides what it sets.

use anyhow::Context;
use clap::ValueEnum;
use map_index_lib::IndexConfig;
use map_index_lib::search::SearchConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cli::{self, StrategyArg};

/// Type tags registered when the configuration names none
pub const DEFAULT_TYPES: &[(&str, &str)] = &[
    ("amenity", "cafe"),
    ("amenity", "restaurant"),
    ("amenity", "pharmacy"),
    ("amenity", "fuel"),
    ("tourism", "hotel"),
    ("tourism", "museum"),
    ("shop", "supermarket"),
    ("highway", "primary"),
    ("highway", "residential"),
    ("natural", "water"),
    ("place", "city"),
    ("place", "town"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub index: IndexConfig,
    pub search: SearchConfig,
    /// Default locale of search result names
    pub locale: String,
    /// `[key, value]` type tags known to the classificator
    pub types: Vec<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index: IndexConfig::default(),
            search: SearchConfig::default(),
            locale: "en".to_string(),
            types: DEFAULT_TYPES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the config file (if any) and the process environment
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Override settings from `MAP_INDEX_*` variables looked up through `get`
    ///
    /// Values that fail to parse are ignored with a warning.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            get: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = get(key)?;
            let value = raw.parse().ok();
            if value.is_none() {
                tracing::warn!("Ignoring {key}={raw:?}: not a valid value");
            }
            value
        }

        if let Some(raw) = get("MAP_INDEX_STRATEGY") {
            match StrategyArg::from_str(&raw, true) {
                Ok(strategy) => self.index.reader_strategy = strategy.into(),
                Err(_) => tracing::warn!("Ignoring MAP_INDEX_STRATEGY={raw:?}"),
            }
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_STRICT_TYPES") {
            self.index.strict_types = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_MAX_DEPTH") {
            self.index.max_depth = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_MAX_FEATURES_PER_NODE") {
            self.index.max_features_per_node = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_CACHE_CAPACITY") {
            self.index.query_cache_capacity = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_MIN_RESULTS") {
            self.search.min_viewport_results = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_MIN_RELEVANCE") {
            self.search.min_relevance = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_FALLBACK") {
            self.search.everywhere_fallback = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_BATCH_SIZE") {
            self.search.batch_size = v;
        }
        if let Some(v) = parsed(&get, "MAP_INDEX_MAX_RESULTS") {
            self.search.max_results = v;
        }
        if let Some(v) = get("MAP_INDEX_LOCALE") {
            self.locale = v;
        }
    }

    /// Apply the global flags of the command line
    pub fn apply_cli(&mut self, cli: &cli::Cli) {
        if let Some(strategy) = cli.strategy {
            self.index.reader_strategy = strategy.into();
        }
        if cli.strict_types {
            self.index.strict_types = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use map_index_lib::ReaderStrategy;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.locale, "en");
        assert_eq!(config.search.min_viewport_results, 1);
        assert!(config.types.contains(&("amenity".to_string(), "cafe".to_string())));
    }

    #[test]
    fn test_file_layer_is_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "index": { "reader_strategy": "file-backed" }, "search": { "batch_size": 4 } }"#,
        )
        .unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.index.reader_strategy, ReaderStrategy::FileBacked);
        assert_eq!(config.search.batch_size, 4);
        // Untouched fields keep their defaults
        assert_eq!(config.search.max_results, SearchConfig::default().max_results);
        assert_eq!(config.locale, "en");
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ nope").unwrap();

        let err = AppConfig::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
        assert!(AppConfig::load(Some(dir.path().join("missing.json").as_path())).is_err());
    }

    #[test]
    fn test_env_layer() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("MAP_INDEX_STRATEGY", "FILE"),
            ("MAP_INDEX_MAX_DEPTH", "8"),
            ("MAP_INDEX_MIN_RESULTS", "3"),
            ("MAP_INDEX_FALLBACK", "false"),
            ("MAP_INDEX_LOCALE", "de"),
            ("MAP_INDEX_BATCH_SIZE", "lots"),
        ]));

        assert_eq!(config.index.reader_strategy, ReaderStrategy::FileBacked);
        assert_eq!(config.index.max_depth, 8);
        assert_eq!(config.search.min_viewport_results, 3);
        assert!(!config.search.everywhere_fallback);
        assert_eq!(config.locale, "de");
        // Unparseable values are ignored
        assert_eq!(config.search.batch_size, SearchConfig::default().batch_size);
    }

    #[test]
    fn test_flags_override_env() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[("MAP_INDEX_STRATEGY", "file")]));

        let cli =
            cli::Cli::try_parse_from(["map-index", "--strategy", "buffered", "info", "A.map"])
                .unwrap();
        config.apply_cli(&cli);
        assert_eq!(config.index.reader_strategy, ReaderStrategy::Buffered);
    }
}
