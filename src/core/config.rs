//! Configuration management with layered hierarchy

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::policy::{Policy, PolicyError, PolicyKind};
use crate::core::Project;

/// Algorithm settings used when a distribution does not name its own policy
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AlgorithmConfig {
    /// Policy name (random, less, share_less, share_random)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    /// Share rounds before the fallback policy (0 = as many as possible)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    /// Fixed seed for reproducible random runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// kitshare configuration with layered hierarchy
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub algorithm: AlgorithmConfig,

    /// Log level for the rotating log files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,
}

/// Errors raised while reading configuration files
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {message}")]
    #[diagnostic(code(kitshare::config::read))]
    Read { path: PathBuf, message: String },

    #[error("invalid config file {path:?}: {message}")]
    #[diagnostic(code(kitshare::config::parse), help("check the YAML syntax and key types"))]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: '{value}'")]
    #[diagnostic(code(kitshare::config::env))]
    Env { key: &'static str, value: String },
}

/// Valid configuration keys with descriptions
pub const VALID_KEYS: &[(&str, &str)] = &[
    (
        "algorithm.policy",
        "Distribution policy (random, less, share_less, share_random)",
    ),
    (
        "algorithm.count",
        "Share rounds before the fallback policy (0 = as many as possible)",
    ),
    ("algorithm.seed", "Fixed random seed for reproducible runs"),
    ("log_level", "Log level (error, warn, info, debug, trace)"),
    (
        "default_format",
        "Default output format (yaml, json, tsv, etc.)",
    ),
];

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Result<Self, ConfigError> {
        // 1. Built-in defaults (already in Default impl)
        let mut config = Config::default();

        // 2. Global user config (~/.config/kitshare/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::load_file(&global_path)? {
                config.merge(global);
            }
        }

        // 3. Project config (.kitshare/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::load_file(&project.config_path())? {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        config.apply_env(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Read one config file; a missing file yields `None`
    pub fn load_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&contents)
            .map(Some)
            .map_err(|message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            })
    }

    /// Parse configuration from YAML text (an empty document is the default config)
    pub fn from_yaml(contents: &str) -> Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: serde_yml::Value = serde_yml::from_str(contents).map_err(|e| e.to_string())?;
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yml::from_value(value).map_err(|e| e.to_string())
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "kitshare")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.algorithm.policy.is_some() {
            self.algorithm.policy = other.algorithm.policy;
        }
        if other.algorithm.count.is_some() {
            self.algorithm.count = other.algorithm.count;
        }
        if other.algorithm.seed.is_some() {
            self.algorithm.seed = other.algorithm.seed;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }

    /// Apply KITSHARE_* overrides from the given lookup
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(policy) = lookup("KITSHARE_POLICY") {
            self.algorithm.policy = Some(policy);
        }
        if let Some(count) = lookup("KITSHARE_COUNT") {
            let parsed = count.trim().parse::<i64>().map_err(|_| ConfigError::Env {
                key: "KITSHARE_COUNT",
                value: count.clone(),
            })?;
            self.algorithm.count = Some(parsed);
        }
        if let Some(seed) = lookup("KITSHARE_SEED") {
            let parsed = seed.trim().parse::<u64>().map_err(|_| ConfigError::Env {
                key: "KITSHARE_SEED",
                value: seed.clone(),
            })?;
            self.algorithm.seed = Some(parsed);
        }
        if let Some(level) = lookup("KITSHARE_LOG") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// The configured default policy
    ///
    /// Unknown names and negative counts are errors, never silently defaulted.
    pub fn policy(&self) -> Result<Policy, PolicyError> {
        let kind = match &self.algorithm.policy {
            Some(name) => name.parse()?,
            None => PolicyKind::default(),
        };
        Policy::new(kind, self.algorithm.count.unwrap_or(0))
    }

    /// The configured log level, defaulting to `info`
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Look up a value by dotted key for display
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "algorithm.policy" => self.algorithm.policy.clone(),
            "algorithm.count" => self.algorithm.count.map(|c| c.to_string()),
            "algorithm.seed" => self.algorithm.seed.map(|s| s.to_string()),
            "log_level" => self.log_level.clone(),
            "default_format" => self.default_format.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let policy = config.policy().unwrap();
        assert_eq!(policy.kind, PolicyKind::ShareLess);
        assert_eq!(policy.rounds, 0);
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml("algorithm:\n  policy: less\n  count: 2\n  seed: 9\n").unwrap();
        assert_eq!(config.algorithm.policy.as_deref(), Some("less"));
        assert_eq!(config.algorithm.count, Some(2));
        assert_eq!(config.algorithm.seed, Some(9));
        assert_eq!(config.policy().unwrap().kind, PolicyKind::Less);
    }

    #[test]
    fn test_comment_only_file_is_default() {
        let config = Config::from_yaml("# nothing here\n").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Config::from_yaml("algorithm:\n  policy: random\n  count: 3\n").unwrap();
        let other = Config::from_yaml("algorithm:\n  policy: less\n").unwrap();
        base.merge(other);
        assert_eq!(base.algorithm.policy.as_deref(), Some("less"));
        assert_eq!(base.algorithm.count, Some(3));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [("KITSHARE_POLICY", "share_random"), ("KITSHARE_COUNT", "1")]
            .into_iter()
            .collect();
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        let policy = config.policy().unwrap();
        assert_eq!(policy.kind, PolicyKind::ShareRandom);
        assert_eq!(policy.rounds, 1);
    }

    #[test]
    fn test_env_rejects_bad_count() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "KITSHARE_COUNT").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "KITSHARE_COUNT", .. }));
    }

    #[test]
    fn test_unknown_policy_is_an_error() {
        let config = Config::from_yaml("algorithm:\n  policy: fairest\n").unwrap();
        assert!(matches!(config.policy(), Err(PolicyError::UnknownPolicy(_))));
    }

    #[test]
    fn test_negative_count_is_an_error() {
        let config = Config::from_yaml("algorithm:\n  count: -2\n").unwrap();
        assert!(matches!(config.policy(), Err(PolicyError::NegativeCount(-2))));
    }
}
