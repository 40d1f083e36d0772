use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use serde::Deserialize;

use crate::clean::{CleanOptions, DEFAULT_SENTINEL, DEFAULT_THRESHOLD};
use crate::error::{AnalysisError, Result};
use crate::join::JoinPolicy;

pub const DATA_DIR_ENV: &str = "F1_DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_ENCODING: &str = "latin1";
pub const DEFAULT_DRIVER_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub data_dir: PathBuf,
    pub encoding: String,
    pub sentinel: String,
    pub missing_threshold: f64,
    pub join_policy: JoinPolicy,
    pub replay_driver_limit: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            encoding: DEFAULT_ENCODING.to_string(),
            sentinel: DEFAULT_SENTINEL.to_string(),
            missing_threshold: DEFAULT_THRESHOLD,
            join_policy: JoinPolicy::default(),
            replay_driver_limit: Some(DEFAULT_DRIVER_LIMIT),
        }
    }
}

impl AnalysisConfig {
    /// Reads `path` when given, applies env overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    AnalysisError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AnalysisError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(AnalysisError::Config(format!(
                "missing_threshold must lie in [0, 1], got {}",
                self.missing_threshold
            )));
        }
        if self.sentinel.is_empty() {
            return Err(AnalysisError::Config("sentinel must not be empty".into()));
        }
        if self.replay_driver_limit == Some(0) {
            return Err(AnalysisError::Config(
                "replay_driver_limit must be at least 1".into(),
            ));
        }
        self.resolve_encoding()?;
        Ok(())
    }

    pub fn resolve_encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.encoding.as_bytes())
            .ok_or_else(|| AnalysisError::Config(format!("unknown encoding '{}'", self.encoding)))
    }

    pub fn clean_options(&self) -> CleanOptions {
        CleanOptions::new(self.sentinel.clone(), self.missing_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dataset_conventions() {
        let config = AnalysisConfig::default();
        assert_eq!(config.sentinel, "\\N");
        assert_eq!(config.missing_threshold, 0.05);
        assert_eq!(config.join_policy, JoinPolicy::FailFast);
        // encoding_rs maps the latin-1 label onto windows-1252
        assert_eq!(config.resolve_encoding().unwrap(), encoding_rs::WINDOWS_1252);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AnalysisConfig::from_toml(
            "data_dir = \"/tmp/f1\"\njoin_policy = \"drop_unmatched\"\n",
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/f1"));
        assert_eq!(config.join_policy, JoinPolicy::DropUnmatched);
        assert_eq!(config.replay_driver_limit, Some(DEFAULT_DRIVER_LIMIT));
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let err = AnalysisConfig::from_toml("missing_threshold = 1.5").unwrap_err();
        assert!(matches!(err, AnalysisError::Config(_)));
    }

    #[test]
    fn rejects_unknown_encoding() {
        let err = AnalysisConfig::from_toml("encoding = \"klingon\"").unwrap_err();
        assert!(err.to_string().contains("klingon"));
    }
}
