//! Settings file

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_superfat: f64,
    pub default_water_percent: f64,
    pub describer: DescriberSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_superfat: 5.0,
            default_water_percent: 33.0,
            describer: DescriberSettings::default(),
        }
    }
}

/// Text-generation service used for recipe descriptions
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DescriberSettings {
    pub enabled: bool,
    pub model: String,
    pub endpoint: String,
    pub api_key_env: String,
    pub language: String,
    pub top_oils: usize,
    pub timeout_secs: u64,
}

impl Default for DescriberSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            language: "English".to_string(),
            top_oils: 3,
            timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when no file is given or it doesn't exist
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.default_superfat, 5.0);
        assert_eq!(settings.describer.top_oils, 3);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soap.toml");
        std::fs::write(
            &path,
            "default_water_percent = 38.0\n\n[describer]\nlanguage = \"Korean\"\nenabled = false\n",
        )
        .unwrap();

        let settings = Settings::load(Some(path.as_path())).unwrap();
        assert_eq!(settings.default_water_percent, 38.0);
        assert_eq!(settings.default_superfat, 5.0);
        assert_eq!(settings.describer.language, "Korean");
        assert!(!settings.describer.enabled);
        assert_eq!(settings.describer.model, "gemini-2.5-flash");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("soap.toml");
        std::fs::write(&path, "default_superfat = \"lots\"").unwrap();

        assert!(matches!(
            Settings::load(Some(path.as_path())),
            Err(ConfigError::Parse { .. })
        ));
    }
}
