use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "FileClassify";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_OLLAMA_URL: &str = "FILECLASSIFY_OLLAMA_URL";
pub const ENV_MODEL: &str = "FILECLASSIFY_MODEL";
pub const ENV_OCR_MODEL: &str = "FILECLASSIFY_OCR_MODEL";

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine home directory")]
    NoHomeDir,

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Get the application data directory
/// ~/FileClassify/ on all platforms
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(APP_NAME))
}

/// Default config file location (~/FileClassify/config.json)
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(app_data_dir()?.join(CONFIG_FILE_NAME))
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "fileclassify=info,warn"
}

/// Runtime configuration for the extraction and classification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Local Ollama endpoint.
    pub ollama_url: String,
    /// Model used for classification (`extract_json` / `classify`).
    pub model: String,
    /// Vision model used for scanned-PDF OCR. None disables OCR escalation.
    pub ocr_model: Option<String>,
    /// HTTP request timeout for model calls.
    pub timeout_secs: u64,
    /// Context window passed to the backend as `num_ctx`.
    pub context_size: u32,
    /// Characters of document text sent to the model per file.
    pub summary_max_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:3b".to_string(),
            ocr_model: None,
            timeout_secs: 300,
            context_size: 2048,
            summary_max_length: 500,
        }
    }
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the default config file, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&config_file_path()?)
    }

    /// Load `path`, then apply environment overrides.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, |key| std::env::var(key).ok())
    }

    fn load_with_overrides<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(lookup);
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_OLLAMA_URL).filter(|v| !v.trim().is_empty()) {
            self.ollama_url = url.trim().to_string();
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        if let Some(ocr) = lookup(ENV_OCR_MODEL).filter(|v| !v.trim().is_empty()) {
            self.ocr_model = Some(ocr.trim().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir().unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("FileClassify"));
    }

    #[test]
    fn config_file_under_app_data() {
        let file = config_file_path().unwrap();
        assert!(file.starts_with(app_data_dir().unwrap()));
        assert!(file.ends_with("config.json"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.summary_max_length, 500);
        assert_eq!(config.context_size, 2048);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model": "llama3.1:8b", "ocr_model": "llava"}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "llama3.1:8b");
        assert_eq!(config.ocr_model.as_deref(), Some("llava"));
        assert_eq!(config.ollama_url, "http://localhost:11434");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn overrides_replace_values_and_ignore_blanks() {
        let env: HashMap<&str, &str> = [
            (ENV_OLLAMA_URL, "http://127.0.0.1:9999"),
            (ENV_MODEL, "   "),
            (ENV_OCR_MODEL, "llava:7b"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.ollama_url, "http://127.0.0.1:9999");
        assert_eq!(config.model, AppConfig::default().model);
        assert_eq!(config.ocr_model.as_deref(), Some("llava:7b"));
    }

    #[test]
    fn explicit_file_still_takes_environment_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, r#"{"model": "llama3.1:8b", "ollama_url": "http://gpu-box:11434"}"#).unwrap();

        let config = AppConfig::load_with_overrides(&path, |k| {
            (k == ENV_MODEL).then(|| "qwen2.5:7b".to_string())
        })
        .unwrap();

        assert_eq!(config.model, "qwen2.5:7b");
        assert_eq!(config.ollama_url, "http://gpu-box:11434");
    }

    #[test]
    fn app_name_is_fileclassify() {
        assert_eq!(APP_NAME, "FileClassify");
    }
}
