use crate::auth::IDENTITY_TOOLKIT_URL;
use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "PAWSPECTIVE_CONFIG";
pub const API_URL_VAR: &str = "PAWSPECTIVE_API_URL";
pub const DATA_DIR_VAR: &str = "PAWSPECTIVE_DATA_DIR";

const APP_DIR_NAME: &str = "pawspective";
const DATABASE_FILE: &str = "pawspective.sqlite";
const SESSION_FILE: &str = "session.json";

// --- Application settings ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub data_dir: PathBuf,
    pub identity_base_url: String,
    pub identity_api_key_ref: Option<String>, // "env:VAR_NAME" or "keyring"
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://10.0.2.2:5000/".to_string(),
            request_timeout_secs: 30,
            data_dir: default_data_dir(),
            identity_base_url: IDENTITY_TOOLKIT_URL.to_string(),
            identity_api_key_ref: Some("env:PAWSPECTIVE_IDENTITY_API_KEY".to_string()),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file named by `PAWSPECTIVE_CONFIG` (if set), then
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        log::info!("Loading configuration from {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_VAR).filter(|v| !v.trim().is_empty()) {
            log::debug!("API base URL overridden by {}", API_URL_VAR);
            self.api_base_url = url;
        }
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|v| !v.trim().is_empty()) {
            log::debug!("Data directory overridden by {}", DATA_DIR_VAR);
            self.data_dir = PathBuf::from(dir);
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// --- API Key Retrieval ---

const KEYRING_SERVICE: &str = "pawspective";
const KEYRING_USER: &str = "identity_api_key";

/// Resolves the identity provider API key from its reference: `env:VAR` reads an
/// environment variable, `keyring` reads the OS keyring.
pub fn get_api_key(key_ref: Option<&str>) -> Result<String> {
    match key_ref {
        Some(ref_str) if ref_str.starts_with("env:") => {
            let env_var_name = ref_str.trim_start_matches("env:");
            log::debug!("Retrieving API key from environment variable: {}", env_var_name);
            std::env::var(env_var_name).context(format!(
                "Failed to get API key from environment variable '{}'",
                env_var_name
            ))
        }
        Some("keyring") => {
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER).context("Failed to create keyring entry")?;
            log::debug!("Retrieving API key from keyring for service: {}", KEYRING_SERVICE);
            entry
                .get_password()
                .context("Failed to get identity API key from keyring. Please store it first.")
        }
        Some(other) => Err(anyhow::anyhow!("Unsupported api_key_ref format: {}", other)),
        None => Err(anyhow::anyhow!("Identity API key reference not set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_emulator_host() {
        let config = AppConfig::default();
        assert_eq!(config.api_base_url, "http://10.0.2.2:5000/");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.database_path().ends_with("pawspective/pawspective.sqlite"));
    }

    #[test]
    fn file_values_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "api_base_url": "https://api.example.org/" }"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.org/");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn overrides_replace_url_and_data_dir() {
        let mut config = AppConfig::default();
        config.apply_overrides(|name| match name {
            API_URL_VAR => Some("http://localhost:8080/".to_string()),
            DATA_DIR_VAR => Some("/tmp/paws".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "http://localhost:8080/");
        assert_eq!(config.session_path(), PathBuf::from("/tmp/paws/session.json"));
    }

    #[test]
    fn env_key_ref_reads_variable() {
        assert!(get_api_key(Some("env:PAWSPECTIVE_TEST_KEY_THAT_IS_NOT_SET")).is_err());
        assert!(get_api_key(Some("vault:x")).is_err());
        assert!(get_api_key(None).is_err());
    }
}
