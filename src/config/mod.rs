// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Plantify

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{PlantifyError, Result};

/// Placeholder in the camera command replaced with the capture target path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Remote model endpoint settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Prompt texts sent with every analysis
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Camera and gallery settings
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Local history storage
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_system_prompt")]
    pub system: String,
    #[serde(default = "default_user_prompt")]
    pub user: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionConfig {
    /// JPEG compression factor applied to acquired images (0.0 - 1.0)
    #[serde(default = "default_quality")]
    pub quality: f32,
    /// External command that writes a photo to `{output}`
    #[serde(default = "default_camera_command")]
    pub camera_command: Vec<String>,
    #[serde(default = "default_gallery_dir")]
    pub gallery_dir: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default)]
    pub assume_permission_granted: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    #[serde(default = "default_history_key")]
    pub history_key: String,
}

// Default value functions
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-4o".to_string() }
fn default_max_tokens() -> u32 { 300 }
fn default_timeout() -> u64 { 30 }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_system_prompt() -> String { "Act as a plant expert.".to_string() }
fn default_quality() -> f32 { 0.7 }
fn default_gallery_dir() -> String { "~/Pictures".to_string() }
fn default_storage_dir() -> String { "~/.local/share/plantify".to_string() }
fn default_history_key() -> String { "analysisHistory".to_string() }

fn default_user_prompt() -> String {
    "Please analyze the plant in this photo and provide information about it.".to_string()
}

fn default_camera_command() -> Vec<String> {
    vec!["fswebcam", "--no-banner", OUTPUT_PLACEHOLDER]
        .into_iter().map(String::from).collect()
}

fn default_formats() -> Vec<String> {
    vec!["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"]
        .into_iter().map(String::from).collect()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
            user: default_user_prompt(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
            camera_command: default_camera_command(),
            gallery_dir: default_gallery_dir(),
            formats: default_formats(),
            assume_permission_granted: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            history_key: default_history_key(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| PlantifyError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PlantifyError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let q = self.acquisition.quality;
        if !(q > 0.0 && q <= 1.0) {
            return Err(PlantifyError::Config(format!(
                "acquisition.quality must be in (0, 1], got {}", q
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(PlantifyError::Config("api.timeout_secs must be positive".to_string()));
        }
        if self.api.max_tokens == 0 {
            return Err(PlantifyError::Config("api.max_tokens must be positive".to_string()));
        }
        if self.acquisition.camera_command.is_empty() {
            return Err(PlantifyError::Config("acquisition.camera_command is empty".to_string()));
        }
        if !self.acquisition.camera_command.iter().any(|a| a.contains(OUTPUT_PLACEHOLDER)) {
            return Err(PlantifyError::Config(format!(
                "acquisition.camera_command must contain {}", OUTPUT_PLACEHOLDER
            )));
        }
        Ok(())
    }

    pub fn gallery_dir(&self) -> PathBuf {
        expand_home(&self.acquisition.gallery_dir)
    }

    pub fn storage_dir(&self) -> PathBuf {
        expand_home(&self.storage.dir)
    }
}

/// Expand a leading `~` to `$HOME`
pub fn expand_home(raw: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (raw.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(raw),
    }
}

/// Bearer credential for the remote API
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredential(String);

impl ApiCredential {
    /// Wrap a key, treating blank values as absent
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Runtime environment first, then the key baked in at build time
    pub fn resolve(api: &ApiConfig) -> Option<Self> {
        std::env::var(&api.api_key_env)
            .ok()
            .and_then(Self::new)
            .or_else(|| option_env!("OPENAI_API_KEY").and_then(Self::new))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiCredential(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.model, "gpt-4o");
        assert_eq!(config.api.max_tokens, 300);
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.history_key, "analysisHistory");
        assert!((config.acquisition.quality - 0.7).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"api": {"model": "gpt-4o-mini"}}"#).unwrap();
        assert_eq!(config.api.model, "gpt-4o-mini");
        assert_eq!(config.api.base_url, "https://api.openai.com/v1");
        assert_eq!(config.prompts.system, "Act as a plant expert.");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plantify.json");

        let mut config = AppConfig::default();
        config.api.timeout_secs = 12;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.api.timeout_secs, 12);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(err, PlantifyError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.acquisition.quality = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.acquisition.camera_command = vec!["fswebcam".to_string()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credential_blank_is_absent() {
        assert!(ApiCredential::new("").is_none());
        assert!(ApiCredential::new("   ").is_none());
        assert_eq!(ApiCredential::new(" sk-test ").unwrap().expose(), "sk-test");
    }

    #[test]
    fn test_credential_from_named_env() {
        let api = ApiConfig {
            api_key_env: "PLANTIFY_TEST_CREDENTIAL_FROM_ENV".to_string(),
            ..ApiConfig::default()
        };
        std::env::set_var(&api.api_key_env, "sk-from-env");
        let credential = ApiCredential::resolve(&api).unwrap();
        std::env::remove_var(&api.api_key_env);
        assert_eq!(credential.expose(), "sk-from-env");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = ApiCredential::new("sk-secret").unwrap();
        assert!(!format!("{:?}", credential).contains("sk-secret"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/tmp/x"), PathBuf::from("/tmp/x"));
        if let Some(home) = std::env::var_os("HOME") {
            assert_eq!(expand_home("~/Pictures"), PathBuf::from(home).join("Pictures"));
        }
    }
}
