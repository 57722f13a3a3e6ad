//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoachError;
use crate::personality::CoachPersonality;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Generative backend endpoints and model selection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub api_base: String,
    pub text_model: String,
    pub speech_model: String,
    pub voice: String,
    /// Per-request timeout; `None` waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            text_model: "gemini-3-flash-preview".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            voice: "Kore".to_string(),
            request_timeout_secs: Some(120),
        }
    }
}

/// Prompt templates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Coach system instruction; `{personality}` and `{instruction}` are replaced.
    pub coach_template: String,
    pub hint_instruction: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            coach_template: DEFAULT_COACH_TEMPLATE.to_string(),
            hint_instruction: DEFAULT_HINT_INSTRUCTION.to_string(),
        }
    }
}

/// Where archived debates live.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured directory, or the platform data directory.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, CoachError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_dir()
            .map(|p| p.join("duothink"))
            .ok_or_else(|| CoachError::ConfigError("Could not find app data directory".to_string()))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoachError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CoachError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    pub fn from_str(content: &str) -> Result<Self, CoachError> {
        toml::from_str(content)
            .map_err(|e| CoachError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Default config file location (`~/.config/duothink/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("duothink").join("config.toml"))
    }

    /// System instruction for the coach, with placeholders replaced.
    pub fn coach_instruction(&self, personality: CoachPersonality) -> String {
        self.prompts
            .coach_template
            .replace("{personality}", personality.display_name())
            .replace("{instruction}", personality.instruction())
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config::default()
}

const DEFAULT_COACH_TEMPLATE: &str = "You are 'DuoThink AI', a debate coach with a {personality} personality. {instruction}
Your goal is to sharpen the user's logic. Challenge them using real-world data and facts. Be sharp and concise.";

const DEFAULT_HINT_INSTRUCTION: &str = "You are a helpful debate assistant. Provide a single short, brilliant hint to help the user win or sharpen their stance.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.backend.voice, "Kore");
        assert_eq!(config.backend.request_timeout_secs, Some(120));
        assert!(config.storage.data_dir.is_none());
    }

    #[test]
    fn test_partial_backend_section() {
        let config = Config::from_str(
            r#"
            [backend]
            text_model = "gemini-2.5-pro"

            [storage]
            data_dir = "/tmp/duothink"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.text_model, "gemini-2.5-pro");
        assert_eq!(config.backend.speech_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(
            config.storage.resolve_data_dir().unwrap(),
            PathBuf::from("/tmp/duothink")
        );
    }

    #[test]
    fn test_coach_instruction_placeholders() {
        let config = default_config();
        let prompt = config.coach_instruction(CoachPersonality::Stoic);
        assert!(prompt.contains("with a Stoic personality"));
        assert!(prompt.contains(CoachPersonality::Stoic.instruction()));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_str("[backend\nvoice = ").unwrap_err();
        assert!(matches!(err, CoachError::ConfigError(_)));
    }
}
