//! Configuration loading
//!
//! Lookup order:
//! 1. `--config <path>` (must exist)
//! 2. `./config.toml`
//! 3. `<config_dir>/ajan/config.toml`
//! 4. Built-in defaults
//!
//! Environment variables are applied on top of whatever was loaded.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Full agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub chroma: ChromaConfig,

    #[serde(default)]
    pub expert_api: ExpertApiConfig,

    #[serde(default)]
    pub agent: AgentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    /// Generation model
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Local inference can be slow, keep this generous
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_chroma_url")]
    pub url: String,

    #[serde(default = "default_collection")]
    pub collection_name: String,

    /// Maximum distance for a lesson to be used as an example. 0 disables the filter.
    #[serde(default)]
    pub similarity_threshold: f64,

    /// Number of lessons fetched per request
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_chroma_url(),
            collection_name: default_collection(),
            similarity_threshold: 0.0,
            top_k: default_top_k(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection() -> String {
    "ajan_lessons".to_string()
}

fn default_top_k() -> usize {
    2
}

/// OpenAI-compatible "expert" backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpertApiConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_expert_model")]
    pub model: String,

    #[serde(default = "default_expert_url")]
    pub url: String,
}

impl Default for ExpertApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_expert_model(),
            url: default_expert_url(),
        }
    }
}

fn default_expert_model() -> String {
    "gpt-4o".to_string()
}

fn default_expert_url() -> String {
    "https://api.openai.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Characters of conversation kept in the prompt (0 = unlimited)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    16_000
}

impl AgentConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using an arbitrary lookup (tests pass a map here)
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("AJAN_OLLAMA_URL") {
            self.ollama.url = url;
        }
        if let Some(model) = lookup("AJAN_MODEL") {
            self.ollama.model = model;
        }
        if let Some(model) = lookup("AJAN_EMBEDDING_MODEL") {
            self.ollama.embedding_model = model;
        }
        if let Some(url) = lookup("AJAN_CHROMA_URL") {
            self.chroma.url = url;
        }
        if let Some(name) = lookup("AJAN_COLLECTION") {
            self.chroma.collection_name = name;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.expert_api.api_key = key;
            }
        }
    }

    /// Check values and normalize URLs
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.ollama.url = normalize_url("ollama.url", &self.ollama.url)?;
        self.chroma.url = normalize_url("chroma.url", &self.chroma.url)?;
        self.expert_api.url = normalize_url("expert_api.url", &self.expert_api.url)?;

        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ollama.model",
                reason: "must not be empty".into(),
            });
        }
        if !(self.chroma.similarity_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "chroma.similarity_threshold",
                reason: format!("must be >= 0, got {}", self.chroma.similarity_threshold),
            });
        }
        if self.chroma.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "chroma.top_k",
                reason: "must be at least 1".into(),
            });
        }

        Ok(self)
    }

    /// TOML for `ajan config show`, with the API key masked
    pub fn to_display_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if !shown.expert_api.api_key.is_empty() {
            shown.expert_api.api_key = mask_key(&shown.expert_api.api_key);
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}

fn normalize_url(field: &'static str, url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ConfigError::Invalid {
            field,
            reason: "must not be empty".into(),
        });
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("expected an http(s) URL, got '{}'", url),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{}****", visible)
}

pub struct ConfigManager {
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// Resolve which file to load. An explicit path is always used as-is.
    pub fn locate(explicit: Option<&Path>) -> Self {
        Self::locate_in(explicit, Path::new("."), Self::global_config_path())
    }

    /// Lookup relative to `working_dir`, with `global` as the user-wide file
    pub fn locate_in(explicit: Option<&Path>, working_dir: &Path, global: Option<PathBuf>) -> Self {
        if let Some(path) = explicit {
            return Self {
                path: Some(path.to_path_buf()),
            };
        }

        let local = working_dir.join("config.toml");
        if local.exists() {
            return Self { path: Some(local) };
        }

        Self {
            path: global.filter(|p| p.exists()),
        }
    }

    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("ajan").join("config.toml"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load, apply environment overrides and validate
    pub fn load(&self) -> Result<AgentConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.clone()));
                }
                let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!("Loaded config from {}", path.display());
                AgentConfig::from_toml_str(&content)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                AgentConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AgentConfig::from_toml_str("").unwrap();
        assert_eq!(config.ollama.url, "http://localhost:11434");
        assert_eq!(config.chroma.top_k, 2);
        assert!(config.chroma.enabled);
        assert_eq!(config.agent.history_limit, 16_000);
        assert!(config.expert_api.api_key.is_empty());
    }

    #[test]
    fn test_partial_file() {
        let config = AgentConfig::from_toml_str(
            r#"
            [ollama]
            model = "qwen2.5-coder"

            [chroma]
            collection_name = "lessons"
            similarity_threshold = 0.35
            "#,
        )
        .unwrap();

        assert_eq!(config.ollama.model, "qwen2.5-coder");
        assert_eq!(config.ollama.embedding_model, "nomic-embed-text");
        assert_eq!(config.chroma.collection_name, "lessons");
        assert!((config.chroma.similarity_threshold - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("AJAN_MODEL", "mistral"),
            ("AJAN_CHROMA_URL", "http://chroma:8000"),
            ("OPENAI_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = AgentConfig::default();
        config.apply_env_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.ollama.model, "mistral");
        assert_eq!(config.chroma.url, "http://chroma:8000");
        assert_eq!(config.expert_api.api_key, "sk-test");
        assert_eq!(config.ollama.url, "http://localhost:11434");
    }

    #[test]
    fn test_validate_trims_trailing_slash() {
        let mut config = AgentConfig::default();
        config.ollama.url = "http://localhost:11434/".into();
        let config = config.validate().unwrap();
        assert_eq!(config.ollama.url, "http://localhost:11434");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AgentConfig::default();
        config.chroma.url = "localhost:8000".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "chroma.url", .. })
        ));

        let mut config = AgentConfig::default();
        config.chroma.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AgentConfig::default();
        config.chroma.similarity_threshold = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_masks_api_key() {
        let mut config = AgentConfig::default();
        config.expert_api.api_key = "sk-abcdefgh".into();
        let shown = config.to_display_toml().unwrap();
        assert!(shown.contains("sk-a****"));
        assert!(!shown.contains("sk-abcdefgh"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(&path, "[chroma]\nenabled = false\n").unwrap();

        let config = ConfigManager::locate(Some(&path)).load().unwrap();
        assert!(!config.chroma.enabled);
    }

    #[test]
    fn test_lookup_order() {
        let work = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        let global = home.path().join("ajan").join("config.toml");

        // Nothing on disk: defaults
        let manager = ConfigManager::locate_in(None, work.path(), Some(global.clone()));
        assert_eq!(manager.path(), None);
        assert!(manager.load().is_ok());

        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(&global, "[ollama]\nmodel = \"global-model\"\n").unwrap();
        let manager = ConfigManager::locate_in(None, work.path(), Some(global.clone()));
        assert_eq!(manager.path(), Some(global.as_path()));

        let local = work.path().join("config.toml");
        fs::write(&local, "[ollama]\nmodel = \"local-model\"\n").unwrap();
        let manager = ConfigManager::locate_in(None, work.path(), Some(global.clone()));
        assert_eq!(manager.path(), Some(local.as_path()));

        let explicit = work.path().join("other.toml");
        let manager = ConfigManager::locate_in(Some(&explicit), work.path(), Some(global));
        assert_eq!(manager.path(), Some(explicit.as_path()));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = ConfigManager::locate(Some(&path)).load().unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
