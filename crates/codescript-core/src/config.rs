use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::state::DEFAULT_MODEL;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub default_model: String,
    pub provider: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            provider: "gemini".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Single JSON blob per key in the data directory.
    #[default]
    Local,
    /// Per-user record collections keyed by `(user_id, name)`.
    Records,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub user_id: String,
    pub backend: StorageBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            user_id: "local".to_string(),
            backend: StorageBackend::Local,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub max_context_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_context_chars: 32_000,
        }
    }
}
