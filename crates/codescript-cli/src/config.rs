use std::fs;
use std::path::Path;
use std::path::PathBuf;

use codescript_core::config::Config;
use thiserror::Error;

pub const HOME_ENV: &str = "CODESCRIPT_HOME";

const APP_DIR: &str = "codescript";
const CONFIG_FILES: [&str; 3] = ["config.toml", "config.yaml", "config.yml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os(HOME_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Directories searched for a config file, most specific first.
pub fn config_dirs() -> Vec<PathBuf> {
    let mut found = Vec::new();
    if let Some(home) = home_dir() {
        found.push(home);
    }
    if let Some(config_dir) = dirs::config_dir() {
        found.push(config_dir.join(APP_DIR));
    }
    found
}

pub fn load_config() -> Result<Config, ConfigError> {
    for dir in config_dirs() {
        if let Some(config) = load_config_from(&dir)? {
            return Ok(config);
        }
    }
    Ok(Config::default())
}

/// First config file found in `dir`, or `None` when there is none.
pub fn load_config_from(dir: &Path) -> Result<Option<Config>, ConfigError> {
    for name in CONFIG_FILES {
        let path = dir.join(name);
        if !path.exists() {
            continue;
        }
        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config");
        return parse_config(&path, &raw).map(Some);
    }
    Ok(None)
}

fn parse_config(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    if is_toml {
        toml::from_str(raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    } else {
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(dir) = config.storage.data_dir.clone() {
        return dir;
    }
    if let Some(home) = home_dir() {
        return home.join("data");
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".codescript"))
}
