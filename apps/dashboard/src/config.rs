use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use sync_core::EngineConfig;
use thiserror::Error;

const ENV_PREFIX: &str = "DASHBOARD__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    pub engine: EngineConfig,
    /// Signed-in actor. Unset runs the dashboard unauthenticated: private collections stay off.
    pub actor_id: Option<String>,
    pub sync_timeout_ms: u64,
    pub log_filter: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            actor_id: None,
            sync_timeout_ms: 5_000,
            log_filter: "info".into(),
        }
    }
}

/// Defaults, then the TOML file at `path` if present, then `DASHBOARD__*` variables.
pub fn load_settings(path: &Path) -> Result<DashboardSettings, ConfigError> {
    let mut settings = read_file(path)?.unwrap_or_default();
    apply_env(&mut settings, std::env::vars())?;
    Ok(settings)
}

fn read_file(path: &Path) -> Result<Option<DashboardSettings>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&raw)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub(crate) fn apply_env<I>(settings: &mut DashboardSettings, vars: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let Some(name) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let optional = || {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        match name.to_ascii_lowercase().as_str() {
            "store_url" => settings.engine.store.base_url = optional(),
            "deployment_id" => settings.engine.deployment_id = optional(),
            "session_token" => settings.engine.initial_session_token = optional(),
            "actor_id" => settings.actor_id = optional(),
            "log_filter" => settings.log_filter = value.clone(),
            "fail_on_missing_config" => {
                settings.engine.fail_on_missing_config =
                    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.clone(),
                    })?;
            }
            "sync_timeout_ms" => {
                settings.sync_timeout_ms =
                    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.clone(),
                        value: value.clone(),
                    })?;
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
