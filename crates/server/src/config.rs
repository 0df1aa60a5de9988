use std::{collections::HashMap, fs, path::Path};

use anyhow::Context;

const DEFAULT_MAX_BODY_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    /// Bearer token every request must present. Unset means open access.
    pub access_token: Option<String>,
    pub max_body_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/documents.db".into(),
            access_token: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Defaults, then `server.toml` in the working directory, then `SERVER__*` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if let Some(file_cfg) = read_file_config(Path::new("server.toml"))? {
        apply_overrides(&mut settings, &file_cfg)?;
    }
    let env_cfg: HashMap<String, String> = std::env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix("SERVER__")
                .map(|name| (name.to_ascii_lowercase(), value))
        })
        .collect();
    apply_overrides(&mut settings, &env_cfg)?;
    Ok(settings)
}

fn read_file_config(path: &Path) -> anyhow::Result<Option<HashMap<String, String>>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    let table: toml::Table =
        toml::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;
    let values = table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();
    Ok(Some(values))
}

pub(crate) fn apply_overrides(
    settings: &mut Settings,
    values: &HashMap<String, String>,
) -> anyhow::Result<()> {
    if let Some(v) = values.get("bind_addr") {
        settings.bind_addr = v.clone();
    }
    if let Some(v) = values.get("database_url") {
        settings.database_url = normalize_database_url(v);
    }
    if let Some(v) = values.get("access_token") {
        let token = v.trim();
        settings.access_token = (!token.is_empty()).then(|| token.to_string());
    }
    if let Some(v) = values.get("max_body_bytes") {
        settings.max_body_bytes = v
            .parse()
            .with_context(|| format!("max_body_bytes must be a byte count, got {v:?}"))?;
    }
    Ok(())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") || raw_database_url.contains("://") {
        return raw_database_url.replace('\\', "/");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
