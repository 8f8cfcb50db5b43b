#![forbid(unsafe_code)]

//! Runtime configuration for the channelhub binaries.
//!
//! Values come from three places, in order of precedence: explicit
//! overrides (CLI flags), process environment variables, then a local
//! `.env` file. `DATA_ROOT` and `YOUTUBE_API_KEY` are required; everything
//! else has a sensible default.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

use crate::cache::DEFAULT_CACHE_TTL_SECS;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HOST: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Directory holding the channel cache database.
    pub data_root: PathBuf,
    /// Static credential for the video platform API.
    pub api_key: String,
    pub port: u16,
    pub host: String,
    /// Maximum cached-list age before a read triggers a refresh.
    pub cache_ttl_secs: i64,
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    resolve_runtime_config(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub data_root: Option<PathBuf>,
    pub api_key: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub cache_ttl_secs: Option<i64>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let data_root = overrides
        .data_root
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("DATA_ROOT", file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("DATA_ROOT not set"))?;
    let api_key = overrides
        .api_key
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        })
        .or_else(|| lookup_value("YOUTUBE_API_KEY", file_vars, &env_lookup))
        .ok_or_else(|| anyhow!("YOUTUBE_API_KEY not set"))?;
    let port = overrides
        .port
        .or_else(|| {
            lookup_value("CHANNELHUB_PORT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u16>().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let host = overrides
        .host
        .and_then(|value| {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() { None } else { Some(trimmed) }
        })
        .or_else(|| lookup_value("CHANNELHUB_HOST", file_vars, &env_lookup))
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let cache_ttl_secs = overrides
        .cache_ttl_secs
        .or_else(|| {
            lookup_value("CHANNELHUB_CACHE_TTL", file_vars, &env_lookup)
                .and_then(|value| value.parse::<i64>().ok())
        })
        .filter(|ttl| *ttl >= 0)
        .unwrap_or(DEFAULT_CACHE_TTL_SECS);

    Ok(RuntimeConfig {
        data_root: PathBuf::from(data_root),
        api_key,
        port,
        host,
        cache_ttl_secs,
    })
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}
