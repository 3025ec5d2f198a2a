use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::StartupError;

/// Environment used when neither the CLI nor the global config names one
pub const FALLBACK_ENV: &str = "local";

/// Base URL used when no layer provides one
pub const FALLBACK_BASE_URL: &str = "http://localhost:3000";

/// Default action/wait timeout (ms) when no layer provides one
pub const FALLBACK_TIMEOUT_MS: u64 = 15000;

/// Global configuration shared by every flow (`config.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default)]
    pub envs: HashMap<String, EnvConfig>,

    #[serde(default)]
    pub default_env: Option<String>,

    #[serde(default)]
    pub default_timeout_ms: Option<u64>,
}

/// Per-environment settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Partial configuration declared inside a flow file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Effective configuration for one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: FALLBACK_BASE_URL.to_string(),
            timeout_ms: FALLBACK_TIMEOUT_MS,
        }
    }
}

impl GlobalConfig {
    /// Load the global config. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>, StartupError> {
        if !path.exists() {
            log::debug!("No global config at {}, using defaults", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| StartupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| StartupError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }
}

/// Pick the environment name: explicit name, then the global default, then `local`.
pub fn resolve_env_name(global: Option<&GlobalConfig>, env_name: Option<&str>) -> String {
    env_name
        .map(str::to_string)
        .or_else(|| global.and_then(|g| g.default_env.clone()))
        .unwrap_or_else(|| FALLBACK_ENV.to_string())
}

/// Merge flow, environment and global settings, highest precedence first.
pub fn resolve(
    global: Option<&GlobalConfig>,
    env_name: Option<&str>,
    flow: Option<&FlowConfig>,
) -> RunConfig {
    let env = resolve_env_name(global, env_name);
    let env_config = global.and_then(|g| g.envs.get(&env));

    let base_url = flow
        .and_then(|f| f.base_url.clone())
        .or_else(|| env_config.and_then(|e| e.base_url.clone()))
        .unwrap_or_else(|| FALLBACK_BASE_URL.to_string());

    // Zero is not a usable timeout; treat it as unset at every layer.
    let timeout_ms = flow
        .and_then(|f| f.timeout_ms)
        .filter(|ms| *ms > 0)
        .or_else(|| env_config.and_then(|e| e.timeout_ms).filter(|ms| *ms > 0))
        .or_else(|| global.and_then(|g| g.default_timeout_ms).filter(|ms| *ms > 0))
        .unwrap_or(FALLBACK_TIMEOUT_MS);

    RunConfig {
        base_url,
        timeout_ms,
    }
}
