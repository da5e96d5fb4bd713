//! `load_config` module: reads `fnpack.yml` and adapts it into the library's
//! [`ServiceConfig`] plus the store section only the CLI cares about.
//!
//! # Responsibilities
//! - Parse the YAML file into typed structs
//! - Resolve relative paths against the config file's directory
//! - Inject the store token from `FNPACK_STORE_TOKEN`, never from the file
//!
//! All errors are `anyhow::Error` and surface at the CLI boundary.

use anyhow::{Context, Result};
use fnpack::config::ServiceConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Environment variable holding the bearer token for the HTTP store.
pub const STORE_TOKEN_ENV: &str = "FNPACK_STORE_TOKEN";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug)]
pub struct CliConfig {
    pub service: ServiceConfig,
    pub store: StoreConfig,
    /// Bearer token for the HTTP store, if set in the environment.
    pub store_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Http {
        endpoint: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    Local {
        root: PathBuf,
    },
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(flatten)]
    service: ServiceConfig,
    store: StoreConfig,
}

/// Loads the YAML config at `path` and injects the store token from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
        anyhow::anyhow!("Failed to read config file {:?}: {}", path_ref, e)
    })?;

    let raw: RawConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
        anyhow::anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path_ref, "Parsed config YAML successfully");

    let base = config_dir(path_ref)?;
    let mut service = raw.service;
    service.resolve_paths(&base);
    service.trace_loaded();

    let store = match raw.store {
        StoreConfig::Local { root } if root.is_relative() => StoreConfig::Local {
            root: base.join(root),
        },
        other => other,
    };

    let store_token = env::var(STORE_TOKEN_ENV).ok().filter(|t| !t.is_empty());
    info!(
        store = ?store,
        token_set = store_token.is_some(),
        "Store configuration resolved"
    );

    Ok(CliConfig {
        service,
        store,
        store_token,
    })
}

fn config_dir(path: &Path) -> Result<PathBuf> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    if parent.is_absolute() {
        return Ok(parent.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to determine current directory")?;
    Ok(cwd.join(parent))
}
