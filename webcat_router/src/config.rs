use crate::policy::{SearchOptions, TargetClickSearchMode};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_WS_ADDR: &str = "127.0.0.1:9017";

pub const ENV_WS_ADDR: &str = "WEBCAT_WS_ADDR";
pub const ENV_OPTIONS_FILE: &str = "WEBCAT_OPTIONS";
pub const ENV_TARGET_CLICK_SEARCH_MODE: &str = "WEBCAT_TARGET_CLICK_SEARCH_MODE";
pub const ENV_TARGET_SELECT_SEARCH_ENABLED: &str = "WEBCAT_TARGET_SELECT_SEARCH_ENABLED";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read options file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid options file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid {var}={value:?}: {reason}")]
    Env {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Start-up snapshot for the relay; never reloaded while running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub options: SearchOptions,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_WS_ADDR.to_string(),
            options: SearchOptions::default(),
        }
    }
}

pub fn load_options_file(path: &Path) -> Result<SearchOptions, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overrides `options` from environment variables read through `env`.
pub fn apply_env_overrides(
    options: &mut SearchOptions,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = env(ENV_TARGET_CLICK_SEARCH_MODE) {
        options.target_click_search_mode =
            value
                .parse::<TargetClickSearchMode>()
                .map_err(|reason| ConfigError::Env {
                    var: ENV_TARGET_CLICK_SEARCH_MODE,
                    value: value.clone(),
                    reason,
                })?;
    }
    if let Some(value) = env(ENV_TARGET_SELECT_SEARCH_ENABLED) {
        options.target_select_search_enabled =
            parse_flag(&value).ok_or_else(|| ConfigError::Env {
                var: ENV_TARGET_SELECT_SEARCH_ENABLED,
                value: value.clone(),
                reason: "expected a boolean".to_string(),
            })?;
    }
    Ok(())
}

/// Defaults, then the options file if given, then environment overrides.
pub fn load_options(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SearchOptions, ConfigError> {
    let mut options = match file {
        Some(path) => load_options_file(path)?,
        None => SearchOptions::default(),
    };
    apply_env_overrides(&mut options, env)?;
    Ok(options)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
