//! Configuration discovery and environment overrides.

use std::path::PathBuf;

use tracing::debug;

use super::{ConfigError, HarvestConfig};

/// Options for loading configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Skip `HARVEST_*` environment overrides.
    pub ignore_env: bool,
}

/// Load configuration.
///
/// Priority: explicit `--config` path, then a `harvester.*` file discovered
/// by `prefer` in the standard locations, then defaults. Environment
/// overrides apply on top in every case. The result is validated.
pub async fn load_config(options: &LoadOptions) -> Result<HarvestConfig, ConfigError> {
    let mut config = match &options.config_path {
        Some(path) => HarvestConfig::load_from_path(path).await?,
        None => discover().await?,
    };

    if !options.ignore_env {
        apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    }

    config.validate()?;
    Ok(config)
}

async fn discover() -> Result<HarvestConfig, ConfigError> {
    match prefer::load("harvester").await {
        Ok(found) => match found.source_path() {
            Some(path) => {
                debug!("Using config file {}", path.display());
                HarvestConfig::load_from_path(path).await
            }
            None => Ok(HarvestConfig::default()),
        },
        Err(_) => {
            debug!("No config file found, using defaults");
            Ok(HarvestConfig::default())
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

/// Apply `HARVEST_*` overrides. `lookup` returns a variable's value, if set.
pub fn apply_env_overrides<F>(config: &mut HarvestConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("HARVEST_BASE_URL") {
        config.base_url = url;
    }
    if let Some(ua) = get("HARVEST_USER_AGENT") {
        config.user_agents = vec![ua];
    }
    if let Some(v) = get("HARVEST_REQUEST_TIMEOUT_MS") {
        config.request_timeout_ms = parse_env("HARVEST_REQUEST_TIMEOUT_MS", v)?;
    }
    if let Some(v) = get("HARVEST_MAX_PAGES") {
        config.max_pages = Some(parse_env("HARVEST_MAX_PAGES", v)?);
    }
    if let Some(v) = get("HARVEST_RATE_LIMIT_RPS") {
        config.rate_limit.requests_per_second = parse_env("HARVEST_RATE_LIMIT_RPS", v)?;
    }
    Ok(())
}
