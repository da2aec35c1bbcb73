//! Config file load, save, environment overrides and validation.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::types::{AmtConfig, HOSTNAME_PLACEHOLDER};

/// `config.json` next to the executable.
pub fn default_config_path() -> Result<PathBuf> {
    let exe_dir = std::env::current_exe()?
        .parent()
        .ok_or_else(|| anyhow!("Cannot determine executable directory"))?
        .to_path_buf();
    Ok(exe_dir.join("config.json"))
}

pub fn resolve_config_path(path: Option<&str>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(PathBuf::from(p)),
        None => default_config_path(),
    }
}

/// Load the config file (or defaults when missing), then apply AMT_* env overrides.
pub async fn load_config(path: Option<&str>) -> Result<AmtConfig> {
    let config_path = resolve_config_path(path)?;

    let mut config = if config_path.exists() {
        let content = tokio::fs::read_to_string(&config_path)
            .await
            .with_context(|| format!("Failed to read config: {:?}", config_path))?;
        let config: AmtConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON: {:?}", config_path))?;
        info!("Loaded configuration from: {:?}", config_path);
        config
    } else {
        info!("Config file not found at {:?}. Using defaults and environment.", config_path);
        AmtConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

pub async fn save_config(config: &AmtConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write config: {:?}", path))?;
    info!("Configuration saved to: {:?}", path);
    Ok(())
}

/// AMT_HOSTNAME, AMT_TLS, AMT_PORT, AMT_USERNAME, AMT_PASSWORD take precedence over the file.
pub fn apply_env_overrides<F>(config: &mut AmtConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("AMT_HOSTNAME") {
        config.endpoint.hostname = host;
    }
    if let Some(tls) = lookup("AMT_TLS") {
        match tls.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => config.endpoint.tls = true,
            "0" | "false" | "no" => config.endpoint.tls = false,
            other => warn!("Ignoring invalid AMT_TLS value '{}'", other),
        }
    }
    if let Some(port) = lookup("AMT_PORT") {
        match port.trim().parse::<u16>() {
            Ok(p) => config.endpoint.port = Some(p),
            Err(_) => warn!("Ignoring invalid AMT_PORT value '{}'", port),
        }
    }
    if let Some(user) = lookup("AMT_USERNAME") {
        config.credentials.username = user;
    }
    if let Some(pass) = lookup("AMT_PASSWORD") {
        config.credentials.password = pass;
    }
}

/// Reject configs that cannot reach a controller.
pub fn validate(config: &AmtConfig) -> Result<()> {
    let host = config.endpoint.hostname.trim();
    if host.is_empty() || host == HOSTNAME_PLACEHOLDER {
        return Err(anyhow!(
            "AMT hostname is not configured. Run the setup wizard ('--setup'), edit the config file or set AMT_HOSTNAME."
        ));
    }
    if config.credentials.username.is_empty() {
        return Err(anyhow!("AMT username is empty"));
    }
    if config.credentials.password.is_empty() {
        return Err(anyhow!("AMT password is empty. Set it in the config file or AMT_PASSWORD."));
    }
    if !(config.power.poll_interval_secs > 0.0) {
        return Err(anyhow!(
            "power.poll_interval_secs must be positive (got {})",
            config.power.poll_interval_secs
        ));
    }
    if let Some(timeout) = config.power.wait_timeout_secs {
        if !(timeout >= 0.0) {
            return Err(anyhow!("power.wait_timeout_secs must not be negative (got {})", timeout));
        }
    }
    Ok(())
}
