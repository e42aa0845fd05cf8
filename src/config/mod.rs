mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./mediaflow.toml",
        "./config.toml",
        "~/.config/mediaflow/config.toml",
        "/etc/mediaflow/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    // Queue runtime tunables must leave the worker able to make progress
    if config.queues.max_dequeue_count == 0 {
        anyhow::bail!("queues.max_dequeue_count cannot be 0");
    }

    if config.queues.max_in_flight == 0 {
        anyhow::bail!("queues.max_in_flight cannot be 0");
    }

    if config.encoding.processor.is_empty() {
        anyhow::bail!("encoding.processor cannot be empty");
    }

    if config.storage.upload_queue == config.storage.progress_queue {
        anyhow::bail!("upload and progress queues must be distinct");
    }

    Ok(())
}

/// Validate that the engine credentials are present. Checked separately from
/// [`validate_config`] so local in-memory runs and tests can omit them.
pub fn validate_credentials(config: &Config) -> Result<()> {
    if config.media_service.name.is_empty() {
        anyhow::bail!("media_service.name is not configured");
    }
    if config.media_service.key.is_empty() {
        anyhow::bail!("media_service.key is not configured");
    }
    Ok(())
}
