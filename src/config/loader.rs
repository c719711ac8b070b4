use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::ServerConfig;

/// Prefix for environment overrides of scalar settings (`GATEWAY_LISTEN_ADDR`, ...).
pub const ENV_PREFIX: &str = "GATEWAY";

/// Load configuration from a file using the config crate and overlay the
/// process environment.
///
/// Supports multiple formats: YAML, JSON, TOML, etc. Service base addresses are
/// then taken from `<SERVICE>_SERVICE_URL` variables where present. The
/// environment is consulted only here; the returned value is immutable input
/// for the rest of startup.
pub async fn load_config(config_path: &str) -> Result<ServerConfig> {
    let mut config = load_config_unchecked(config_path).await?;
    config.apply_service_env(|name| std::env::var(name).ok());
    Ok(config)
}

/// Load configuration synchronously, without the service address overlay.
pub fn load_config_sync(config_path: &str) -> Result<ServerConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let server_config: ServerConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(server_config)
}

/// Load configuration exactly as written in the file (used by tests and tooling)
pub async fn load_config_unchecked(config_path: &str) -> Result<ServerConfig> {
    load_config_sync(config_path)
}
