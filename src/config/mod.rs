mod types;

pub use types::*;

use anyhow::{Context, Result};
use fraglift_media::FourCc;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./fraglift.toml", "~/.config/fraglift/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Handler type named by the config, as a type code.
pub fn handler_code(handler: &str) -> Result<FourCc> {
    handler
        .parse::<FourCc>()
        .map_err(|e| anyhow::anyhow!("Invalid handler type '{}': {}", handler, e))
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    handler_code(&config.extract.handler)?;

    config
        .adts
        .to_header()
        .context("Invalid [adts] defaults")?;

    Ok(())
}
