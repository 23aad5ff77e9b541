mod types;

pub use types::*;

use anyhow::{Context, Result};
use rangeprobe_media::{ParseOptions, ParseRequest};
use std::path::Path;

/// Smallest block size worth configuring; anything below it turns one box
/// header into several requests.
const MIN_SENSIBLE_BLOCK_SIZE: u64 = 4 * 1024;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    for warning in validate_config(&config)? {
        tracing::warn!("{}", warning);
    }

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./rangeprobe.toml", "~/.config/rangeprobe/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration.
///
/// Hard errors fail; questionable but usable settings come back as warnings.
pub fn validate_config(config: &Config) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if config.fetch.block_size == 0 {
        anyhow::bail!("fetch.block_size cannot be 0");
    }
    if config.fetch.block_size < MIN_SENSIBLE_BLOCK_SIZE {
        warnings.push(format!(
            "fetch.block_size {} is very small; expect many range requests",
            config.fetch.block_size
        ));
    }

    if config.fetch.max_leaf_size < 1024 {
        anyhow::bail!(
            "fetch.max_leaf_size {} is too small to hold a sample description",
            config.fetch.max_leaf_size
        );
    }

    if config.http.timeout_secs == 0 {
        warnings.push("http.timeout_secs is 0; remote fetches will never time out".to_string());
    }
    if config.http.user_agent.trim().is_empty() {
        warnings.push("http.user_agent is empty".to_string());
    }

    if config.parse.fields.is_empty() {
        warnings.push("parse.fields is empty; --fields must be given on every probe".to_string());
    }

    Ok(warnings)
}

impl Config {
    /// Build session options, with `fields` overriding the configured list.
    pub fn parse_options(&self, fields: Option<&str>) -> Result<ParseOptions> {
        let request = match fields {
            Some(list) => list
                .parse::<ParseRequest>()
                .with_context(|| format!("Invalid field list: {list}"))?,
            None => self.parse.fields.iter().copied().collect(),
        };
        if request.is_empty() {
            anyhow::bail!("No fields requested");
        }

        Ok(ParseOptions {
            request,
            dimension_policy: self.parse.dimension_policy,
            block_size: self.fetch.block_size,
            max_leaf_size: self.fetch.max_leaf_size,
        })
    }
}
