use anyhow::Context;
use std::path::Path;

use lookout_common::config::Config;

/// Loads and validates the TOML configuration file. Any problem here is
/// fatal: the process refuses to start on a config it cannot trust.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let config: Config = toml::from_str(&text)
        .with_context(|| format!("cannot parse config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
