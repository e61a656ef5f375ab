//! Configuration file loader for `docpipe.toml`.

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::models::GlobalConfig;
use std::path::Path;

/// File name looked up under the root directory.
const CONFIG_FILE: &str = "docpipe.toml";

/// Load configuration from `<root>/docpipe.toml`.
///
/// A missing file yields the default configuration; a file that exists but
/// cannot be read or parsed is an error.
pub fn load_config(root: &Path) -> ConfigResult<GlobalConfig> {
    let config_path = root.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(GlobalConfig::default());
    }

    let content =
        std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
            path: config_path.clone(),
            source,
        })?;

    let config: GlobalConfig =
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path,
            source,
        })?;

    Ok(config)
}
