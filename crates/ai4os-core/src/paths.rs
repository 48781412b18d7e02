//! Standard paths used by AI4OS tools

use std::path::PathBuf;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "AI4OS_VAULT_CONFIG";

/// Standard AI4OS paths
pub struct Paths {
    /// Config directory (~/.config/ai4os)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("ai4os");

        Self { config }
    }

    /// Path of the vault config file, honouring `AI4OS_VAULT_CONFIG`
    pub fn vault_config(&self) -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => self.config.join("vault.toml"),
        }
    }
}
