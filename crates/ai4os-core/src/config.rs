//! Vault configuration loading
//!
//! Configuration file: ~/.config/ai4os/vault.toml (optional)
//!
//! ```toml
//! profile = "egi-development"
//! timeout_secs = 20
//!
//! [profiles.egi-development]
//! role = "ai4os-user"
//! ```
//!
//! Profile tables only override fields of the built-in profiles; new
//! profile names are rejected.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::paths::Paths;
use crate::profile::{IdentityProfile, ProfileName};

/// Environment variable selecting the active profile
pub const PROFILE_ENV: &str = "AI4OS_VAULT_PROFILE";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config from {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown profile '{0}' (expected one of: egi-production, egi-development, egi-demo, ai4eosc-iam)")]
    UnknownProfile(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Partial profile settings from the config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileOverride {
    pub address: Option<String>,
    pub auth_path: Option<String>,
    pub role: Option<String>,
    pub mount_point: Option<String>,
}

impl ProfileOverride {
    fn apply(&self, profile: &mut IdentityProfile) {
        if let Some(address) = &self.address {
            profile.address = address.clone();
        }
        if let Some(auth_path) = &self.auth_path {
            profile.auth_path = auth_path.clone();
        }
        if let Some(role) = &self.role {
            profile.role = role.clone();
        }
        if let Some(mount_point) = &self.mount_point {
            profile.mount_point = mount_point.clone();
        }
    }
}

/// Vault tool configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultConfig {
    /// Default profile name
    #[serde(default)]
    pub profile: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Per-profile overrides keyed by profile name
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverride>,
}

/// The profile chosen for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveProfile {
    pub name: ProfileName,
    pub profile: IdentityProfile,
}

impl VaultConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Paths::new().vault_config())
    }

    /// Load configuration from a specific path, using defaults if it is absent
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        for name in config.profiles.keys() {
            name.parse::<ProfileName>()?;
        }

        Ok(config)
    }

    /// HTTP timeout for Vault requests
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Built-in settings for `name` with any configured overrides applied
    pub fn profile(&self, name: ProfileName) -> IdentityProfile {
        let mut profile = name.builtin();
        if let Some(overrides) = self.profiles.get(name.as_str()) {
            overrides.apply(&mut profile);
        }
        profile
    }

    /// All known profiles, in declaration order
    pub fn profiles(&self) -> Vec<(ProfileName, IdentityProfile)> {
        ProfileName::ALL
            .into_iter()
            .map(|name| (name, self.profile(name)))
            .collect()
    }

    /// Pick the active profile.
    ///
    /// Precedence: `requested` (command line), then `AI4OS_VAULT_PROFILE`,
    /// then the file's `profile` key, then the built-in default.
    pub fn select(&self, requested: Option<&str>) -> Result<ActiveProfile, ConfigError> {
        let from_env = std::env::var(PROFILE_ENV).ok().filter(|v| !v.trim().is_empty());
        self.select_with(requested, from_env.as_deref())
    }

    fn select_with(
        &self,
        requested: Option<&str>,
        from_env: Option<&str>,
    ) -> Result<ActiveProfile, ConfigError> {
        let name = match requested.or(from_env).or(self.profile.as_deref()) {
            Some(raw) => raw.parse::<ProfileName>()?,
            None => ProfileName::default(),
        };

        let profile = self.profile(name);
        profile.validate()?;

        Ok(ActiveProfile { name, profile })
    }
}
