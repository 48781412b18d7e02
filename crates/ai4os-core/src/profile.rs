//! Identity-provider profiles
//!
//! Each identity provider that issues AI4OS access tokens is paired with a
//! Vault deployment and a JWT auth backend on that deployment. A profile
//! bundles the four settings needed to talk to it. Exactly one profile is
//! active per run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

const EGI_VAULT_ADDR: &str = "https://vault.services.fedcloud.eu:8200";
const AI4OS_VAULT_ADDR: &str = "https://secrets.services.ai4os.eu:8200";
const SECRETS_MOUNT: &str = "/secrets/";

/// Known identity providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileName {
    /// EGI Check-in, production
    #[default]
    EgiProduction,
    /// EGI Check-in, development
    EgiDevelopment,
    /// EGI Check-in, demo
    EgiDemo,
    /// AI4EOSC IAM
    Ai4eoscIam,
}

impl ProfileName {
    pub const ALL: [ProfileName; 4] = [
        ProfileName::EgiProduction,
        ProfileName::EgiDevelopment,
        ProfileName::EgiDemo,
        ProfileName::Ai4eoscIam,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileName::EgiProduction => "egi-production",
            ProfileName::EgiDevelopment => "egi-development",
            ProfileName::EgiDemo => "egi-demo",
            ProfileName::Ai4eoscIam => "ai4eosc-iam",
        }
    }

    /// Built-in settings for this provider
    pub fn builtin(&self) -> IdentityProfile {
        let (address, auth_path) = match self {
            ProfileName::EgiProduction => (EGI_VAULT_ADDR, "jwt"),
            ProfileName::EgiDevelopment => (AI4OS_VAULT_ADDR, "jwt-egi"),
            ProfileName::EgiDemo => (AI4OS_VAULT_ADDR, "jwt-egi-demo"),
            ProfileName::Ai4eoscIam => (AI4OS_VAULT_ADDR, "jwt"),
        };

        IdentityProfile {
            address: address.to_string(),
            auth_path: auth_path.to_string(),
            role: String::new(),
            mount_point: SECRETS_MOUNT.to_string(),
        }
    }
}

impl fmt::Display for ProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileName::ALL
            .into_iter()
            .find(|name| name.as_str() == s.trim())
            .ok_or_else(|| ConfigError::UnknownProfile(s.to_string()))
    }
}

/// Connection settings for one Vault deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Vault server address (e.g. "https://vault.services.fedcloud.eu:8200")
    pub address: String,
    /// JWT auth backend mount (e.g. "jwt", "jwt-egi")
    pub auth_path: String,
    /// Role passed to the login call; may be empty
    pub role: String,
    /// KV secrets engine mount (e.g. "/secrets/")
    pub mount_point: String,
}

impl IdentityProfile {
    /// Reject unusable settings before any network traffic happens
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_address(&self.address)?;

        if self.auth_path.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "auth_path",
                reason: "must not be empty".to_string(),
            });
        }

        if self.mount_point.trim_matches('/').is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "mount_point",
                reason: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Allow `https://` anywhere and `http://` only for the local host.
fn validate_address(address: &str) -> Result<(), ConfigError> {
    if address.starts_with("https://") {
        return Ok(());
    }

    if let Some(rest) = address.strip_prefix("http://") {
        let host = rest.split('/').next().unwrap_or("");
        let host = host.split(':').next().unwrap_or("");
        if host == "localhost" || host == "127.0.0.1" {
            return Ok(());
        }
        return Err(ConfigError::InvalidValue {
            field: "address",
            reason: format!("insecure http URL rejected: {}", address),
        });
    }

    Err(ConfigError::InvalidValue {
        field: "address",
        reason: format!("unsupported URL scheme: {}", address),
    })
}
