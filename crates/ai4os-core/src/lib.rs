//! AI4OS Core - Shared functionality for AI4OS tools
//!
//! Standard paths, identity-provider profiles and the configuration file
//! that selects between them.

pub mod config;
pub mod paths;
pub mod profile;

pub use config::{ActiveProfile, ConfigError, VaultConfig};
pub use paths::Paths;
pub use profile::{IdentityProfile, ProfileName};
