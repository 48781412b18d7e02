//! secrets - Per-user secrets on the AI4OS Vault
//!
//! Your access token is your key. The tool reads the OIDC access token from
//! `ACCESS_TOKEN`, derives your private namespace (`users/<sub>/`) from it,
//! logs in to the Vault deployment that trusts your identity provider, and
//! then creates, lists, reads and deletes secrets inside that namespace.

pub mod bootstrap;
pub mod client;
pub mod credential;
pub mod vault;

pub use bootstrap::{open_session, open_session_from_env};
pub use client::{KvClient, VaultClient};
pub use credential::{
    token_from_env, AccessCredential, CredentialError, UnverifiedClaims, CREDENTIAL_ENV,
};
pub use vault::{Authenticator, Namespace, SecretRecord, SecretStore, Session, VaultError};
