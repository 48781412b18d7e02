//! Vault - per-user secrets on a remote KV store
//!
//! Every secret lives under the caller's namespace, `users/<sub>/`, inside
//! the profile's KV mount. Names are path-like (e.g. `test01`, `db/prod`);
//! the namespace prefix is added here and never supplied by the caller.

use std::collections::BTreeMap;
use thiserror::Error;

use ai4os_core::IdentityProfile;

use crate::credential::{AccessCredential, CredentialError};

/// A secret: flat string keys to string values
pub type SecretRecord = BTreeMap<String, String>;

/// Vault-specific errors
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid token. Please set a valid access token in the ACCESS_TOKEN environment variable: {0}")]
    InvalidCredential(#[from] CredentialError),

    #[error("Vault authentication failed: {0}")]
    Authentication(String),

    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid secret name: {0}")]
    InvalidName(String),

    #[error("Invalid Vault address: {0}")]
    InvalidAddress(String),

    #[error("Vault returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected Vault response: {0}")]
    Decode(String),

    #[error("Network error communicating with Vault")]
    Transport(#[from] reqwest::Error),
}

/// Raw KV operations against a mount. Paths are relative to the mount.
pub trait SecretStore {
    /// Replace the record at `path`
    fn write(&self, mount: &str, path: &str, record: &SecretRecord) -> Result<(), VaultError>;

    /// Immediate children of the folder at `path`
    fn list(&self, mount: &str, path: &str) -> Result<Vec<String>, VaultError>;

    fn read(&self, mount: &str, path: &str) -> Result<SecretRecord, VaultError>;

    fn delete(&self, mount: &str, path: &str) -> Result<(), VaultError>;
}

/// Exchanges an access credential for an authenticated store handle
pub trait Authenticator {
    type Store: SecretStore;

    fn login(
        &self,
        profile: &IdentityProfile,
        credential: &AccessCredential,
    ) -> Result<Self::Store, VaultError>;
}

/// The per-user storage area, `users/<subject>/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace(String);

impl Namespace {
    /// The subject must be a single path segment; it comes from an
    /// unverified token and is spliced into every request path.
    pub fn for_subject(subject: &str) -> Result<Self, VaultError> {
        if subject.is_empty() {
            return Err(CredentialError::MissingSubject.into());
        }

        if subject.contains('/')
            || subject == "."
            || subject == ".."
            || subject.chars().any(|c| c.is_control())
        {
            return Err(CredentialError::Malformed(format!(
                "subject {:?} is not usable as a namespace",
                subject
            ))
            .into());
        }

        Ok(Self(format!("users/{}/", subject)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full store path for a secret name
    pub fn join(&self, name: &str) -> Result<String, VaultError> {
        validate_name(name)?;
        Ok(format!("{}{}", self.0, name))
    }

    /// Store path of a folder, the namespace itself when `folder` is None
    pub fn folder(&self, folder: Option<&str>) -> Result<String, VaultError> {
        match folder.map(|f| f.trim_end_matches('/')) {
            None | Some("") => Ok(self.0.clone()),
            Some(folder) => Ok(format!("{}/", self.join(folder)?)),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a secret name relative to the namespace
fn validate_name(name: &str) -> Result<(), VaultError> {
    if name.is_empty() {
        return Err(VaultError::InvalidName("Name cannot be empty".to_string()));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(VaultError::InvalidName(format!(
            "Name must not start or end with '/': {}",
            name
        )));
    }

    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(VaultError::InvalidName(format!(
            "Name must not contain '.', '..' or empty segments: {}",
            name
        )));
    }

    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(VaultError::InvalidName(format!(
            "Invalid character {:?} in name",
            c
        )));
    }

    Ok(())
}

/// An authenticated handle scoped to one user's namespace
pub struct Session<S> {
    store: S,
    namespace: Namespace,
    mount_point: String,
}

impl<S: SecretStore> Session<S> {
    pub fn new(store: S, namespace: Namespace, mount_point: impl Into<String>) -> Self {
        Self {
            store,
            namespace,
            mount_point: mount_point.into(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    /// Create or replace a secret. No merge: `record` becomes the whole value.
    pub fn upsert(&self, name: &str, record: &SecretRecord) -> Result<(), VaultError> {
        let path = self.namespace.join(name)?;
        self.store.write(&self.mount_point, &path, record)
    }

    /// List secret names in the namespace or one of its sub-folders.
    /// Sub-folders come back with a trailing '/'.
    pub fn list(&self, folder: Option<&str>) -> Result<Vec<String>, VaultError> {
        let path = self.namespace.folder(folder)?;
        self.store.list(&self.mount_point, &path)
    }

    pub fn read(&self, name: &str) -> Result<SecretRecord, VaultError> {
        let path = self.namespace.join(name)?;
        self.store.read(&self.mount_point, &path)
    }

    /// Delete a secret; whether deleting an absent secret fails is up to the store
    pub fn delete(&self, name: &str) -> Result<(), VaultError> {
        let path = self.namespace.join(name)?;
        self.store.delete(&self.mount_point, &path)
    }
}
