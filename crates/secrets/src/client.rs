//! HashiCorp Vault HTTP client
//!
//! Speaks the two parts of the Vault API this tool needs: JWT/OIDC login
//! (`auth/<path>/login`) and the KV version 1 secrets engine. All calls are
//! blocking and made exactly once; nothing is retried.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use ai4os_core::IdentityProfile;

use crate::credential::AccessCredential;
use crate::vault::{Authenticator, SecretRecord, SecretStore, VaultError};

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: LoginAuth,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: serde_json::Map<String, Value>,
}

/// Pull `errors` out of a Vault error body, falling back to the raw text
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => "no details".to_string(),
        _ => body.trim().to_string(),
    }
}

/// KV v1 values are usually strings; anything else is kept as JSON text
fn flatten_record(data: serde_json::Map<String, Value>) -> SecretRecord {
    data.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect()
}

/// Build `<base>/v1/<segments...>`, percent-encoding each segment
fn api_url(base: &Url, parts: &[&str]) -> Result<Url, VaultError> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| VaultError::InvalidAddress(base.to_string()))?;
        segments.pop_if_empty().push("v1");
        for part in parts {
            segments.extend(part.split('/').filter(|s| !s.is_empty()));
        }
    }
    Ok(url)
}

/// Unauthenticated connection to a Vault server
#[derive(Debug, Clone)]
pub struct VaultClient {
    http: Client,
    base_url: Url,
}

impl VaultClient {
    /// Build the user-agent string from crate version.
    fn user_agent() -> String {
        format!("ai4os-secrets/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Create a client for the Vault server at `address`
    pub fn new(address: &str, timeout: Duration) -> Result<Self, VaultError> {
        let base_url = Url::parse(address.trim_end_matches('/'))
            .map_err(|e| VaultError::InvalidAddress(format!("{}: {}", address, e)))?;

        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;

        Ok(Self { http, base_url })
    }

    /// Exchange a JWT for a Vault client token via the JWT auth backend.
    ///
    /// The role is sent even when empty; the server decides what that means.
    pub fn jwt_login(
        &self,
        auth_path: &str,
        role: &str,
        jwt: &str,
    ) -> Result<SecretString, VaultError> {
        let url = api_url(&self.base_url, &["auth", auth_path, "login"])?;
        debug!(path = %url.path(), "POST");

        let resp = self
            .http
            .post(url)
            .json(&json!({ "role": role, "jwt": jwt }))
            .send()?;

        let status = resp.status();
        match status {
            s if s.is_success() => {
                let body: LoginResponse = resp
                    .json()
                    .map_err(|e| VaultError::Decode(format!("login response: {}", e)))?;
                Ok(SecretString::from(body.auth.client_token))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(VaultError::Authentication(error_message(&resp.text()?)))
            }
            _ => Err(VaultError::Api {
                status: status.as_u16(),
                message: error_message(&resp.text()?),
            }),
        }
    }
}

impl Authenticator for VaultClient {
    type Store = KvClient;

    fn login(
        &self,
        profile: &IdentityProfile,
        credential: &AccessCredential,
    ) -> Result<KvClient, VaultError> {
        let token = self.jwt_login(
            &profile.auth_path,
            &profile.role,
            credential.expose_token(),
        )?;
        info!(auth_path = %profile.auth_path, "Logged in to Vault");

        Ok(KvClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            token,
        })
    }
}

/// Token-bearing client for the KV version 1 secrets engine
#[derive(Debug, Clone)]
pub struct KvClient {
    http: Client,
    base_url: Url,
    token: SecretString,
}

impl KvClient {
    /// Wrap an existing Vault token
    pub fn with_token(client: &VaultClient, token: SecretString) -> Self {
        Self {
            http: client.http.clone(),
            base_url: client.base_url.clone(),
            token,
        }
    }

    fn request(&self, method: Method, mount: &str, path: &str) -> Result<RequestBuilder, VaultError> {
        let url = api_url(&self.base_url, &[mount, path])?;
        debug!(method = %method, path = %url.path(), "Vault request");

        Ok(self
            .http
            .request(method, url)
            .header("X-Vault-Token", self.token.expose_secret())
            .header("Accept", "application/json"))
    }

    /// Map non-success statuses onto errors; `path` names the secret in messages
    fn check(resp: Response, path: &str) -> Result<Response, VaultError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = error_message(&resp.text()?);
        match status {
            StatusCode::NOT_FOUND => Err(VaultError::NotFound(path.to_string())),
            StatusCode::FORBIDDEN => Err(VaultError::PermissionDenied(format!(
                "{} ({})",
                path, message
            ))),
            _ => Err(VaultError::Api {
                status: status.as_u16(),
                message,
            }),
        }
    }
}

impl SecretStore for KvClient {
    fn write(&self, mount: &str, path: &str, record: &SecretRecord) -> Result<(), VaultError> {
        let resp = self.request(Method::POST, mount, path)?.json(record).send()?;
        Self::check(resp, path)?;
        Ok(())
    }

    fn list(&self, mount: &str, path: &str) -> Result<Vec<String>, VaultError> {
        // GET ?list=true is the documented equivalent of the LIST verb
        let resp = self
            .request(Method::GET, mount, path)?
            .query(&[("list", "true")])
            .send()?;
        let body: ListResponse = Self::check(resp, path)?
            .json()
            .map_err(|e| VaultError::Decode(format!("list response: {}", e)))?;
        Ok(body.data.keys)
    }

    fn read(&self, mount: &str, path: &str) -> Result<SecretRecord, VaultError> {
        let resp = self.request(Method::GET, mount, path)?.send()?;
        let body: ReadResponse = Self::check(resp, path)?
            .json()
            .map_err(|e| VaultError::Decode(format!("read response: {}", e)))?;
        Ok(flatten_record(body.data))
    }

    fn delete(&self, mount: &str, path: &str) -> Result<(), VaultError> {
        let resp = self.request(Method::DELETE, mount, path)?.send()?;
        Self::check(resp, path)?;
        Ok(())
    }
}
