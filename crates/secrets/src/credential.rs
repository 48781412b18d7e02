//! Access credential handling
//!
//! The access token is an OIDC JWT issued by the identity provider. This
//! module only ever decodes it WITHOUT checking the signature: the Vault
//! server validates the token against the provider's keys during login, and
//! until that succeeds nothing read here may be trusted. The subject claim
//! is used solely to build the namespace path the server will later enforce.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::env::VarError;
use thiserror::Error;

/// Environment variable holding the access token
pub const CREDENTIAL_ENV: &str = "ACCESS_TOKEN";

/// Raw value of `ACCESS_TOKEN`, `None` when unset.
///
/// A value that is set but not UTF-8 is malformed, not missing.
pub fn token_from_env() -> Result<Option<String>, CredentialError> {
    match std::env::var(CREDENTIAL_ENV) {
        Ok(token) => Ok(Some(token)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(CredentialError::Malformed(format!(
            "{} is not valid UTF-8",
            CREDENTIAL_ENV
        ))),
    }
}

/// Reasons a credential is rejected before any network call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("ACCESS_TOKEN is not set")]
    Missing,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token has no subject (sub) claim")]
    MissingSubject,
}

/// Claims read from a token whose signature has NOT been verified
#[derive(Debug, Clone, Deserialize)]
pub struct UnverifiedClaims {
    /// Subject identifier
    #[serde(default)]
    pub sub: Option<String>,

    /// Issuer
    #[serde(default)]
    pub iss: Option<String>,

    /// Expiry as a NumericDate
    #[serde(default)]
    pub exp: Option<f64>,

    /// Everything else (aud, scope, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UnverifiedClaims {
    /// Decode a compact JWS token without verifying its signature.
    ///
    /// Checks structure only: three dot-separated parts, a JSON object
    /// header and a JSON object payload.
    pub fn decode_unverified(token: &str) -> Result<Self, CredentialError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CredentialError::Missing);
        }

        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(CredentialError::Malformed(format!(
                "expected 3 segments, found {}",
                parts.len()
            )));
        }

        decode_object(parts[0], "header")?;
        let payload = decode_object(parts[1], "payload")?;

        serde_json::from_value(Value::Object(payload))
            .map_err(|e| CredentialError::Malformed(format!("invalid claims: {}", e)))
    }

    /// Expiry time, if the token carries one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.exp?;
        DateTime::from_timestamp(exp.trunc() as i64, 0)
    }
}

/// Decode one base64url segment into a JSON object
fn decode_object(segment: &str, what: &str) -> Result<Map<String, Value>, CredentialError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| CredentialError::Malformed(format!("{} is not base64url: {}", what, e)))?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CredentialError::Malformed(format!(
            "{} is not a JSON object",
            what
        ))),
        Err(e) => Err(CredentialError::Malformed(format!(
            "{} is not valid JSON: {}",
            what, e
        ))),
    }
}

/// The raw access token plus its unverified subject
#[derive(Debug)]
pub struct AccessCredential {
    token: SecretString,
    subject: String,
    claims: UnverifiedClaims,
}

impl AccessCredential {
    /// Wrap a raw token, extracting its subject without verifying the signature
    pub fn decode_unverified(token: String) -> Result<Self, CredentialError> {
        let claims = UnverifiedClaims::decode_unverified(&token)?;

        let subject = match claims.sub.as_deref().map(str::trim) {
            Some(sub) if !sub.is_empty() => sub.to_string(),
            _ => return Err(CredentialError::MissingSubject),
        };

        Ok(Self {
            token: SecretString::from(token.trim().to_string()),
            subject,
            claims,
        })
    }

    /// Subject identifier from the `sub` claim (unverified)
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn claims(&self) -> &UnverifiedClaims {
        &self.claims
    }

    /// The raw token, for presenting to the login endpoint
    pub fn expose_token(&self) -> &str {
        self.token.expose_secret()
    }

    /// Whether the unverified `exp` claim lies before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.claims.expires_at().is_some_and(|exp| exp <= now)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build an unsigned token around `payload`
    pub(crate) fn token_with(payload: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.c2lnbmF0dXJl", header, body)
    }

    #[test]
    fn test_decode_subject() {
        let token = token_with(serde_json::json!({
            "sub": "alice123",
            "iss": "https://aai.egi.eu/auth/realms/egi",
            "aud": ["vault"],
        }));

        let credential = AccessCredential::decode_unverified(token.clone()).unwrap();
        assert_eq!(credential.subject(), "alice123");
        assert_eq!(
            credential.claims().iss.as_deref(),
            Some("https://aai.egi.eu/auth/realms/egi")
        );
        assert!(credential.claims().extra.contains_key("aud"));
        assert_eq!(credential.expose_token(), token);
    }

    #[test]
    fn test_signature_is_not_checked() {
        let token = token_with(serde_json::json!({"sub": "bob"}));
        let tampered = format!("{}tampered", token);
        let credential = AccessCredential::decode_unverified(tampered).unwrap();
        assert_eq!(credential.subject(), "bob");
    }

    #[test]
    fn test_empty_token() {
        assert_eq!(
            AccessCredential::decode_unverified(String::new()).unwrap_err(),
            CredentialError::Missing
        );
        assert_eq!(
            AccessCredential::decode_unverified("  \n".to_string()).unwrap_err(),
            CredentialError::Missing
        );
    }

    #[test]
    fn test_malformed_tokens() {
        for bad in ["not-a-token", "a.b", "a.b.c.d", "!!!.###.sig"] {
            let err = AccessCredential::decode_unverified(bad.to_string()).unwrap_err();
            assert!(
                matches!(err, CredentialError::Malformed(_)),
                "{} should be malformed, got {:?}",
                bad,
                err
            );
        }

        // Valid base64 but the payload is a JSON array
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        let token = format!("{}.{}.sig", header, payload);
        assert!(matches!(
            AccessCredential::decode_unverified(token).unwrap_err(),
            CredentialError::Malformed(_)
        ));
    }

    #[test]
    fn test_missing_or_empty_subject() {
        let token = token_with(serde_json::json!({"iss": "https://issuer"}));
        assert_eq!(
            AccessCredential::decode_unverified(token).unwrap_err(),
            CredentialError::MissingSubject
        );

        let token = token_with(serde_json::json!({"sub": ""}));
        assert_eq!(
            AccessCredential::decode_unverified(token).unwrap_err(),
            CredentialError::MissingSubject
        );
    }

    #[test]
    fn test_non_string_subject_is_malformed() {
        let token = token_with(serde_json::json!({"sub": 42}));
        assert!(matches!(
            AccessCredential::decode_unverified(token).unwrap_err(),
            CredentialError::Malformed(_)
        ));
    }

    #[test]
    fn test_padded_segments_accepted() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"carol"}"#);
        let token = format!("{}==.{}=.sig", header, payload);
        let credential = AccessCredential::decode_unverified(token).unwrap();
        assert_eq!(credential.subject(), "carol");
    }

    #[test]
    fn test_expiry() {
        let token = token_with(serde_json::json!({"sub": "dave", "exp": 1_700_000_000}));
        let credential = AccessCredential::decode_unverified(token).unwrap();

        let before = DateTime::from_timestamp(1_600_000_000, 0).unwrap();
        let after = DateTime::from_timestamp(1_800_000_000, 0).unwrap();
        assert!(!credential.is_expired_at(before));
        assert!(credential.is_expired_at(after));

        let token = token_with(serde_json::json!({"sub": "dave"}));
        let credential = AccessCredential::decode_unverified(token).unwrap();
        assert!(!credential.is_expired_at(after));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = token_with(serde_json::json!({"sub": "erin"}));
        let credential = AccessCredential::decode_unverified(token.clone()).unwrap();
        let debug = format!("{:?}", credential);
        assert!(!debug.contains(&token));
    }
}
