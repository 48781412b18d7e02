//! Session bootstrap
//!
//! Turns an access token and the active profile into a namespaced, logged-in
//! [`Session`]. A bad token fails here, before any request leaves the process.

use chrono::Utc;
use tracing::{info, warn};

use ai4os_core::IdentityProfile;

use crate::credential::{token_from_env, AccessCredential, CredentialError};
use crate::vault::{Authenticator, Namespace, Session, VaultError};

/// Decode the credential, derive the namespace and log in.
///
/// `token` is the raw value of `ACCESS_TOKEN`, `None` when unset.
pub fn open_session<A: Authenticator>(
    auth: &A,
    profile: &IdentityProfile,
    token: Option<String>,
) -> Result<Session<A::Store>, VaultError> {
    let credential = match token {
        Some(token) => AccessCredential::decode_unverified(token)?,
        None => return Err(CredentialError::Missing.into()),
    };

    let namespace = Namespace::for_subject(credential.subject())?;

    if credential.is_expired_at(Utc::now()) {
        warn!("Access token looks expired; Vault will most likely reject it");
    }

    let store = auth.login(profile, &credential)?;
    info!(namespace = %namespace, "Authenticated session established");

    Ok(Session::new(store, namespace, profile.mount_point.clone()))
}

/// [`open_session`] with the token taken from `ACCESS_TOKEN`
pub fn open_session_from_env<A: Authenticator>(
    auth: &A,
    profile: &IdentityProfile,
) -> Result<Session<A::Store>, VaultError> {
    open_session(auth, profile, token_from_env()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::tests::token_with;
    use crate::vault::tests::{demo_record, MemoryStore};
    use crate::credential::CREDENTIAL_ENV;
    use ai4os_core::ProfileName;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;

    /// Records login calls and either accepts or rejects them
    struct RecordingAuth {
        accept: bool,
        calls: Cell<usize>,
        seen: RefCell<Vec<(String, String, String)>>,
    }

    impl RecordingAuth {
        fn accepting() -> Self {
            Self {
                accept: true,
                calls: Cell::new(0),
                seen: RefCell::new(vec![]),
            }
        }

        fn rejecting() -> Self {
            Self {
                accept: false,
                ..Self::accepting()
            }
        }
    }

    impl Authenticator for RecordingAuth {
        type Store = MemoryStore;

        fn login(
            &self,
            profile: &IdentityProfile,
            credential: &AccessCredential,
        ) -> Result<MemoryStore, VaultError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push((
                profile.auth_path.clone(),
                profile.role.clone(),
                credential.expose_token().to_string(),
            ));

            if self.accept {
                Ok(MemoryStore::default())
            } else {
                Err(VaultError::Authentication("role \"\" could not be found".to_string()))
            }
        }
    }

    fn alice_token() -> String {
        token_with(serde_json::json!({"sub": "alice123", "iss": "https://aai.egi.eu"}))
    }

    #[test]
    fn test_namespace_from_subject() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiProduction.builtin();

        let session = open_session(&auth, &profile, Some(alice_token())).unwrap();

        assert_eq!(session.namespace().as_str(), "users/alice123/");
        assert_eq!(session.mount_point(), "/secrets/");
    }

    #[test]
    fn test_login_uses_profile_and_raw_token() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiDemo.builtin();
        let token = alice_token();

        open_session(&auth, &profile, Some(token.clone())).unwrap();

        assert_eq!(auth.calls.get(), 1);
        assert_eq!(
            auth.seen.borrow()[0],
            ("jwt-egi-demo".to_string(), String::new(), token)
        );
    }

    #[test]
    fn test_bad_credential_never_logs_in() {
        let profile = ProfileName::EgiProduction.builtin();
        let no_subject = token_with(serde_json::json!({"iss": "https://aai.egi.eu"}));

        for token in [
            None,
            Some(String::new()),
            Some("garbage".to_string()),
            Some("a.b.c".to_string()),
            Some(no_subject),
        ] {
            let auth = RecordingAuth::accepting();
            let result = open_session(&auth, &profile, token.clone());

            assert!(
                matches!(result, Err(VaultError::InvalidCredential(_))),
                "{:?} should be rejected",
                token
            );
            assert_eq!(auth.calls.get(), 0, "login must not run for {:?}", token);
        }
    }

    #[test]
    fn test_missing_token_reported_as_missing() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiProduction.builtin();

        let result = open_session(&auth, &profile, None);
        assert!(matches!(
            result,
            Err(VaultError::InvalidCredential(CredentialError::Missing))
        ));
    }

    #[test]
    fn test_traversal_subject_never_logs_in() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiProduction.builtin();
        let token = token_with(serde_json::json!({"sub": "x/../../bob"}));

        let result = open_session(&auth, &profile, Some(token));

        assert!(matches!(
            result,
            Err(VaultError::InvalidCredential(CredentialError::Malformed(_)))
        ));
        assert_eq!(auth.calls.get(), 0);
    }

    // The only test touching ACCESS_TOKEN; keep every case here so parallel
    // tests never race on the variable.
    #[test]
    fn test_open_session_from_env() {
        let profile = ProfileName::EgiProduction.builtin();

        std::env::remove_var(CREDENTIAL_ENV);
        let auth = RecordingAuth::accepting();
        assert!(matches!(
            open_session_from_env(&auth, &profile),
            Err(VaultError::InvalidCredential(CredentialError::Missing))
        ));

        std::env::set_var(CREDENTIAL_ENV, alice_token());
        let session = open_session_from_env(&auth, &profile).unwrap();
        assert_eq!(session.namespace().as_str(), "users/alice123/");
        assert_eq!(auth.calls.get(), 1);

        #[cfg(unix)]
        {
            use std::ffi::OsString;
            use std::os::unix::ffi::OsStringExt;

            std::env::set_var(CREDENTIAL_ENV, OsString::from_vec(vec![0x66, 0xff, 0x6f]));
            let auth = RecordingAuth::accepting();
            assert!(matches!(
                open_session_from_env(&auth, &profile),
                Err(VaultError::InvalidCredential(CredentialError::Malformed(_)))
            ));
            assert_eq!(auth.calls.get(), 0);
        }

        std::env::remove_var(CREDENTIAL_ENV);
    }

    #[test]
    fn test_rejected_login_surfaces_once() {
        let auth = RecordingAuth::rejecting();
        let profile = ProfileName::EgiProduction.builtin();

        let result = open_session(&auth, &profile, Some(alice_token()));

        assert!(matches!(result, Err(VaultError::Authentication(_))));
        assert_eq!(auth.calls.get(), 1);
    }

    #[test]
    fn test_expired_token_still_attempts_login() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiProduction.builtin();
        let token = token_with(serde_json::json!({"sub": "alice123", "exp": 1_000_000}));

        assert!(open_session(&auth, &profile, Some(token)).is_ok());
        assert_eq!(auth.calls.get(), 1);
    }

    #[test]
    fn test_walkthrough() {
        let auth = RecordingAuth::accepting();
        let profile = ProfileName::EgiProduction.builtin();
        let session = open_session(&auth, &profile, Some(alice_token())).unwrap();

        session.upsert("test01", &demo_record()).unwrap();
        session.upsert("test02", &demo_record()).unwrap();

        let listed: BTreeSet<String> = session.list(None).unwrap().into_iter().collect();
        assert_eq!(
            listed,
            BTreeSet::from(["test01".to_string(), "test02".to_string()])
        );

        assert_eq!(session.read("test01").unwrap(), demo_record());

        session.delete("test01").unwrap();
        assert!(matches!(session.read("test01"), Err(VaultError::NotFound(_))));
    }
}
