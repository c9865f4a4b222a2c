//! Delegated user-token scheme
//!
//! The client forwards its configured `auth_user`/`auth_token` pair as-is. The
//! server does not know any secrets: it asks an [`IdentityAuthority`] whether
//! the pair is valid and, when an [`IdentityCache`] is attached, remembers the
//! confirmed identity for the rest of the process lifetime.

use async_trait::async_trait;
use burrow_proto::{Login, NewWorkConn, Ping, SignedMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::IdentityCache;
use crate::error::AuthError;
use crate::policy::BaseConfig;
use crate::remote::{IdentityAuthority, DEFAULT_AUTH_URL};
use crate::{AuthSetter, AuthVerifier};

/// Credentials for the user-token scheme
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenConfig {
    /// Credential checked by the remote authority
    #[serde(default)]
    pub auth_token: String,
    #[serde(default)]
    pub auth_user: String,
    /// Verification path on the authority
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

impl Default for UserTokenConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            auth_user: String::new(),
            auth_url: default_auth_url(),
        }
    }
}

impl UserTokenConfig {
    pub fn new(auth_user: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            auth_user: auth_user.into(),
            auth_token: auth_token.into(),
            ..Default::default()
        }
    }
}

/// Signs messages with a user/token pair and verifies them remotely
///
/// Built without an authority it can only sign; verification then fails for
/// every user that is not already cached.
pub struct UserTokenAuth {
    base: BaseConfig,
    config: UserTokenConfig,
    authority: Option<Arc<dyn IdentityAuthority>>,
    cache: Option<Arc<IdentityCache>>,
}

impl UserTokenAuth {
    pub fn new(base: BaseConfig, config: UserTokenConfig) -> Self {
        Self {
            base,
            config,
            authority: None,
            cache: None,
        }
    }

    pub fn with_authority(mut self, authority: Arc<dyn IdentityAuthority>) -> Self {
        self.authority = Some(authority);
        self
    }

    pub fn with_cache(mut self, cache: Arc<IdentityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    pub fn cache(&self) -> Option<&Arc<IdentityCache>> {
        self.cache.as_ref()
    }

    fn sign<M: SignedMessage>(&self, msg: &mut M) {
        if !self.base.requires(M::KIND) {
            return;
        }
        let auth = msg.auth_mut();
        auth.auth_user = self.config.auth_user.clone();
        auth.auth_token = self.config.auth_token.clone();
    }

    async fn check<M: SignedMessage + Sync>(&self, msg: &M) -> Result<(), AuthError> {
        let kind = M::KIND;
        if !self.base.requires(kind) {
            return Ok(());
        }

        let auth = msg.auth();
        if auth.auth_user.is_empty() {
            warn!("User token auth: {} carries no auth_user", kind);
            return Err(AuthError::Mismatch { kind });
        }

        if let Some(cache) = &self.cache {
            match cache.check(&auth.auth_user, &auth.auth_token) {
                Some(true) => {
                    debug!(
                        "User token auth: {} for '{}' accepted from cache",
                        kind, auth.auth_user
                    );
                    return Ok(());
                }
                Some(false) => {
                    warn!(
                        "User token auth: token in {} for '{}' differs from cached token",
                        kind, auth.auth_user
                    );
                    return Err(AuthError::Mismatch { kind });
                }
                None => {}
            }
        }

        let Some(authority) = &self.authority else {
            warn!(
                "User token auth: no identity authority configured to verify '{}'",
                auth.auth_user
            );
            return Err(AuthError::RemoteVerification { kind });
        };

        match authority.verify(&auth.auth_user, &auth.auth_token).await {
            Ok(identity) => {
                debug!(
                    "User token auth: {} for '{}' confirmed by authority",
                    kind, auth.auth_user
                );
                if let (Some(cache), Some(identity)) = (&self.cache, identity) {
                    cache.insert(identity);
                }
                Ok(())
            }
            Err(e) => {
                warn!(
                    "User token auth: {} for '{}' rejected: {}",
                    kind, auth.auth_user, e
                );
                Err(AuthError::RemoteVerification { kind })
            }
        }
    }
}

impl AuthSetter for UserTokenAuth {
    fn set_login(&self, login: &mut Login) -> Result<(), AuthError> {
        self.sign(login);
        Ok(())
    }

    fn set_ping(&self, ping: &mut Ping) -> Result<(), AuthError> {
        self.sign(ping);
        Ok(())
    }

    fn set_new_work_conn(&self, conn: &mut NewWorkConn) -> Result<(), AuthError> {
        self.sign(conn);
        Ok(())
    }
}

#[async_trait]
impl AuthVerifier for UserTokenAuth {
    async fn verify_login(&self, login: &Login) -> Result<(), AuthError> {
        self.check(login).await
    }

    async fn verify_ping(&self, ping: &Ping) -> Result<(), AuthError> {
        self.check(ping).await
    }

    async fn verify_new_work_conn(&self, conn: &NewWorkConn) -> Result<(), AuthError> {
        self.check(conn).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockIdentityAuthority, RemoteError};
    use burrow_proto::{MessageKind, UserIdentity};

    fn signed_login(user: &str, token: &str) -> Login {
        let signer = UserTokenAuth::new(BaseConfig::default(), UserTokenConfig::new(user, token));
        let mut login = Login::new(String::new(), 0);
        signer.set_login(&mut login).unwrap();
        login
    }

    fn verifier(
        base: BaseConfig,
        authority: MockIdentityAuthority,
        cache: Option<Arc<IdentityCache>>,
    ) -> UserTokenAuth {
        let auth = UserTokenAuth::new(base, UserTokenConfig::default())
            .with_authority(Arc::new(authority));
        match cache {
            Some(cache) => auth.with_cache(cache),
            None => auth,
        }
    }

    #[test]
    fn test_setter_stamps_user_and_token_only() {
        let login = signed_login("alice", "t-1");

        assert_eq!(login.auth.auth_user, "alice");
        assert_eq!(login.auth.auth_token, "t-1");
        assert!(login.auth.privilege_key.is_empty());
        assert!(login.auth.token.is_empty());
    }

    #[test]
    fn test_setter_respects_policy() {
        let auth = UserTokenAuth::new(
            BaseConfig::new(true, false),
            UserTokenConfig::new("alice", "t-1"),
        );

        let mut ping = Ping::default();
        auth.set_ping(&mut ping).unwrap();
        assert_eq!(ping.auth.auth_user, "alice");

        let mut conn = NewWorkConn::new("run".to_string());
        auth.set_new_work_conn(&mut conn).unwrap();
        assert!(conn.auth.auth_user.is_empty());
        assert!(conn.auth.auth_token.is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_authority() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(0);

        let cache = Arc::new(IdentityCache::new());
        cache.insert(UserIdentity::new("alice", "t-1"));
        let auth = verifier(BaseConfig::default(), authority, Some(cache));

        assert!(auth.verify_login(&signed_login("alice", "t-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_cache_mismatch_rejected_without_authority_call() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(0);

        let cache = Arc::new(IdentityCache::new());
        cache.insert(UserIdentity::new("alice", "t-1"));
        let auth = verifier(BaseConfig::default(), authority, Some(cache));

        let err = auth
            .verify_login(&signed_login("alice", "stolen"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Mismatch {
                kind: MessageKind::Login
            }
        ));
    }

    #[tokio::test]
    async fn test_cache_miss_populates_cache_with_returned_identity() {
        let mut authority = MockIdentityAuthority::new();
        authority
            .expect_verify()
            .withf(|username, token| username == "alice" && token == "t-1")
            .times(1)
            .returning(|_, _| Ok(Some(UserIdentity::new("alice", "t-1-canonical"))));

        let cache = Arc::new(IdentityCache::new());
        let auth = verifier(BaseConfig::default(), authority, Some(cache.clone()));

        assert!(auth.verify_login(&signed_login("alice", "t-1")).await.is_ok());
        assert_eq!(
            cache.get("alice"),
            Some(UserIdentity::new("alice", "t-1-canonical"))
        );
    }

    #[tokio::test]
    async fn test_second_login_served_from_cache() {
        let mut authority = MockIdentityAuthority::new();
        authority
            .expect_verify()
            .times(1)
            .returning(|username, token| Ok(Some(UserIdentity::new(username, token))));

        let cache = Arc::new(IdentityCache::new());
        let auth = verifier(BaseConfig::default(), authority, Some(cache));
        let login = signed_login("alice", "t-1");

        assert!(auth.verify_login(&login).await.is_ok());
        assert!(auth.verify_login(&login).await.is_ok());
    }

    #[tokio::test]
    async fn test_without_cache_every_call_is_remote() {
        let mut authority = MockIdentityAuthority::new();
        authority
            .expect_verify()
            .times(2)
            .returning(|username, token| Ok(Some(UserIdentity::new(username, token))));

        let auth = verifier(BaseConfig::default(), authority, None);
        let login = signed_login("alice", "t-1");

        assert!(auth.verify_login(&login).await.is_ok());
        assert!(auth.verify_login(&login).await.is_ok());
        assert!(auth.cache().is_none());
    }

    #[tokio::test]
    async fn test_success_without_payload_is_not_cached() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(1).returning(|_, _| Ok(None));

        let cache = Arc::new(IdentityCache::new());
        let auth = verifier(BaseConfig::default(), authority, Some(cache.clone()));

        assert!(auth.verify_login(&signed_login("alice", "t-1")).await.is_ok());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_authority_failure_is_single_remote_error() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(1).returning(|_, _| {
            Err(RemoteError::RetriesExhausted {
                attempts: 3,
                last: Box::new(RemoteError::Status(503)),
            })
        });

        let cache = Arc::new(IdentityCache::new());
        let auth = verifier(BaseConfig::new(false, true), authority, Some(cache.clone()));

        let mut conn = NewWorkConn::new("run".to_string());
        conn.auth.auth_user = "alice".to_string();
        conn.auth.auth_token = "t-1".to_string();

        let err = auth.verify_new_work_conn(&conn).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::RemoteVerification {
                kind: MessageKind::NewWorkConn
            }
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_ping_trusted_when_heartbeats_disabled() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(0);

        let auth = verifier(BaseConfig::default(), authority, None);

        assert!(auth.verify_ping(&Ping::default()).await.is_ok());
        assert!(auth
            .verify_new_work_conn(&NewWorkConn::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_missing_user_rejected_locally() {
        let mut authority = MockIdentityAuthority::new();
        authority.expect_verify().times(0);

        let auth = verifier(BaseConfig::new(true, false), authority, None);

        let err = auth.verify_ping(&Ping::default()).await.unwrap_err();
        assert_eq!(err.kind(), Some(MessageKind::Ping));
    }

    #[tokio::test]
    async fn test_no_authority_rejects_cache_miss() {
        let auth = UserTokenAuth::new(BaseConfig::default(), UserTokenConfig::default());

        let err = auth
            .verify_login(&signed_login("alice", "t-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RemoteVerification { .. }));
    }
}
