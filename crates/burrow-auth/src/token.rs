//! Shared-secret token scheme
//!
//! Client and server are configured with the same secret. Each signed message
//! carries `privilege_key = auth_key(secret, timestamp)`; the server recomputes
//! it from the message timestamp. There is no freshness window, so a captured
//! message verifies for as long as the secret is unchanged.

use async_trait::async_trait;
use burrow_proto::{AuthFields, Login, NewWorkConn, Ping, SignedMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::keyed_hash::{auth_key, unix_now, verify_auth_key};
use crate::policy::BaseConfig;
use crate::{AuthSetter, AuthVerifier};

/// Credentials for the token scheme
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Shared secret used to derive privilege keys
    #[serde(default)]
    pub token: String,
    /// Optional user name stamped on signed messages
    #[serde(default)]
    pub auth_user: String,
}

impl TokenConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            auth_user: String::new(),
        }
    }

    pub fn with_auth_user(mut self, auth_user: impl Into<String>) -> Self {
        self.auth_user = auth_user.into();
        self
    }
}

/// Signs and verifies control messages with a shared secret
pub struct TokenAuth {
    base: BaseConfig,
    config: TokenConfig,
}

impl TokenAuth {
    pub fn new(base: BaseConfig, config: TokenConfig) -> Self {
        Self { base, config }
    }

    pub fn base(&self) -> &BaseConfig {
        &self.base
    }

    fn stamp(&self, auth: &mut AuthFields) {
        auth.privilege_key = auth_key(&self.config.token, auth.timestamp);
        // Kept for peers that still read the raw field
        auth.token = self.config.token.clone();
        auth.auth_user = self.config.auth_user.clone();
    }

    /// Stamp a heartbeat or work connection with a fresh timestamp
    fn sign_now<M: SignedMessage>(&self, msg: &mut M) {
        if !self.base.requires(M::KIND) {
            return;
        }
        let auth = msg.auth_mut();
        auth.timestamp = unix_now();
        self.stamp(auth);
    }

    fn check<M: SignedMessage>(&self, msg: &M) -> Result<(), AuthError> {
        if !self.base.requires(M::KIND) {
            return Ok(());
        }

        let auth = msg.auth();
        if verify_auth_key(&self.config.token, auth.timestamp, &auth.privilege_key) {
            debug!("Token auth: valid {} (timestamp {})", M::KIND, auth.timestamp);
            Ok(())
        } else {
            warn!(
                "Token auth: invalid privilege key in {} (timestamp {})",
                M::KIND,
                auth.timestamp
            );
            Err(AuthError::Mismatch { kind: M::KIND })
        }
    }
}

impl AuthSetter for TokenAuth {
    fn set_login(&self, login: &mut Login) -> Result<(), AuthError> {
        // Login keeps the caller's timestamp
        self.stamp(&mut login.auth);
        Ok(())
    }

    fn set_ping(&self, ping: &mut Ping) -> Result<(), AuthError> {
        self.sign_now(ping);
        Ok(())
    }

    fn set_new_work_conn(&self, conn: &mut NewWorkConn) -> Result<(), AuthError> {
        self.sign_now(conn);
        Ok(())
    }
}

#[async_trait]
impl AuthVerifier for TokenAuth {
    async fn verify_login(&self, login: &Login) -> Result<(), AuthError> {
        self.check(login)
    }

    async fn verify_ping(&self, ping: &Ping) -> Result<(), AuthError> {
        self.check(ping)
    }

    async fn verify_new_work_conn(&self, conn: &NewWorkConn) -> Result<(), AuthError> {
        self.check(conn)
    }
}
