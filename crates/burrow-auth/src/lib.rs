//! Control-plane authentication for burrow tunnels
//!
//! Clients sign `Login`, `Ping` and `NewWorkConn` before sending them; servers
//! verify the same messages on receipt. Two schemes are provided:
//!
//! - **token**: client and server share a secret; messages carry a keyed-hash
//!   proof derived from it and a timestamp ([`TokenAuth`]).
//! - **user_token**: messages carry a user/token pair that the server checks
//!   with a remote authority over HTTP, optionally caching confirmed
//!   identities ([`UserTokenAuth`]).
//!
//! `Login` is always authenticated. Heartbeats and work connections are only
//! authenticated when enabled in [`BaseConfig`].
//!
//! # Usage
//!
//! ```ignore
//! use burrow_auth::{AuthConfig, ClientAuth, ServerAuth};
//! use burrow_proto::Login;
//!
//! let config = AuthConfig::load(Path::new("auth.yml"))?;
//!
//! // Client side
//! let client = ClientAuth::from_config(&config)?;
//! let mut login = Login::new(String::new(), timestamp);
//! client.set_login(&mut login)?;
//!
//! // Server side
//! let server = ServerAuth::from_config(&config, None)?;
//! server.verify_login(&login).await?;
//! ```
//!
//! # Extensibility
//!
//! Implement [`AuthSetter`] and [`AuthVerifier`] and wrap them with
//! [`ClientAuth::with_setter`] / [`ServerAuth::with_verifier`].

pub mod cache;
pub mod config;
pub mod error;
pub mod keyed_hash;
pub mod policy;
pub mod remote;
pub mod token;
pub mod user_token;

pub use cache::IdentityCache;
pub use config::{AuthConfig, AuthMethod};
pub use error::AuthError;
pub use policy::BaseConfig;
pub use remote::{
    HttpAuthority, HttpAuthorityConfig, IdentityAuthority, RemoteError, RetryPolicy,
};
pub use token::{TokenAuth, TokenConfig};
pub use user_token::{UserTokenAuth, UserTokenConfig};

// Re-export useful types
pub use async_trait::async_trait;

use burrow_proto::{Login, NewWorkConn, Ping};
use std::sync::Arc;
use tracing::{debug, info};

/// Client-side capability: stamp auth fields onto outgoing messages
///
/// `set_login` always stamps. `set_ping` and `set_new_work_conn` are no-ops
/// returning `Ok` when the policy does not require those messages to be
/// authenticated.
pub trait AuthSetter: Send + Sync {
    fn set_login(&self, login: &mut Login) -> Result<(), AuthError>;

    fn set_ping(&self, ping: &mut Ping) -> Result<(), AuthError>;

    fn set_new_work_conn(&self, conn: &mut NewWorkConn) -> Result<(), AuthError>;
}

/// Server-side capability: accept or reject incoming messages
///
/// Verification may perform network I/O, including retry backoff, so do not
/// hold locks across these calls.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Always checks the login
    async fn verify_login(&self, login: &Login) -> Result<(), AuthError>;

    /// Accepts any heartbeat when heartbeats are not authenticated
    async fn verify_ping(&self, ping: &Ping) -> Result<(), AuthError>;

    /// Accepts any work connection when work connections are not authenticated
    async fn verify_new_work_conn(&self, conn: &NewWorkConn) -> Result<(), AuthError>;
}

/// Signing side selected from configuration
pub struct ClientAuth {
    method: Option<AuthMethod>,
    setter: Box<dyn AuthSetter>,
}

impl ClientAuth {
    /// Build the setter for `config.method`
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        config.validate_for_client()?;

        let setter: Box<dyn AuthSetter> = match config.method {
            AuthMethod::Token => Box::new(TokenAuth::new(config.base(), config.token_config())),
            AuthMethod::UserToken => Box::new(UserTokenAuth::new(
                config.base(),
                config.user_token_config(),
            )),
        };

        debug!("Client auth method: {}", config.method);

        Ok(Self {
            method: Some(config.method),
            setter,
        })
    }

    /// Wrap a custom setter
    pub fn with_setter(setter: Box<dyn AuthSetter>) -> Self {
        Self {
            method: None,
            setter,
        }
    }

    /// Configured method, `None` for custom setters
    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }
}

impl AuthSetter for ClientAuth {
    fn set_login(&self, login: &mut Login) -> Result<(), AuthError> {
        self.setter.set_login(login)
    }

    fn set_ping(&self, ping: &mut Ping) -> Result<(), AuthError> {
        self.setter.set_ping(ping)
    }

    fn set_new_work_conn(&self, conn: &mut NewWorkConn) -> Result<(), AuthError> {
        self.setter.set_new_work_conn(conn)
    }
}

/// Verifying side selected from configuration
///
/// Cheap to clone; clones share the verifier and its identity cache.
#[derive(Clone)]
pub struct ServerAuth {
    method: Option<AuthMethod>,
    verifier: Arc<dyn AuthVerifier>,
}

impl ServerAuth {
    /// Build the verifier for `config.method`
    ///
    /// For `user_token`, `cache` is used when identity caching is enabled; a
    /// fresh cache is created when none is supplied.
    pub fn from_config(
        config: &AuthConfig,
        cache: Option<Arc<IdentityCache>>,
    ) -> Result<Self, AuthError> {
        config.validate_for_server()?;

        let verifier: Arc<dyn AuthVerifier> = match config.method {
            AuthMethod::Token => Arc::new(TokenAuth::new(config.base(), config.token_config())),
            AuthMethod::UserToken => {
                let authority = HttpAuthority::new(&config.http_authority_config())
                    .map_err(|e| AuthError::config(e.to_string()))?;
                info!(
                    "Verifying user tokens against {} (cache: {})",
                    authority.verify_url(),
                    config.cache_identities
                );

                let auth = UserTokenAuth::new(config.base(), config.user_token_config())
                    .with_authority(Arc::new(authority));
                if config.cache_identities {
                    Arc::new(auth.with_cache(cache.unwrap_or_default()))
                } else {
                    Arc::new(auth)
                }
            }
        };

        info!(
            "Server auth method: {} (heartbeats: {}, work conns: {})",
            config.method, config.authenticate_heartbeats, config.authenticate_new_work_conns
        );

        Ok(Self {
            method: Some(config.method),
            verifier,
        })
    }

    /// Wrap a custom verifier
    pub fn with_verifier(verifier: Arc<dyn AuthVerifier>) -> Self {
        Self {
            method: None,
            verifier,
        }
    }

    /// Configured method, `None` for custom verifiers
    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }
}

#[async_trait]
impl AuthVerifier for ServerAuth {
    async fn verify_login(&self, login: &Login) -> Result<(), AuthError> {
        self.verifier.verify_login(login).await
    }

    async fn verify_ping(&self, ping: &Ping) -> Result<(), AuthError> {
        self.verifier.verify_ping(ping).await
    }

    async fn verify_new_work_conn(&self, conn: &NewWorkConn) -> Result<(), AuthError> {
        self.verifier.verify_new_work_conn(conn).await
    }
}
