//! Protocol message types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Authentication material carried by every signed control message
///
/// Which fields are populated depends on the scheme that signed the message:
/// the token scheme fills `timestamp`, `privilege_key`, `token` and
/// `auth_user`; the user-token scheme fills `auth_user` and `auth_token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthFields {
    /// Unix timestamp (seconds) the proof was derived from
    pub timestamp: i64,
    /// Keyed-hash proof of the shared secret
    pub privilege_key: String,
    /// Raw shared secret (legacy field, never used for verification)
    pub token: String,
    /// User the client authenticates as
    pub auth_user: String,
    /// Credential forwarded to the remote authority
    pub auth_token: String,
}

/// Control message kinds that carry authentication material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Login,
    Ping,
    NewWorkConn,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Login => "login",
            MessageKind::Ping => "heartbeat",
            MessageKind::NewWorkConn => "new work connection",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common access to the auth block of a signed message
pub trait SignedMessage {
    /// Kind of this message
    const KIND: MessageKind;

    fn auth(&self) -> &AuthFields;

    fn auth_mut(&mut self) -> &mut AuthFields;
}

/// First message sent by a client on a new control connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Login {
    pub version: String,
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub user: String,
    /// Empty on first login, set when reconnecting an existing session
    pub run_id: String,
    /// Number of work connections the client keeps warm
    pub pool_count: u32,
    #[serde(flatten)]
    pub auth: AuthFields,
}

impl Login {
    /// Create a login for the running host, stamped with the given timestamp
    pub fn new(run_id: String, timestamp: i64) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION.to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            run_id,
            auth: AuthFields {
                timestamp,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Heartbeat sent periodically on the control connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Ping {
    #[serde(flatten)]
    pub auth: AuthFields,
}

/// Sent by the client when it opens a new work connection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NewWorkConn {
    pub run_id: String,
    #[serde(flatten)]
    pub auth: AuthFields,
}

impl NewWorkConn {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            auth: AuthFields::default(),
        }
    }
}

macro_rules! impl_signed_message {
    ($ty:ty, $kind:expr) => {
        impl SignedMessage for $ty {
            const KIND: MessageKind = $kind;

            fn auth(&self) -> &AuthFields {
                &self.auth
            }

            fn auth_mut(&mut self) -> &mut AuthFields {
                &mut self.auth
            }
        }
    };
}

impl_signed_message!(Login, MessageKind::Login);
impl_signed_message!(Ping, MessageKind::Ping);
impl_signed_message!(NewWorkConn, MessageKind::NewWorkConn);

/// Verified identity returned by the remote authority
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserIdentity {
    pub username: String,
    pub token: String,
}

impl UserIdentity {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

/// Response envelope used by the remote identity authority
///
/// `code == 0` means success; `data` carries the endpoint-specific payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommonResponse {
    pub code: i32,
    pub msg: String,
    pub data: serde_json::Value,
}

impl CommonResponse {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Parse `data` as a user identity
    ///
    /// Returns `Ok(None)` when the payload is absent.
    pub fn identity(&self) -> Result<Option<UserIdentity>, serde_json::Error> {
        if self.data.is_null() {
            return Ok(None);
        }
        serde_json::from_value(self.data.clone()).map(Some)
    }
}
