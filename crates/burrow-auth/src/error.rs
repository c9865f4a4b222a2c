//! Authentication errors

use burrow_proto::MessageKind;
use thiserror::Error;

/// Errors surfaced by auth setters, verifiers and their construction
///
/// The connection handler rejects the message (and usually the connection)
/// on any variant; none of them is retried by the caller.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed credential configuration, raised at startup
    #[error("Invalid auth configuration: {0}")]
    Config(String),

    /// Proof or cached token does not match the message content
    #[error("Token in {kind} doesn't match token from configuration")]
    Mismatch { kind: MessageKind },

    /// The remote authority could not confirm the identity
    #[error("User token in {kind} could not be verified by the remote authority")]
    RemoteVerification { kind: MessageKind },
}

impl AuthError {
    pub fn config(msg: impl Into<String>) -> Self {
        AuthError::Config(msg.into())
    }

    /// Message kind this error was raised for, if any
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            AuthError::Config(_) => None,
            AuthError::Mismatch { kind } | AuthError::RemoteVerification { kind } => Some(*kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_message_kind() {
        let err = AuthError::Mismatch {
            kind: MessageKind::Ping,
        };
        assert_eq!(
            err.to_string(),
            "Token in heartbeat doesn't match token from configuration"
        );

        let err = AuthError::RemoteVerification {
            kind: MessageKind::NewWorkConn,
        };
        assert!(err.to_string().contains("new work connection"));
        assert_eq!(err.kind(), Some(MessageKind::NewWorkConn));
    }

    #[test]
    fn test_config_error_has_no_kind() {
        let err = AuthError::config("auth_user is required");
        assert_eq!(err.kind(), None);
        assert!(err.to_string().contains("auth_user is required"));
    }
}
