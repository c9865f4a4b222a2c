//! Enforcement policy shared by every scheme

use burrow_proto::MessageKind;
use serde::{Deserialize, Serialize};

/// Which control messages must carry valid authentication
///
/// `Login` is always authenticated. Heartbeats and new work connections are
/// only signed and checked when their flag is set; with a flag off the
/// verifier accepts the message whatever its auth fields contain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default)]
    pub authenticate_heartbeats: bool,
    #[serde(default)]
    pub authenticate_new_work_conns: bool,
}

impl BaseConfig {
    pub fn new(authenticate_heartbeats: bool, authenticate_new_work_conns: bool) -> Self {
        Self {
            authenticate_heartbeats,
            authenticate_new_work_conns,
        }
    }

    /// Whether messages of `kind` must be signed and verified
    pub fn requires(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::Login => true,
            MessageKind::Ping => self.authenticate_heartbeats,
            MessageKind::NewWorkConn => self.authenticate_new_work_conns,
        }
    }
}
