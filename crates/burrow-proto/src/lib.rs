//! Control-plane message types
//!
//! This crate defines the control messages exchanged between a tunnel client
//! and server that carry authentication material: `Login`, `Ping` and
//! `NewWorkConn`, plus the `CommonResponse` envelope returned by the remote
//! identity authority.

pub mod messages;

pub use messages::*;

/// Protocol version advertised in `Login`
pub const PROTOCOL_VERSION: &str = "0.1.0";
