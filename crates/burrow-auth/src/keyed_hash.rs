//! Keyed-hash proofs derived from a shared secret and a timestamp
//!
//! The proof is HMAC-SHA256 keyed with the secret over the decimal timestamp,
//! hex encoded. Only the proof travels on the wire.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of an encoded proof: 32 MAC bytes as lower-case hex
pub const PROOF_LEN: usize = 64;

/// Keyed MAC over the decimal timestamp
///
/// HMAC pads or hashes the key to the block size, so `new_from_slice` only
/// fails for fixed-size-key MACs and cannot fail here.
fn mac_for(secret: &str, timestamp: i64) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac
}

/// Derive the privilege key for `timestamp`
///
/// # Example
/// ```
/// use burrow_auth::keyed_hash::{auth_key, verify_auth_key};
///
/// let key = auth_key("s3cr3t", 1700000000);
/// assert_eq!(key.len(), 64);
/// assert!(verify_auth_key("s3cr3t", 1700000000, &key));
/// assert!(!verify_auth_key("s3cr3t", 1700000001, &key));
/// ```
pub fn auth_key(secret: &str, timestamp: i64) -> String {
    hex::encode(mac_for(secret, timestamp).finalize().into_bytes())
}

/// Check `proof` against the key derived for `timestamp` in constant time
///
/// Only the exact encoding produced by [`auth_key`] is accepted; upper-case
/// or mixed-case hex is rejected.
pub fn verify_auth_key(secret: &str, timestamp: i64, proof: &str) -> bool {
    if !is_canonical_proof(proof) {
        return false;
    }
    let Ok(proof) = hex::decode(proof) else {
        return false;
    };
    mac_for(secret, timestamp).verify_slice(&proof).is_ok()
}

fn is_canonical_proof(proof: &str) -> bool {
    proof.len() == PROOF_LEN && proof.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}
