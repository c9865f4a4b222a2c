//! Identity cache for the user-token scheme
//!
//! Holds user/token pairs the remote authority has already confirmed so that
//! later messages from the same user skip the network round trip. Entries are
//! never expired; the cache lives as long as the server that owns it.

use burrow_proto::UserIdentity;
use dashmap::DashMap;

/// Concurrent username -> verified identity map
///
/// Share it between verifiers with `Arc<IdentityCache>`. Two concurrent misses
/// for the same user both reach the authority and the later insert wins.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: DashMap<String, UserIdentity>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<UserIdentity> {
        self.entries.get(username).map(|entry| entry.value().clone())
    }

    /// Compare `token` with the cached token for `username`
    ///
    /// Returns `None` on a cache miss.
    pub fn check(&self, username: &str, token: &str) -> Option<bool> {
        self.entries
            .get(username)
            .map(|entry| entry.value().token == token)
    }

    /// Insert or replace the entry keyed by `identity.username`
    pub fn insert(&self, identity: UserIdentity) {
        self.entries.insert(identity.username.clone(), identity);
    }

    pub fn remove(&self, username: &str) -> Option<UserIdentity> {
        self.entries.remove(username).map(|(_, identity)| identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
