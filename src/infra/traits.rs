//! Trait definition for the evidence store.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::Result;

/// Short-TTL keyed storage for per-identity verification history.
///
/// An in-memory implementation suffices for tests; production is expected to
/// back this with a networked cache. Callers degrade on `Unavailable`:
/// missing history reads mean "no prior data", while the challenge lookup is
/// fail-closed at the call site.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Store a value under a key with an expiry.
    async fn put_with_ttl(&self, key: &str, value: serde_json::Value, ttl: Duration)
        -> Result<()>;

    /// Read a value. `None` means absent or expired.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<()>;

    /// Store a value only if the key is absent. Returns whether the write won.
    ///
    /// This is the commit primitive: two concurrent writers for the same key
    /// see exactly one `true`.
    async fn put_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<bool>;

    /// Add a member to a set key, refreshing that member's expiry.
    ///
    /// Append-to-set semantics: concurrent appends from distinct writers all
    /// land. Membership doubles as "seen within TTL".
    async fn append_set_member(&self, key: &str, member: &str, ttl: Duration) -> Result<()>;

    /// List live members of a set key.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;
}
