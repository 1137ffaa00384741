//! In-memory evidence store.
//!
//! TTL-keyed map suitable for tests and single-process deployments. Expiry is
//! measured against the injected clock so tests can cross TTL boundaries
//! without sleeping. Production deployments implement [`EvidenceStore`] over
//! a networked cache with the same semantics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EvidenceStore, Result};
use crate::clock::Clock;

enum Entry {
    Value {
        value: serde_json::Value,
        expires_at_ms: i64,
    },
    /// Set members with per-member expiry; membership means "seen within TTL".
    Set(HashMap<String, i64>),
}

pub struct MemoryEvidenceStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryEvidenceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_ms().saturating_add(ttl.as_millis() as i64)
    }

    /// Drop expired values and set members.
    pub async fn cleanup_expired(&self) {
        let now = self.clock.now_ms();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| match entry {
            Entry::Value { expires_at_ms, .. } => *expires_at_ms > now,
            Entry::Set(members) => {
                members.retain(|_, expires| *expires > now);
                !members.is_empty()
            }
        });
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|entry| match entry {
                Entry::Value { expires_at_ms, .. } => *expires_at_ms > now,
                Entry::Set(members) => members.values().any(|expires| *expires > now),
            })
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EvidenceStore for MemoryEvidenceStore {
    async fn put_with_ttl(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<()> {
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry::Value {
                value,
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(Entry::Value {
                value,
                expires_at_ms,
            }) if *expires_at_ms > now => Some(value.clone()),
            _ => None,
        })
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<bool> {
        let now = self.clock.now_ms();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(Entry::Value {
                expires_at_ms: existing,
                ..
            }) if *existing > now => Ok(false),
            Some(Entry::Set(_)) => Ok(false),
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry::Value {
                        value,
                        expires_at_ms,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn append_set_member(&self, key: &str, member: &str, ttl: Duration) -> Result<()> {
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Set(HashMap::new()));
        match entry {
            Entry::Set(members) => {
                members.insert(member.to_string(), expires_at_ms);
            }
            Entry::Value { .. } => {
                // Key collision between value and set namespaces; the key
                // scheme keeps them disjoint, so replace outright.
                let mut members = HashMap::new();
                members.insert(member.to_string(), expires_at_ms);
                *entry = Entry::Set(members);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            Some(Entry::Set(members)) => {
                let mut live: Vec<String> = members
                    .iter()
                    .filter(|(_, expires)| **expires > now)
                    .map(|(member, _)| member.clone())
                    .collect();
                live.sort();
                live
            }
            _ => Vec::new(),
        })
    }
}
