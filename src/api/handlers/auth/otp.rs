//! Short-lived one-time-code store.
//!
//! Codes are keyed by user id: one outstanding code per user, and a new save
//! supersedes the previous entry. The in-process backing means a restart
//! invalidates outstanding codes, which is acceptable for 5-minute codes.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::utils::constant_time_eq;

pub const DEFAULT_OTP_TTL: Duration = Duration::from_secs(5 * 60);

/// Result of looking up a code. Expired entries are evicted on read.
#[derive(Debug, PartialEq, Eq)]
pub enum OtpLookup {
    Found(String),
    Expired,
    Missing,
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Store a code with a TTL, overwriting any previous entry for the key.
    async fn save(&self, key: Uuid, code: String, ttl: Duration);

    async fn get(&self, key: Uuid) -> OtpLookup;

    /// Compare-and-consume in one step: returns true and removes the entry
    /// only when `candidate` matches the live stored code. The compare and
    /// the remove must not be separable, so two submissions of the same code
    /// cannot both be accepted.
    async fn take_if_matches(&self, key: Uuid, candidate: &str) -> bool;

    /// Remove the entry without consuming it through a match.
    async fn delete(&self, key: Uuid);
}

struct OtpEntry {
    code: String,
    created_at: Instant,
    ttl: Duration,
}

impl OtpEntry {
    fn expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }
}

/// In-process store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryOtpStore {
    entries: Mutex<HashMap<Uuid, OtpEntry>>,
}

impl MemoryOtpStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OtpStore for MemoryOtpStore {
    async fn save(&self, key: Uuid, code: String, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        // Opportunistic sweep keeps the map from accumulating dead entries.
        entries.retain(|_, entry| !entry.expired());
        entries.insert(
            key,
            OtpEntry {
                code,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn get(&self, key: Uuid) -> OtpLookup {
        let mut entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) if entry.expired() => {
                entries.remove(&key);
                OtpLookup::Expired
            }
            Some(entry) => OtpLookup::Found(entry.code.clone()),
            None => OtpLookup::Missing,
        }
    }

    async fn take_if_matches(&self, key: Uuid, candidate: &str) -> bool {
        // The lock spans the compare and the remove; that is what makes the
        // code single-use under concurrent submissions.
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(&key) else {
            return false;
        };
        if entry.expired() {
            entries.remove(&key);
            return false;
        }
        if !constant_time_eq(&entry.code, candidate) {
            return false;
        }
        entries.remove(&key);
        true
    }

    async fn delete(&self, key: Uuid) {
        self.entries.lock().await.remove(&key);
    }
}
