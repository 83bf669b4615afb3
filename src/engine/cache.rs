//! Result cache with scope-specific TTLs
//!
//! Memoizes computed aggregates as opaque JSON snapshots. A hit is trusted
//! unconditionally until it expires; there is no freshness re-validation
//! beyond TTL expiry. Entries expire atomically: an expired entry is
//! dropped on read and swept on write, never partially invalidated.
//!
//! Cache failures are soft. Callers log and recompute rather than fail
//! (see `AnalyticsService`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Boxed error for cache implementations; callers treat any cache error
/// as `EngineError::CacheUnavailable`.
pub type CacheError = Box<dyn std::error::Error + Send + Sync>;

/// Which aggregate family an entry belongs to; determines its TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    Daily,
    Monthly,
    Portfolio,
}

impl CacheScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheScope::Daily => "daily",
            CacheScope::Monthly => "monthly",
            CacheScope::Portfolio => "portfolio",
        }
    }

    /// TTL table: daily 4h, monthly 24h, fleet portfolio snapshot 5min
    pub fn ttl(&self) -> Duration {
        match self {
            CacheScope::Daily => Duration::from_secs(4 * 60 * 60),
            CacheScope::Monthly => Duration::from_secs(24 * 60 * 60),
            CacheScope::Portfolio => Duration::from_secs(5 * 60),
        }
    }
}

/// Memoization contract used by the read-through callers
pub trait ResultCache: Send + Sync {
    /// Cached snapshot for (scope, node, period), or None on miss/expiry
    fn get(
        &self,
        scope: CacheScope,
        node_id: &str,
        period_key: &str,
    ) -> Result<Option<serde_json::Value>, CacheError>;

    fn put(
        &self,
        scope: CacheScope,
        node_id: &str,
        period_key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

struct StoredEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process cache behind a plain mutex
///
/// Key space is (scope, node_id, period_key). Expired entries are removed
/// on the read that observes them; writes sweep the whole map so the
/// footprint stays bounded by live entries.
pub struct MemoryResultCache {
    entries: Mutex<HashMap<(CacheScope, String, String), StoredEntry>>,
}

impl MemoryResultCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of unexpired entries (test/diagnostic helper)
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache for MemoryResultCache {
    fn get(
        &self,
        scope: CacheScope,
        node_id: &str,
        period_key: &str,
    ) -> Result<Option<serde_json::Value>, CacheError> {
        let key = (scope, node_id.to_string(), period_key.to_string());
        let mut entries = self.entries.lock().unwrap();

        match entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(&key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(
        &self,
        scope: CacheScope,
        node_id: &str,
        period_key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();

        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            (scope, node_id.to_string(), period_key.to_string()),
            StoredEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
