//! Deduplication of repeated assignment and bandit log events.
//!
//! Every non-default evaluation produces an [`AssignmentCacheEntry`]; the
//! cache decides whether an identical event was already logged for that
//! subject+flag. Backends differ only in their eviction policy: none, TTL
//! expiry, or fixed-capacity LRU (for server-side use across many subjects).
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

/// Identifies what was assigned. Two entries with the same key but different
/// values must be re-logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentCacheValue {
    /// An ordinary flag assignment.
    Variation {
        #[allow(missing_docs)]
        allocation_key: String,
        #[allow(missing_docs)]
        variation_key: String,
    },
    /// A bandit action selection.
    Bandit {
        #[allow(missing_docs)]
        bandit_key: String,
        #[allow(missing_docs)]
        action_key: String,
    },
}

/// A candidate log event, identified by subject+flag and the assigned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentCacheEntry {
    #[allow(missing_docs)]
    pub subject_key: String,
    #[allow(missing_docs)]
    pub flag_key: String,
    #[allow(missing_docs)]
    pub value: AssignmentCacheValue,
}

impl AssignmentCacheEntry {
    fn cache_key(&self) -> String {
        format!("{};{}", self.subject_key, self.flag_key)
    }

    /// Content hash of the value identifier. Entry equality is governed by
    /// this hash, not by object identity.
    fn value_digest(&self) -> [u8; 16] {
        let identifier = match &self.value {
            AssignmentCacheValue::Variation {
                allocation_key,
                variation_key,
            } => format!("variation:{allocation_key};{variation_key}"),
            AssignmentCacheValue::Bandit {
                bandit_key,
                action_key,
            } => format!("bandit:{bandit_key};{action_key}"),
        };
        md5::compute(identifier).0
    }
}

/// Decides whether an assignment event should be forwarded to the logger.
///
/// Implementations record the entry as a side effect of returning `true`, and
/// must be internally thread-safe: concurrent evaluations may race on the
/// same key.
pub trait AssignmentCache: Send + Sync {
    /// Returns `true` (and records the entry) if no prior entry exists for
    /// the entry's subject+flag, or if the prior value identifier differs.
    /// Returns `false` on an identical repeat.
    fn should_log(&self, entry: &AssignmentCacheEntry) -> bool;
}

/// Unbounded cache. Suitable for single-user clients where the number of
/// flags bounds memory.
#[derive(Default)]
pub struct NonExpiringAssignmentCache {
    entries: Mutex<HashMap<String, [u8; 16]>>,
}

impl NonExpiringAssignmentCache {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssignmentCache for NonExpiringAssignmentCache {
    fn should_log(&self, entry: &AssignmentCacheEntry) -> bool {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding assignment cache lock should not panic");
        let digest = entry.value_digest();
        entries.insert(entry.cache_key(), digest) != Some(digest)
    }
}

/// Cache whose entries expire after a fixed time-to-live, bounding memory and
/// re-logging long-lived assignments periodically.
pub struct ExpiringAssignmentCache {
    entries: Mutex<HashMap<String, ([u8; 16], Instant)>>,
    ttl: Duration,
}

impl ExpiringAssignmentCache {
    #[allow(missing_docs)]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl AssignmentCache for ExpiringAssignmentCache {
    fn should_log(&self, entry: &AssignmentCacheEntry) -> bool {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding assignment cache lock should not panic");
        let digest = entry.value_digest();
        let now = Instant::now();
        match entries.entry(entry.cache_key()) {
            Entry::Occupied(mut slot) => {
                let (prior_digest, logged_at) = *slot.get();
                if prior_digest == digest && now.duration_since(logged_at) < self.ttl {
                    // The stored timestamp is the time of the last *log*, not
                    // the last check: refreshing it here would let frequent
                    // dedup hits push expiry out indefinitely.
                    false
                } else {
                    slot.insert((digest, now));
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert((digest, now));
                true
            }
        }
    }
}

/// Fixed-capacity cache evicting least-recently-used entries. Suitable for
/// shared server-side clients evaluating many subjects.
pub struct LruAssignmentCache {
    entries: Mutex<LruCache<String, [u8; 16]>>,
}

impl LruAssignmentCache {
    #[allow(missing_docs)]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl AssignmentCache for LruAssignmentCache {
    fn should_log(&self, entry: &AssignmentCacheEntry) -> bool {
        let mut entries = self
            .entries
            .lock()
            .expect("thread holding assignment cache lock should not panic");
        let digest = entry.value_digest();
        entries.put(entry.cache_key(), digest) != Some(digest)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;
    use std::time::Duration;

    use super::{
        AssignmentCache, AssignmentCacheEntry, AssignmentCacheValue, ExpiringAssignmentCache,
        LruAssignmentCache, NonExpiringAssignmentCache,
    };

    fn entry(subject: &str, variation: &str) -> AssignmentCacheEntry {
        AssignmentCacheEntry {
            subject_key: subject.to_owned(),
            flag_key: "flag".to_owned(),
            value: AssignmentCacheValue::Variation {
                allocation_key: "allocation".to_owned(),
                variation_key: variation.to_owned(),
            },
        }
    }

    #[test]
    fn logs_once_per_identical_entry() {
        let cache = NonExpiringAssignmentCache::new();
        assert!(cache.should_log(&entry("alice", "on")));
        assert!(!cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn relogs_when_value_changes() {
        let cache = NonExpiringAssignmentCache::new();
        assert!(cache.should_log(&entry("alice", "on")));
        assert!(cache.should_log(&entry("alice", "off")));
        assert!(!cache.should_log(&entry("alice", "off")));
        // Flipping back is a change again.
        assert!(cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn bandit_and_variation_values_are_distinct() {
        let cache = NonExpiringAssignmentCache::new();
        assert!(cache.should_log(&entry("alice", "on")));
        assert!(cache.should_log(&AssignmentCacheEntry {
            subject_key: "alice".to_owned(),
            flag_key: "flag".to_owned(),
            value: AssignmentCacheValue::Bandit {
                bandit_key: "bandit".to_owned(),
                action_key: "action".to_owned(),
            },
        }));
    }

    #[test]
    fn expired_entries_are_relogged() {
        let cache = ExpiringAssignmentCache::new(Duration::ZERO);
        assert!(cache.should_log(&entry("alice", "on")));
        // Zero TTL: the entry is immediately stale.
        assert!(cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn unexpired_entries_are_deduplicated() {
        let cache = ExpiringAssignmentCache::new(Duration::from_secs(600));
        assert!(cache.should_log(&entry("alice", "on")));
        assert!(!cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn dedup_checks_do_not_extend_the_ttl() {
        let cache = ExpiringAssignmentCache::new(Duration::from_millis(50));
        assert!(cache.should_log(&entry("alice", "on")));

        // A mid-TTL check is deduplicated and must not count as a new log:
        // expiry stays anchored to the original log time.
        std::thread::sleep(Duration::from_millis(30));
        assert!(!cache.should_log(&entry("alice", "on")));

        std::thread::sleep(Duration::from_millis(30));
        assert!(cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = LruAssignmentCache::new(NonZeroUsize::new(1).unwrap());
        assert!(cache.should_log(&entry("alice", "on")));
        // Second subject evicts the first.
        assert!(cache.should_log(&entry("bob", "on")));
        // First subject was evicted, so it gets logged again.
        assert!(cache.should_log(&entry("alice", "on")));
    }

    #[test]
    fn lru_within_capacity_deduplicates() {
        let cache = LruAssignmentCache::new(NonZeroUsize::new(10).unwrap());
        assert!(cache.should_log(&entry("alice", "on")));
        assert!(cache.should_log(&entry("bob", "on")));
        assert!(!cache.should_log(&entry("alice", "on")));
        assert!(!cache.should_log(&entry("bob", "on")));
    }
}
