//! In-memory [`KeyValueStore`] used as the test double across the
//! workspace.
//!
//! Single-process only. TTLs are honored lazily: expired keys are purged
//! whenever the store is touched, which is exact enough for tests and for
//! local development without a Redis instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::kv::{KeyValueStore, StoreError};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct SortedSet {
    // Kept ordered by (score, member).
    members: Vec<(f64, String)>,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    sets: HashMap<String, SortedSet>,
}

/// In-process key-value store with the same semantics as [`RedisStore`].
///
/// [`RedisStore`]: crate::RedisStore
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        inner
            .entries
            .retain(|_, e| e.expires_at.map_or(true, |at| now < at));
        inner
            .sets
            .retain(|_, s| s.expires_at.map_or(true, |at| now < at));
        inner
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.entries.contains_key(key) {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().entries.get(key).map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock().entries.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.entries.remove(key);
        inner.sets.remove(key);
        Ok(())
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.entries.get(key).is_some_and(|e| e.value == expected) {
            inner.entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.lock();
        // Redis enumerates keys of every type; match both maps.
        Ok(inner
            .entries
            .keys()
            .chain(inner.sets.keys())
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn sorted_set_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let set = inner.sets.entry(key.to_string()).or_default();
        set.members.retain(|(_, m)| m != member);
        let at = set
            .members
            .iter()
            .position(|(s, m)| (*s, m.as_str()) > (score, member))
            .unwrap_or(set.members.len());
        set.members.insert(at, (score, member.to_string()));
        Ok(())
    }

    async fn sorted_set_pop_min(
        &self,
        key: &str,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        let Some(set) = inner.sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let take = count.min(set.members.len());
        let popped = set.members.drain(..take).map(|(_, m)| m).collect();
        if set.members.is_empty() {
            inner.sets.remove(key);
        }
        Ok(popped)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let at = Instant::now() + ttl;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at = Some(at);
        }
        if let Some(set) = inner.sets.get_mut(key) {
            set.expires_at = Some(at);
        }
        Ok(())
    }
}

/// Glob matching supporting `*` (any run of characters), anchored at both
/// ends. This covers every pattern the coordination layer uses.
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let (first, rest_parts) = parts.split_first().expect("split never yields empty");
    let (last, middle) = rest_parts.split_last().expect("len >= 2");

    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(i) => rest = &rest[i + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
