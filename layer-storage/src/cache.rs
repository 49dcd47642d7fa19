//! Time-to-live map used in front of the peer table.
//!
//! Entries expire `ttl` after they were written or, with `revalidate`, after
//! they were last read. Expired entries are invisible immediately and are
//! physically removed by a sweep that runs at most once per `clean_interval`,
//! piggy-backed on writes.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::CacheSettings;

/// Deadline of entries that never expire.
const NEVER: u64 = u64::MAX;

struct Entry<V> {
    value:      V,
    /// Nanoseconds since the cache epoch. Atomic so reads can slide it under
    /// the shared lock.
    expires_at: AtomicU64,
}

pub(crate) struct TtlCache<K, V> {
    entries:        RwLock<HashMap<K, Entry<V>>>,
    epoch:          Instant,
    ttl:            Duration,
    clean_interval: Duration,
    revalidate:     bool,
    last_sweep:     AtomicU64,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub(crate) fn new(settings: &CacheSettings) -> Self {
        Self {
            entries:        RwLock::new(HashMap::with_capacity(settings.initial_size)),
            epoch:          Instant::now(),
            ttl:            settings.ttl,
            clean_interval: settings.clean_interval,
            revalidate:     settings.revalidate,
            last_sweep:     AtomicU64::new(0),
        }
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_nanos().min(u128::from(NEVER - 1)) as u64
    }

    fn deadline(&self, now: u64) -> u64 {
        if self.ttl.is_zero() {
            return NEVER;
        }
        let ttl = self.ttl.as_nanos().min(u128::from(NEVER)) as u64;
        now.saturating_add(ttl)
    }

    /// Value for `key` if present and not expired.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = map.get(key)?;
        let now = self.now();
        if entry.expires_at.load(Ordering::Acquire) <= now {
            return None;
        }
        if self.revalidate {
            entry.expires_at.store(self.deadline(now), Ordering::Release);
        }
        Some(entry.value.clone())
    }

    /// First live value matching `pred`. Linear in the number of entries.
    pub(crate) fn find(&self, pred: impl Fn(&V) -> bool) -> Option<V> {
        let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let now = self.now();
        let entry = map
            .values()
            .find(|e| e.expires_at.load(Ordering::Acquire) > now && pred(&e.value))?;
        if self.revalidate {
            entry.expires_at.store(self.deadline(now), Ordering::Release);
        }
        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, restarting its lifetime.
    pub(crate) fn insert(&self, key: K, value: V) {
        let now = self.now();
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        map.insert(key, Entry { value, expires_at: AtomicU64::new(self.deadline(now)) });

        if self.clean_interval.is_zero() {
            return;
        }
        let interval = self.clean_interval.as_nanos().min(u128::from(NEVER)) as u64;
        if now.saturating_sub(self.last_sweep.load(Ordering::Relaxed)) >= interval {
            self.last_sweep.store(now, Ordering::Relaxed);
            let before = map.len();
            map.retain(|_, e| e.expires_at.load(Ordering::Acquire) > now);
            let removed = before - map.len();
            if removed > 0 {
                tracing::debug!("[layer] peer cache sweep removed {removed} expired entries");
            }
        }
    }

    /// Store `value` unless a live entry for `key` exists; returns whichever
    /// value the cache holds afterwards.
    ///
    /// Used to populate on a miss: a write that landed between the database
    /// read and this call must win over the older row.
    pub(crate) fn insert_if_vacant(&self, key: K, value: V) -> V {
        let now = self.now();
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(live) = map.get(&key).filter(|e| e.expires_at.load(Ordering::Acquire) > now) {
            return live.value.clone();
        }
        map.insert(key, Entry { value: value.clone(), expires_at: AtomicU64::new(self.deadline(now)) });
        value
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub(crate) fn sweep(&self) -> usize {
        let now = self.now();
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = map.len();
        map.retain(|_, e| e.expires_at.load(Ordering::Acquire) > now);
        self.last_sweep.store(now, Ordering::Relaxed);
        before - map.len()
    }

    /// Number of stored entries, expired ones included until swept.
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
