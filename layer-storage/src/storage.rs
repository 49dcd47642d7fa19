//! [`PeerStorage`]: the peer directory and session store handed to every
//! component that needs to address a peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::cache::TtlCache;
use crate::config::{CacheSettings, StorageConfig};
use crate::db::Database;
use crate::errors::StorageError;
use crate::peer::{InputPeer, Peer, PeerType};
use crate::pool::Dialector;
use crate::session::{LATEST_VERSION, Session};
use crate::writer::{Counters, PeerWriter};

// ─── StorageStats ─────────────────────────────────────────────────────────────

/// Point-in-time counters of a [`PeerStorage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub cache_hits:     u64,
    pub cache_misses:   u64,
    /// Synchronous peer reads that reached the database.
    pub db_reads:       u64,
    /// Peer rows written by the background writer.
    pub db_writes:      u64,
    pub write_failures: u64,
    /// Writes rejected because the queue was full.
    pub writes_dropped: u64,
    /// Writes queued and not yet applied.
    pub pending_writes: usize,
    /// Live and expired-but-unswept cache entries.
    pub cached_peers:   usize,
}

// ─── PeerStorage ──────────────────────────────────────────────────────────────

enum Mode {
    /// Cache enabled, nothing persisted.
    CacheOnly {
        cache:    TtlCache<i64, Peer>,
        sessions: Mutex<HashMap<String, Session>>,
        next_id:  AtomicI64,
    },
    /// Cache in front of the database, peers persisted in the background.
    Hybrid {
        cache:  TtlCache<i64, Peer>,
        writer: PeerWriter,
        db:     Arc<Database>,
    },
    /// No cache; reads go to the database, writes through the queue.
    Direct {
        writer: PeerWriter,
        db:     Arc<Database>,
    },
}

struct Inner {
    mode:  Mode,
    stats: Arc<Counters>,
}

/// Peer directory and session store.
///
/// Cheap to clone; clones share the same cache, database and writer.
/// Peer lookups never fail: a peer that is not known anywhere comes back
/// as the zero [`Peer`] (`id == 0`).
///
/// # Example
/// ```rust,no_run
/// use layer_storage::{Dialector, PeerStorage, PeerType, StorageConfig};
///
/// # fn main() -> Result<(), layer_storage::StorageError> {
/// let store = PeerStorage::open(&StorageConfig::default(), Dialector::sqlite("bot.db"))?;
/// store.add_peer(42, 7, PeerType::User, "alice");
/// assert_eq!(store.get_peer_by_id(42).username, "alice");
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct PeerStorage {
    inner: Arc<Inner>,
}

impl PeerStorage {
    /// Build a store from `config`.
    ///
    /// `dialector` is ignored when the cache is enabled and in-memory only.
    /// Malformed durations, an unusable dialector and SQLite open failures
    /// are reported here; nothing after construction fails for config reasons.
    pub fn open(config: &StorageConfig, dialector: Dialector) -> Result<Self, StorageError> {
        let cache_settings = config.cache.resolve()?;
        let pool_settings  = config.database.resolve()?;
        let stats = Arc::new(Counters::default());

        let mode = match (config.cache.enabled, config.cache.in_memory_only) {
            (true, true) => {
                tracing::debug!("[layer] peer storage: cache only");
                Mode::CacheOnly {
                    cache:    TtlCache::new(&cache_settings),
                    sessions: Mutex::new(HashMap::new()),
                    next_id:  AtomicI64::new(1),
                }
            }
            (true, false) => {
                let db = Arc::new(Database::open(dialector, &pool_settings)?);
                let writer = PeerWriter::spawn(Arc::clone(&db), cache_settings.write_queue, Arc::clone(&stats))?;
                tracing::debug!("[layer] peer storage: cache + database");
                Mode::Hybrid { cache: TtlCache::new(&cache_settings), writer, db }
            }
            (false, _) => {
                let db = Arc::new(Database::open(dialector, &pool_settings)?);
                let writer = PeerWriter::spawn(Arc::clone(&db), cache_settings.write_queue, Arc::clone(&stats))?;
                tracing::debug!("[layer] peer storage: database only");
                Mode::Direct { writer, db }
            }
        };

        Ok(Self { inner: Arc::new(Inner { mode, stats }) })
    }

    /// A throwaway cache-only store with default settings.
    pub fn in_memory() -> Self {
        let cache_settings = CacheSettings::default();
        Self {
            inner: Arc::new(Inner {
                mode: Mode::CacheOnly {
                    cache:    TtlCache::new(&cache_settings),
                    sessions: Mutex::new(HashMap::new()),
                    next_id:  AtomicI64::new(1),
                },
                stats: Arc::new(Counters::default()),
            }),
        }
    }

    /// `true` when peers and sessions survive the process.
    pub fn is_persistent(&self) -> bool {
        !matches!(self.inner.mode, Mode::CacheOnly { .. })
    }

    // ── peers ─────────────────────────────────────────────────────────────

    /// Insert or overwrite a peer.
    ///
    /// The cache is updated before this returns; persistence happens in the
    /// background and its failures are only logged and counted. Without a
    /// cache the peer becomes visible once the writer applied it (see
    /// [`PeerStorage::flush`]). Id 0 is ignored.
    pub fn add_peer(&self, id: i64, access_hash: i64, peer_type: PeerType, username: &str) {
        if id == 0 {
            return;
        }
        let peer = Peer { id, access_hash, peer_type, username: username.to_string() };
        match &self.inner.mode {
            Mode::CacheOnly { cache, .. } => cache.insert(id, peer),
            Mode::Hybrid { cache, writer, .. } => {
                cache.insert(id, peer.clone());
                writer.enqueue(peer);
            }
            Mode::Direct { writer, .. } => writer.enqueue(peer),
        }
    }

    /// The peer with `id`, or the zero [`Peer`].
    pub fn get_peer_by_id(&self, id: i64) -> Peer {
        if id == 0 {
            return Peer::default();
        }
        let stats = &self.inner.stats;
        match &self.inner.mode {
            Mode::CacheOnly { cache, .. } => match cache.get(&id) {
                Some(p) => { Counters::bump(&stats.cache_hits); p }
                None    => { Counters::bump(&stats.cache_misses); Peer::default() }
            },
            Mode::Hybrid { cache, db, .. } => {
                if let Some(p) = cache.get(&id) {
                    Counters::bump(&stats.cache_hits);
                    return p;
                }
                Counters::bump(&stats.cache_misses);
                match self.read(|| db.peer_by_id(id)) {
                    Some(p) => cache.insert_if_vacant(id, p),
                    None    => Peer::default(),
                }
            }
            Mode::Direct { db, .. } => self.read(|| db.peer_by_id(id)).unwrap_or_default(),
        }
    }

    /// The peer whose username matches case-insensitively, or the zero
    /// [`Peer`]. A leading `@` is ignored.
    pub fn get_peer_by_username(&self, username: &str) -> Peer {
        let username = username.trim_start_matches('@');
        if username.is_empty() {
            return Peer::default();
        }
        let stats = &self.inner.stats;
        let matches = |p: &Peer| p.username.eq_ignore_ascii_case(username);
        match &self.inner.mode {
            Mode::CacheOnly { cache, .. } => match cache.find(matches) {
                Some(p) => { Counters::bump(&stats.cache_hits); p }
                None    => { Counters::bump(&stats.cache_misses); Peer::default() }
            },
            Mode::Hybrid { cache, db, .. } => {
                if let Some(p) = cache.find(matches) {
                    Counters::bump(&stats.cache_hits);
                    return p;
                }
                Counters::bump(&stats.cache_misses);
                match self.read(|| db.peer_by_username(username)) {
                    Some(p) => cache.insert_if_vacant(p.id, p),
                    None    => Peer::default(),
                }
            }
            Mode::Direct { db, .. } => self.read(|| db.peer_by_username(username)).unwrap_or_default(),
        }
    }

    pub fn get_input_peer_by_id(&self, id: i64) -> InputPeer {
        self.get_peer_by_id(id).input_peer()
    }

    pub fn get_input_peer_by_username(&self, username: &str) -> InputPeer {
        self.get_peer_by_username(username).input_peer()
    }

    /// A synchronous database read; failures count as "not found".
    fn read(&self, f: impl FnOnce() -> Result<Option<Peer>, StorageError>) -> Option<Peer> {
        Counters::bump(&self.inner.stats.db_reads);
        match f() {
            Ok(p)  => p,
            Err(e) => {
                tracing::warn!("[layer] peer lookup failed: {e}");
                None
            }
        }
    }

    // ── sessions ──────────────────────────────────────────────────────────

    /// Insert or overwrite the session stored under `session.phone`.
    pub fn update_session(&self, session: &Session) -> Result<(), StorageError> {
        if session.phone.is_empty() {
            return Err(StorageError::MissingPhone);
        }
        match &self.inner.mode {
            Mode::CacheOnly { sessions, next_id, .. } => {
                let mut map = sessions.lock().unwrap_or_else(PoisonError::into_inner);
                let id = match map.get(&session.phone) {
                    Some(existing) => existing.id,
                    None           => next_id.fetch_add(1, Ordering::Relaxed),
                };
                map.insert(session.phone.clone(), Session { id, ..session.clone() });
                Ok(())
            }
            Mode::Hybrid { db, .. } | Mode::Direct { db, .. } => db.save_session(session),
        }
    }

    /// The session stored under `phone`.
    ///
    /// Returns an empty session (`id == 0`, no data, latest version) when
    /// none was stored yet.
    pub fn get_session(&self, phone: &str) -> Result<Session, StorageError> {
        if phone.is_empty() {
            return Err(StorageError::MissingPhone);
        }
        let found = match &self.inner.mode {
            Mode::CacheOnly { sessions, .. } => {
                sessions.lock().unwrap_or_else(PoisonError::into_inner).get(phone).cloned()
            }
            Mode::Hybrid { db, .. } | Mode::Direct { db, .. } => db.session(phone)?,
        };
        Ok(found.unwrap_or_else(|| Session {
            id:      0,
            version: LATEST_VERSION,
            phone:   phone.to_string(),
            data:    Vec::new(),
        }))
    }

    /// Remove the session stored under `phone`. Returns whether one existed.
    pub fn delete_session(&self, phone: &str) -> Result<bool, StorageError> {
        if phone.is_empty() {
            return Err(StorageError::MissingPhone);
        }
        match &self.inner.mode {
            Mode::CacheOnly { sessions, .. } => Ok(sessions
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(phone)
                .is_some()),
            Mode::Hybrid { db, .. } | Mode::Direct { db, .. } => db.delete_session(phone),
        }
    }

    /// Every stored session, oldest first.
    pub fn get_all_sessions(&self) -> Result<Vec<Session>, StorageError> {
        match &self.inner.mode {
            Mode::CacheOnly { sessions, .. } => {
                let mut all: Vec<Session> = sessions
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .cloned()
                    .collect();
                all.sort_by_key(|s| s.id);
                Ok(all)
            }
            Mode::Hybrid { db, .. } | Mode::Direct { db, .. } => db.sessions(),
        }
    }

    // ── housekeeping ──────────────────────────────────────────────────────

    pub fn stats(&self) -> StorageStats {
        let c = &self.inner.stats;
        let load = |a: &std::sync::atomic::AtomicU64| a.load(Ordering::Relaxed);
        let (pending_writes, cached_peers) = match &self.inner.mode {
            Mode::CacheOnly { cache, .. }      => (0, cache.len()),
            Mode::Hybrid { cache, writer, .. } => (writer.pending(), cache.len()),
            Mode::Direct { writer, .. }        => (writer.pending(), 0),
        };
        StorageStats {
            cache_hits:     load(&c.cache_hits),
            cache_misses:   load(&c.cache_misses),
            db_reads:       load(&c.db_reads),
            db_writes:      load(&c.db_writes),
            write_failures: load(&c.write_failures),
            writes_dropped: load(&c.writes_dropped),
            pending_writes,
            cached_peers,
        }
    }

    /// Drop expired cache entries now instead of waiting for the next sweep.
    pub fn sweep_cache(&self) -> usize {
        match &self.inner.mode {
            Mode::CacheOnly { cache, .. } | Mode::Hybrid { cache, .. } => cache.sweep(),
            Mode::Direct { .. } => 0,
        }
    }

    /// Wait until every peer write queued so far has reached the database.
    pub async fn flush(&self) {
        match &self.inner.mode {
            Mode::Hybrid { writer, .. } | Mode::Direct { writer, .. } => writer.flush().await,
            Mode::CacheOnly { .. } => {}
        }
    }
}

impl std::fmt::Debug for PeerStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.inner.mode {
            Mode::CacheOnly { .. } => "cache-only",
            Mode::Hybrid { .. }    => "hybrid",
            Mode::Direct { .. }    => "direct",
        };
        f.debug_struct("PeerStorage").field("mode", &mode).finish()
    }
}
