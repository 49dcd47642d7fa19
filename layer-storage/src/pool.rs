//! A small blocking SQLite connection pool.
//!
//! Bounds the number of open connections, keeps a few released ones around
//! for reuse and retires connections past their lifetime or idle time.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rusqlite::{Connection, OpenFlags};

use crate::config::PoolSettings;
use crate::errors::ConfigError;

// ─── Dialector ────────────────────────────────────────────────────────────────

/// Which database the store talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dialector {
    /// A SQLite database file, created if missing.
    Sqlite(PathBuf),
    /// A private in-memory SQLite database that lives as long as the store.
    Memory(String),
}

impl Dialector {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::Sqlite(path.into())
    }

    /// A fresh in-memory database with a process-unique name.
    pub fn memory() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        Self::Memory(format!("layer-mem-{}-{n}", std::process::id()))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Sqlite(p) if p.as_os_str().is_empty() => {
                Err(ConfigError::InvalidDialector("empty database path".into()))
            }
            Self::Memory(name) if name.is_empty() || name.contains(['?', '&', '#']) => {
                Err(ConfigError::InvalidDialector(format!("bad in-memory database name {name:?}")))
            }
            _ => Ok(()),
        }
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = match self {
            Self::Sqlite(path) => Connection::open(path)?,
            Self::Memory(name) => Connection::open_with_flags(
                format!("file:{name}?mode=memory&cache=shared"),
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI,
            )?,
        };
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }
}

// ─── Pool ─────────────────────────────────────────────────────────────────────

struct IdleConn {
    conn:       Connection,
    created:    Instant,
    idle_since: Instant,
}

struct PoolState {
    idle: Vec<IdleConn>,
    open: usize,
}

pub(crate) struct Pool {
    dialector:     Dialector,
    max_open:      usize,
    max_idle:      usize,
    max_lifetime:  Duration,
    max_idle_time: Duration,
    state:         Mutex<PoolState>,
    available:     Condvar,
    /// Keeps a shared in-memory database alive while every pooled connection
    /// is closed.
    _anchor:       Option<Mutex<Connection>>,
}

impl Pool {
    pub(crate) fn new(dialector: Dialector, settings: &PoolSettings) -> rusqlite::Result<Self> {
        let (max_open, anchor) = match &dialector {
            // Shared-cache connections to one in-memory database lock each
            // other at table level, so they are used one at a time.
            Dialector::Memory(_) => (1, Some(Mutex::new(dialector.connect()?))),
            Dialector::Sqlite(_) => (settings.max_open, None),
        };
        Ok(Self {
            dialector,
            max_open,
            max_idle:      settings.max_idle,
            max_lifetime:  settings.max_lifetime,
            max_idle_time: settings.max_idle_time,
            state:         Mutex::new(PoolState { idle: Vec::new(), open: 0 }),
            available:     Condvar::new(),
            _anchor:       anchor,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn too_old(&self, created: Instant) -> bool {
        !self.max_lifetime.is_zero() && created.elapsed() >= self.max_lifetime
    }

    fn stale(&self, idle: &IdleConn) -> bool {
        self.too_old(idle.created)
            || (!self.max_idle_time.is_zero() && idle.idle_since.elapsed() >= self.max_idle_time)
    }

    /// Check out a connection, blocking while `max_open` are in use.
    pub(crate) fn get(&self) -> rusqlite::Result<PooledConnection<'_>> {
        let mut state = self.lock();
        loop {
            while let Some(idle) = state.idle.pop() {
                if self.stale(&idle) {
                    state.open -= 1;
                    continue;
                }
                return Ok(PooledConnection { pool: self, conn: Some(idle.conn), created: idle.created });
            }

            if self.max_open == 0 || state.open < self.max_open {
                state.open += 1;
                drop(state);
                return match self.dialector.connect() {
                    Ok(conn) => Ok(PooledConnection { pool: self, conn: Some(conn), created: Instant::now() }),
                    Err(e) => {
                        self.lock().open -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }

            state = self.available.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self, conn: Connection, created: Instant) {
        let mut state = self.lock();
        if state.idle.len() < self.max_idle && !self.too_old(created) {
            state.idle.push(IdleConn { conn, created, idle_since: Instant::now() });
        } else {
            state.open -= 1;
            drop(conn);
        }
        drop(state);
        self.available.notify_one();
    }

    #[cfg(test)]
    fn open_count(&self) -> usize {
        self.lock().open
    }
}

// ─── PooledConnection ─────────────────────────────────────────────────────────

/// A checked-out connection; goes back to the pool on drop.
pub(crate) struct PooledConnection<'a> {
    pool:    &'a Pool,
    conn:    Option<Connection>,
    created: Instant,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.created);
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbLogLevel;

    fn settings(max_open: usize, max_idle: usize, lifetime: Duration) -> PoolSettings {
        PoolSettings {
            max_open,
            max_idle,
            max_lifetime:  lifetime,
            max_idle_time: Duration::ZERO,
            log_level:     DbLogLevel::Silent,
            table_prefix:  String::new(),
        }
    }

    #[test]
    fn reuses_idle_connection() {
        let dir  = tempfile::tempdir().unwrap();
        let pool = Pool::new(Dialector::sqlite(dir.path().join("p.db")), &settings(4, 2, Duration::ZERO)).unwrap();
        {
            let a = pool.get().unwrap();
            a.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }
        assert_eq!(pool.open_count(), 1);
        let _b = pool.get().unwrap();
        assert_eq!(pool.open_count(), 1, "released connection should be reused");
    }

    #[test]
    fn closes_beyond_max_idle() {
        let dir  = tempfile::tempdir().unwrap();
        let pool = Pool::new(Dialector::sqlite(dir.path().join("p.db")), &settings(4, 1, Duration::ZERO)).unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_eq!(pool.open_count(), 2);
        drop(a);
        drop(b);
        assert_eq!(pool.open_count(), 1);
    }

    #[test]
    fn retires_connections_past_lifetime() {
        let dir  = tempfile::tempdir().unwrap();
        let pool = Pool::new(Dialector::sqlite(dir.path().join("p.db")), &settings(4, 4, Duration::from_millis(10))).unwrap();
        drop(pool.get().unwrap());
        std::thread::sleep(Duration::from_millis(20));
        let _c = pool.get().unwrap();
        assert_eq!(pool.open_count(), 1, "stale idle connection must be replaced, not kept");
    }

    #[test]
    fn empty_path_is_invalid() {
        assert!(Dialector::sqlite("").validate().is_err());
        assert!(Dialector::memory().validate().is_ok());
    }
}
