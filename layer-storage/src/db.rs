//! SQLite persistence for peers and sessions.
//!
//! Two tables, both optionally prefixed:
//!
//! ```sql
//! peer    (id INTEGER PRIMARY KEY, access_hash, type, username)
//! session (id INTEGER PRIMARY KEY, version, phone UNIQUE, data BLOB)
//! ```

use rusqlite::{OptionalExtension, TransactionBehavior, params};

use crate::config::{DbLogLevel, PoolSettings};
use crate::errors::StorageError;
use crate::peer::{Peer, PeerType};
use crate::pool::{Dialector, Pool};
use crate::session::Session;

pub(crate) struct Database {
    pool:          Pool,
    peer_table:    String,
    session_table: String,
    log_level:     DbLogLevel,
}

impl Database {
    /// Open the database and create the tables if they do not exist.
    pub(crate) fn open(dialector: Dialector, settings: &PoolSettings) -> Result<Self, StorageError> {
        dialector.validate()?;
        let file_backed = matches!(dialector, Dialector::Sqlite(_));
        let db = Self {
            pool:          Pool::new(dialector, settings)?,
            peer_table:    format!("{}peer", settings.table_prefix),
            session_table: format!("{}session", settings.table_prefix),
            log_level:     settings.log_level,
        };

        let conn = db.pool.get()?;
        if file_backed {
            // journal_mode returns a row, so it cannot go through execute().
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {peer} (
                id          INTEGER PRIMARY KEY,
                access_hash INTEGER NOT NULL DEFAULT 0,
                type        INTEGER NOT NULL DEFAULT 0,
                username    TEXT    NOT NULL DEFAULT '' COLLATE NOCASE
            );
            CREATE INDEX IF NOT EXISTS {peer}_username ON {peer} (username);
            CREATE TABLE IF NOT EXISTS {session} (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                version INTEGER NOT NULL DEFAULT 0,
                phone   TEXT    NOT NULL UNIQUE,
                data    BLOB
            );",
            peer    = db.peer_table,
            session = db.session_table,
        ))?;
        drop(conn);

        tracing::debug!("[layer] storage tables ready ({}, {})", db.peer_table, db.session_table);
        Ok(db)
    }

    fn trace(&self, sql: &str) {
        if self.log_level >= DbLogLevel::Info {
            tracing::info!("[layer] sql: {sql}");
        }
    }

    fn report<T>(&self, what: &str, res: rusqlite::Result<T>) -> Result<T, StorageError> {
        if let Err(e) = &res {
            match self.log_level {
                DbLogLevel::Silent => {}
                DbLogLevel::Error  => tracing::error!("[layer] {what} failed: {e}"),
                _                  => tracing::warn!("[layer] {what} failed: {e}"),
            }
        }
        res.map_err(StorageError::from)
    }

    // ── peers ─────────────────────────────────────────────────────────────

    /// Insert or overwrite one peer row.
    pub(crate) fn save_peer(&self, peer: &Peer) -> Result<(), StorageError> {
        let sql = format!(
            "INSERT INTO {} (id, access_hash, type, username) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                access_hash = excluded.access_hash,
                type        = excluded.type,
                username    = excluded.username",
            self.peer_table
        );
        self.trace(&sql);
        let res = (|| {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(&sql, params![peer.id, peer.access_hash, peer.peer_type.as_i64(), peer.username])?;
            tx.commit()
        })();
        self.report("save peer", res)
    }

    pub(crate) fn peer_by_id(&self, id: i64) -> Result<Option<Peer>, StorageError> {
        let sql = format!("SELECT id, access_hash, type, username FROM {} WHERE id = ?1", self.peer_table);
        self.trace(&sql);
        let res = (|| {
            let conn = self.pool.get()?;
            conn.query_row(&sql, params![id], peer_from_row).optional()
        })();
        self.report("load peer", res)
    }

    /// Case-insensitive lookup; a leading `@` is ignored.
    pub(crate) fn peer_by_username(&self, username: &str) -> Result<Option<Peer>, StorageError> {
        let username = username.trim_start_matches('@');
        if username.is_empty() {
            return Ok(None);
        }
        let sql = format!(
            "SELECT id, access_hash, type, username FROM {} WHERE username = ?1 LIMIT 1",
            self.peer_table
        );
        self.trace(&sql);
        let res = (|| {
            let conn = self.pool.get()?;
            conn.query_row(&sql, params![username], peer_from_row).optional()
        })();
        self.report("load peer by username", res)
    }

    // ── sessions ──────────────────────────────────────────────────────────

    /// Upsert by phone. Reads the existing row id and writes in one
    /// transaction so concurrent callers cannot create two rows.
    pub(crate) fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let select = format!("SELECT id FROM {} WHERE phone = ?1", self.session_table);
        let update = format!("UPDATE {} SET version = ?1, data = ?2 WHERE id = ?3", self.session_table);
        let insert = format!("INSERT INTO {} (version, phone, data) VALUES (?1, ?2, ?3)", self.session_table);
        self.trace(&select);
        let res = (|| {
            let mut conn = self.pool.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<i64> = tx.query_row(&select, params![session.phone], |r| r.get(0)).optional()?;
            match existing {
                Some(id) => {
                    self.trace(&update);
                    tx.execute(&update, params![session.version, session.data, id])?;
                }
                None => {
                    self.trace(&insert);
                    tx.execute(&insert, params![session.version, session.phone, session.data])?;
                }
            }
            tx.commit()
        })();
        self.report("save session", res)
    }

    pub(crate) fn session(&self, phone: &str) -> Result<Option<Session>, StorageError> {
        let sql = format!("SELECT id, version, phone, data FROM {} WHERE phone = ?1", self.session_table);
        self.trace(&sql);
        let res = (|| {
            let conn = self.pool.get()?;
            conn.query_row(&sql, params![phone], session_from_row).optional()
        })();
        self.report("load session", res)
    }

    pub(crate) fn sessions(&self) -> Result<Vec<Session>, StorageError> {
        let sql = format!("SELECT id, version, phone, data FROM {} ORDER BY id", self.session_table);
        self.trace(&sql);
        let res = (|| {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], session_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })();
        self.report("list sessions", res)
    }

    /// Returns whether a row was removed.
    pub(crate) fn delete_session(&self, phone: &str) -> Result<bool, StorageError> {
        let sql = format!("DELETE FROM {} WHERE phone = ?1", self.session_table);
        self.trace(&sql);
        let res = (|| {
            let conn = self.pool.get()?;
            conn.execute(&sql, params![phone])
        })();
        self.report("delete session", res).map(|n| n > 0)
    }
}

fn peer_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Peer> {
    Ok(Peer {
        id:          row.get(0)?,
        access_hash: row.get(1)?,
        peer_type:   PeerType::from_i64(row.get(2)?),
        username:    row.get(3)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let data: Option<Vec<u8>> = row.get(3)?;
    Ok(Session {
        id:      row.get(0)?,
        version: row.get(1)?,
        phone:   row.get(2)?,
        data:    data.unwrap_or_default(),
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    fn memory_db(prefix: &str) -> Database {
        let cfg = DatabaseConfig { table_prefix: prefix.into(), ..Default::default() };
        Database::open(Dialector::memory(), &cfg.resolve().unwrap()).unwrap()
    }

    #[test]
    fn peer_upsert_overwrites() {
        let db = memory_db("");
        db.save_peer(&Peer { id: 5, access_hash: 1, peer_type: PeerType::User, username: "bob".into() }).unwrap();
        db.save_peer(&Peer { id: 5, access_hash: 2, peer_type: PeerType::User, username: "bobby".into() }).unwrap();
        let p = db.peer_by_id(5).unwrap().unwrap();
        assert_eq!(p.access_hash, 2);
        assert_eq!(p.username, "bobby");
        assert!(db.peer_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let db = memory_db("t1_");
        db.save_peer(&Peer { id: 9, access_hash: 3, peer_type: PeerType::Channel, username: "News".into() }).unwrap();
        assert_eq!(db.peer_by_username("@news").unwrap().map(|p| p.id), Some(9));
        assert!(db.peer_by_username("").unwrap().is_none());
    }

    #[test]
    fn session_rows_are_unique_per_phone() {
        let db = memory_db("");
        db.save_session(&Session::new("+1", vec![1])).unwrap();
        db.save_session(&Session::new("+1", vec![2, 3])).unwrap();
        let all = db.sessions().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data, vec![2, 3]);
        assert!(db.delete_session("+1").unwrap());
        assert!(!db.delete_session("+1").unwrap());
    }
}
