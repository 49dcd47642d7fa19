use std::time::{Duration, Instant};

use layer_storage::{
    CacheConfig, DatabaseConfig, Dialector, InputPeer, PeerStorage, PeerType, StorageConfig, StorageError,
};

fn hybrid(cache: CacheConfig) -> PeerStorage {
    let cfg = StorageConfig { cache, database: DatabaseConfig::default() };
    PeerStorage::open(&cfg, Dialector::memory()).unwrap()
}

// ── Coherence ─────────────────────────────────────────────────────────────────

#[test]
fn add_then_get_is_immediately_visible() {
    let store = hybrid(CacheConfig::default());
    store.add_peer(42, 7, PeerType::User, "alice");

    // No flush: the value must come from the cache, not the database.
    let p = store.get_peer_by_id(42);
    assert_eq!(p.id, 42);
    assert_eq!(p.access_hash, 7);
    assert_eq!(p.peer_type, PeerType::User);
    assert_eq!(p.username, "alice");
    assert_eq!(store.stats().db_reads, 0);
}

#[test]
fn unknown_id_is_zero_peer() {
    for store in [PeerStorage::in_memory(), hybrid(CacheConfig::default())] {
        let p = store.get_peer_by_id(999);
        assert_eq!(p.id, 0);
        assert!(p.is_empty());
        assert_eq!(store.get_input_peer_by_id(999), InputPeer::Empty);
    }
}

#[test]
fn id_zero_is_ignored() {
    let store = PeerStorage::in_memory();
    store.add_peer(0, 1, PeerType::User, "nobody");
    assert!(store.get_peer_by_username("nobody").is_empty());
}

#[test]
fn later_add_overwrites() {
    let store = PeerStorage::in_memory();
    store.add_peer(5, 1, PeerType::Channel, "old");
    store.add_peer(5, 2, PeerType::Channel, "new");
    let p = store.get_peer_by_id(5);
    assert_eq!(p.access_hash, 2);
    assert_eq!(p.username, "new");
}

// ── Usernames ─────────────────────────────────────────────────────────────────

#[test]
fn username_lookup_ignores_case_and_at() {
    let store = PeerStorage::in_memory();
    store.add_peer(10, 3, PeerType::User, "Alice");
    assert_eq!(store.get_peer_by_username("@alice").id, 10);
    assert_eq!(store.get_peer_by_username("ALICE").id, 10);
    assert!(store.get_peer_by_username("").is_empty());
    assert!(store.get_peer_by_username("bob").is_empty());
}

#[tokio::test]
async fn username_falls_back_to_database() {
    let cache = CacheConfig { time_to_live: "30ms".into(), clean_interval: "0".into(), revalidate: false, ..Default::default() };
    let store = hybrid(cache);
    store.add_peer(11, 4, PeerType::Channel, "news");
    store.flush().await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    let p = store.get_peer_by_username("news");
    assert_eq!(p.id, 11);
    assert_eq!(store.stats().db_reads, 1);
}

// ── Addressing ────────────────────────────────────────────────────────────────

#[test]
fn input_peer_shape_follows_type() {
    let store = PeerStorage::in_memory();
    store.add_peer(1, 100, PeerType::User, "u");
    store.add_peer(2, 0, PeerType::Chat, "");
    store.add_peer(3, 300, PeerType::Channel, "c");
    store.add_peer(4, 400, PeerType::Unknown, "");

    assert_eq!(store.get_input_peer_by_id(1), InputPeer::User { user_id: 1, access_hash: 100 });
    assert_eq!(store.get_input_peer_by_id(2), InputPeer::Chat { chat_id: 2 });
    assert_eq!(store.get_input_peer_by_username("c"), InputPeer::Channel { channel_id: 3, access_hash: 300 });
    assert_eq!(store.get_input_peer_by_id(4), InputPeer::Empty);
}

// ── Expiry ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_entry_is_reread_from_database() {
    let cache = CacheConfig {
        time_to_live:   "50ms".into(),
        clean_interval: "0".into(),
        revalidate:     false,
        ..Default::default()
    };
    let store = hybrid(cache);
    store.add_peer(42, 7, PeerType::User, "alice");
    store.flush().await;

    assert_eq!(store.get_peer_by_id(42).username, "alice");
    assert_eq!(store.stats().db_reads, 0, "no store read before the TTL");

    tokio::time::sleep(Duration::from_millis(80)).await;
    let p = store.get_peer_by_id(42);
    assert_eq!((p.id, p.access_hash, p.username.as_str()), (42, 7, "alice"));
    assert_eq!(store.stats().db_reads, 1, "exactly one store read after the TTL");

    // Re-populated: the next read is a hit again.
    store.get_peer_by_id(42);
    assert_eq!(store.stats().db_reads, 1);
}

#[test]
fn cache_only_forgets_after_ttl() {
    let cfg = StorageConfig {
        cache: CacheConfig {
            in_memory_only: true,
            time_to_live:   "20ms".into(),
            revalidate:     false,
            ..Default::default()
        },
        ..Default::default()
    };
    let store = PeerStorage::open(&cfg, Dialector::memory()).unwrap();
    assert!(!store.is_persistent());
    store.add_peer(8, 1, PeerType::User, "");
    std::thread::sleep(Duration::from_millis(40));
    assert!(store.get_peer_by_id(8).is_empty());
    assert_eq!(store.sweep_cache(), 1);
}

// ── Persistence ───────────────────────────────────────────────────────────────

#[test]
fn peers_survive_reopen() {
    let dir  = tempfile::tempdir().unwrap();
    let path = dir.path().join("peers.db");
    let cfg  = StorageConfig::default();

    {
        let store = PeerStorage::open(&cfg, Dialector::sqlite(&path)).unwrap();
        store.add_peer(77, 5, PeerType::Channel, "durable");
        // Dropping the last handle drains the write queue.
    }

    let store = PeerStorage::open(&cfg, Dialector::sqlite(&path)).unwrap();
    let p = store.get_peer_by_id(77);
    assert_eq!(p.username, "durable");
    assert_eq!(p.peer_type, PeerType::Channel);
    assert_eq!(store.stats().db_reads, 1);
}

fn database_only() -> StorageConfig {
    StorageConfig {
        cache: CacheConfig { enabled: false, ..Default::default() },
        ..Default::default()
    }
}

#[tokio::test]
async fn database_only_mode_writes_through_queue() {
    let store = PeerStorage::open(&database_only(), Dialector::memory()).unwrap();
    store.add_peer(3, 9, PeerType::User, "direct");
    store.flush().await;
    assert_eq!(store.stats().db_writes, 1);
    assert_eq!(store.stats().pending_writes, 0);
    assert_eq!(store.get_peer_by_id(3).access_hash, 9);
    assert_eq!(store.stats().db_reads, 1);
}

#[tokio::test]
async fn database_only_add_does_not_wait_on_locked_database() {
    let dir  = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.db");
    let store = PeerStorage::open(&database_only(), Dialector::sqlite(&path)).unwrap();

    let other = rusqlite::Connection::open(&path).unwrap();
    other.execute_batch("BEGIN IMMEDIATE").unwrap();

    let started = Instant::now();
    store.add_peer(1, 2, PeerType::User, "queued");
    assert!(started.elapsed() < Duration::from_millis(500), "add_peer took {:?}", started.elapsed());

    other.execute_batch("COMMIT").unwrap();
    store.flush().await;
    assert_eq!(store.get_peer_by_id(1).username, "queued");
}

#[test]
fn table_prefix_is_used() {
    let dir  = tempfile::tempdir().unwrap();
    let path = dir.path().join("prefixed.db");
    let cfg = StorageConfig {
        cache:    CacheConfig { enabled: false, ..Default::default() },
        database: DatabaseConfig { table_prefix: "bot1_".into(), ..Default::default() },
    };
    let store = PeerStorage::open(&cfg, Dialector::sqlite(&path)).unwrap();
    store.add_peer(1, 1, PeerType::User, "x");
    drop(store);

    let conn = rusqlite::Connection::open(&path).unwrap();
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM bot1_peer", [], |r| r.get(0)).unwrap();
    assert_eq!(n, 1);
}

// ── Backpressure ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_queue_drops_and_counts() {
    let store = hybrid(CacheConfig { write_queue: 1, ..Default::default() });
    for id in 1..=200 {
        store.add_peer(id, id, PeerType::User, "");
    }
    store.flush().await;

    let s = store.stats();
    assert_eq!(s.pending_writes, 0);
    assert_eq!(s.db_writes + s.writes_dropped, 200);
    // Every peer is still served from the cache.
    assert_eq!(store.get_peer_by_id(200).access_hash, 200);
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn malformed_duration_is_fatal() {
    let cfg = StorageConfig {
        cache: CacheConfig { time_to_live: "six hours".into(), ..Default::default() },
        ..Default::default()
    };
    let err = PeerStorage::open(&cfg, Dialector::memory()).unwrap_err();
    assert!(matches!(err, StorageError::Config(_)), "{err}");
}

#[test]
fn empty_path_is_fatal() {
    let err = PeerStorage::open(&StorageConfig::default(), Dialector::sqlite("")).unwrap_err();
    assert!(matches!(err, StorageError::Config(_)));
}

#[test]
fn toml_and_env_overrides() {
    let mut cfg = StorageConfig::from_toml(
        r#"
        [cache]
        time_to_live = "1h"

        [database]
        max_open_conns = 4
        "#,
    )
    .unwrap();
    assert_eq!(cfg.cache.time_to_live, "1h");
    assert_eq!(cfg.cache.clean_interval, "24h");
    assert_eq!(cfg.database.max_open_conns, 4);

    cfg.apply_env(|k| match k {
        "LAYER_CACHE_IN_MEMORY_ONLY" => Some("true".into()),
        "LAYER_DB_LOG_LEVEL"         => Some("info".into()),
        _                            => None,
    })
    .unwrap();
    assert!(cfg.cache.in_memory_only);
    assert_eq!(cfg.database.log_level, "info");

    assert!(cfg.apply_env(|k| (k == "LAYER_CACHE_ENABLED").then(|| "maybe".into())).is_err());
}
