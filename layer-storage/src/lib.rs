//! # layer-storage
//!
//! Peer directory and session store for `layer-dispatch`.
//!
//! ## Features
//! - Peer directory: id → access hash, type and username, so every request
//!   can address a user, chat or channel
//! - TTL cache in front of SQLite with periodic sweep and sliding expiry
//! - Non-blocking peer writes through a bounded queue (dropped writes are counted)
//! - Cache-only, hybrid and database-only modes
//! - One authentication session blob per phone, exportable as a base64 string
//! - Configuration from code, TOML files or `LAYER_*` environment variables
//!
//! Lookups never fail: an unknown peer is the zero [`Peer`] (`id == 0`), and an
//! unknown session is an empty [`Session`].

#![deny(unsafe_code)]

mod cache;
mod config;
mod db;
mod errors;
mod peer;
mod pool;
mod session;
mod storage;
mod writer;

pub use config::{CacheConfig, DatabaseConfig, DbLogLevel, StorageConfig, parse_duration};
pub use errors::{ConfigError, StorageError};
pub use peer::{DEFAULT_ACCESS_HASH, InputPeer, Peer, PeerType};
pub use pool::Dialector;
pub use session::{LATEST_VERSION, Session};
pub use storage::{PeerStorage, StorageStats};
