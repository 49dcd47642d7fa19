//! Error types for layer-storage.

use std::{fmt, io};

// ─── ConfigError ──────────────────────────────────────────────────────────────

/// A configuration problem detected while constructing a [`crate::PeerStorage`].
///
/// These are fatal: the store refuses to start with a config it cannot honour.
#[derive(Debug)]
pub enum ConfigError {
    /// A duration string such as `"6h"` could not be parsed.
    InvalidDuration { key: &'static str, value: String },
    /// Any other field holds a value outside its domain.
    InvalidValue { key: &'static str, value: String },
    /// The database target is unusable (e.g. an empty file path).
    InvalidDialector(String),
    /// The config file could not be read.
    Read(io::Error),
    /// The config file is not valid TOML for [`crate::StorageConfig`].
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDuration { key, value } => write!(f, "invalid duration for {key}: {value:?}"),
            Self::InvalidValue { key, value }    => write!(f, "invalid value for {key}: {value:?}"),
            Self::InvalidDialector(why)          => write!(f, "invalid dialector: {why}"),
            Self::Read(e)                        => write!(f, "reading config file: {e}"),
            Self::Parse(e)                       => write!(f, "parsing config file: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(e) => Some(e),
            _             => None,
        }
    }
}

// ─── StorageError ─────────────────────────────────────────────────────────────

/// The error type returned by fallible [`crate::PeerStorage`] operations.
///
/// Lookups of peers never fail: a missing peer is the zero [`crate::Peer`].
#[derive(Debug)]
pub enum StorageError {
    /// The store was configured incorrectly.
    Config(ConfigError),
    /// SQLite reported an error.
    Sqlite(rusqlite::Error),
    /// The background writer could not be started.
    Io(io::Error),
    /// Session operations need a non-empty phone key.
    MissingPhone,
    /// An exported session string or blob is malformed.
    InvalidSession(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e)         => write!(f, "{e}"),
            Self::Sqlite(e)         => write!(f, "sqlite: {e}"),
            Self::Io(e)             => write!(f, "I/O error: {e}"),
            Self::MissingPhone      => write!(f, "phone number is required"),
            Self::InvalidSession(s) => write!(f, "invalid session: {s}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Sqlite(e) => Some(e),
            Self::Io(e)     => Some(e),
            _               => None,
        }
    }
}

impl From<ConfigError> for StorageError {
    fn from(e: ConfigError) -> Self { Self::Config(e) }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self { Self::Sqlite(e) }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self { Self::Io(e) }
}
