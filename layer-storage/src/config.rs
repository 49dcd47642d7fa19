//! Storage configuration.
//!
//! [`StorageConfig`] carries every knob of the peer cache and the SQLite pool.
//! Durations are Go-style strings (`"6h"`, `"30m"`, `"1h30m"`, `"250ms"`) so
//! the same values can come from a TOML file or from `LAYER_*` environment
//! variables. They are parsed once, when the store is opened; a malformed value
//! aborts construction.
//!
//! ```toml
//! [cache]
//! enabled        = true
//! in_memory_only = false
//! time_to_live   = "6h"
//! clean_interval = "24h"
//!
//! [database]
//! max_open_conns = 8
//! log_level      = "warn"
//! table_prefix   = "bot1_"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::ConfigError;

// ─── CacheConfig ──────────────────────────────────────────────────────────────

/// Settings of the in-process peer cache.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Put a cache in front of the database.
    pub enabled:        bool,
    /// Keep peers only in the cache; no database is opened.
    ///
    /// Only honoured when `enabled` is set.
    pub in_memory_only: bool,
    /// How long an entry stays valid. `"0"` disables expiry.
    pub time_to_live:   String,
    /// How often expired entries are swept out. `"0"` disables sweeping.
    pub clean_interval: String,
    /// Extend an entry's lifetime every time it is read.
    pub revalidate:     bool,
    /// Capacity reserved up front.
    pub initial_size:   usize,
    /// Bound of the background peer-write queue.
    pub write_queue:    usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled:        true,
            in_memory_only: false,
            time_to_live:   "6h".into(),
            clean_interval: "24h".into(),
            revalidate:     true,
            initial_size:   1000,
            write_queue:    1024,
        }
    }
}

// ─── DatabaseConfig ───────────────────────────────────────────────────────────

/// Settings of the SQLite connection pool.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Upper bound of simultaneously open connections (`0` = unbounded).
    pub max_open_conns:     usize,
    /// How many released connections are kept for reuse.
    pub max_idle_conns:     usize,
    /// Connections older than this are closed on release. `"0"` = forever.
    pub conn_max_lifetime:  String,
    /// Idle connections unused for this long are closed. `"0"` = forever.
    pub conn_max_idle_time: String,
    /// One of `silent`, `error`, `warn`, `info`.
    pub log_level:          String,
    /// Prepended to the `peer` and `session` table names.
    pub table_prefix:       String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_open_conns:     100,
            max_idle_conns:     10,
            conn_max_lifetime:  "1h".into(),
            conn_max_idle_time: "30m".into(),
            log_level:          "silent".into(),
            table_prefix:       String::new(),
        }
    }
}

// ─── StorageConfig ────────────────────────────────────────────────────────────

/// Complete configuration of a [`crate::PeerStorage`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache:    CacheConfig,
    pub database: DatabaseConfig,
}

impl StorageConfig {
    /// Cache-only configuration: nothing is written to disk.
    pub fn in_memory() -> Self {
        Self {
            cache: CacheConfig { in_memory_only: true, ..Default::default() },
            ..Default::default()
        }
    }

    /// Defaults overridden by `LAYER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Load a TOML file, then let `LAYER_*` environment variables override it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
        let mut cfg = Self::from_toml(&text)?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    ///
    /// Recognised names: `LAYER_CACHE_ENABLED`, `LAYER_CACHE_IN_MEMORY_ONLY`,
    /// `LAYER_CACHE_TTL`, `LAYER_CACHE_CLEAN_INTERVAL`, `LAYER_CACHE_REVALIDATE`,
    /// `LAYER_CACHE_INITIAL_SIZE`, `LAYER_CACHE_WRITE_QUEUE`,
    /// `LAYER_DB_MAX_OPEN_CONNS`, `LAYER_DB_MAX_IDLE_CONNS`,
    /// `LAYER_DB_CONN_MAX_LIFETIME`, `LAYER_DB_CONN_MAX_IDLE_TIME`,
    /// `LAYER_DB_LOG_LEVEL`, `LAYER_DB_TABLE_PREFIX`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let c = &mut self.cache;
        if let Some(v) = lookup("LAYER_CACHE_ENABLED")        { c.enabled        = parse_bool("LAYER_CACHE_ENABLED", &v)?; }
        if let Some(v) = lookup("LAYER_CACHE_IN_MEMORY_ONLY") { c.in_memory_only = parse_bool("LAYER_CACHE_IN_MEMORY_ONLY", &v)?; }
        if let Some(v) = lookup("LAYER_CACHE_TTL")            { c.time_to_live   = v; }
        if let Some(v) = lookup("LAYER_CACHE_CLEAN_INTERVAL") { c.clean_interval = v; }
        if let Some(v) = lookup("LAYER_CACHE_REVALIDATE")     { c.revalidate     = parse_bool("LAYER_CACHE_REVALIDATE", &v)?; }
        if let Some(v) = lookup("LAYER_CACHE_INITIAL_SIZE")   { c.initial_size   = parse_usize("LAYER_CACHE_INITIAL_SIZE", &v)?; }
        if let Some(v) = lookup("LAYER_CACHE_WRITE_QUEUE")    { c.write_queue    = parse_usize("LAYER_CACHE_WRITE_QUEUE", &v)?; }

        let d = &mut self.database;
        if let Some(v) = lookup("LAYER_DB_MAX_OPEN_CONNS")      { d.max_open_conns     = parse_usize("LAYER_DB_MAX_OPEN_CONNS", &v)?; }
        if let Some(v) = lookup("LAYER_DB_MAX_IDLE_CONNS")      { d.max_idle_conns     = parse_usize("LAYER_DB_MAX_IDLE_CONNS", &v)?; }
        if let Some(v) = lookup("LAYER_DB_CONN_MAX_LIFETIME")   { d.conn_max_lifetime  = v; }
        if let Some(v) = lookup("LAYER_DB_CONN_MAX_IDLE_TIME")  { d.conn_max_idle_time = v; }
        if let Some(v) = lookup("LAYER_DB_LOG_LEVEL")           { d.log_level          = v; }
        if let Some(v) = lookup("LAYER_DB_TABLE_PREFIX")        { d.table_prefix       = v; }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on"  => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value: value.to_string() }),
    }
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue { key, value: value.to_string() })
}

// ─── Durations ────────────────────────────────────────────────────────────────

/// Parse a Go-style duration: one or more `<number><unit>` pairs, units
/// `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`. `"0"` is the zero duration.
///
/// Returns `None` for anything else, including negative values.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if s.is_empty() {
        return None;
    }

    let mut rest  = s;
    let mut nanos = 0f64;
    while !rest.is_empty() {
        let num_len = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns"        => 1.0,
            "us" | "µs" => 1e3,
            "ms"        => 1e6,
            "s"         => 1e9,
            "m"         => 60e9,
            "h"         => 3600e9,
            _           => return None,
        };
        rest = &rest[unit_len..];
        nanos += value * scale;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

fn duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration { key, value: value.to_string() })
}

// ─── Resolved settings ────────────────────────────────────────────────────────

/// [`CacheConfig`] with its durations parsed.
#[derive(Clone, Debug)]
pub(crate) struct CacheSettings {
    pub(crate) ttl:            Duration,
    pub(crate) clean_interval: Duration,
    pub(crate) revalidate:     bool,
    pub(crate) initial_size:   usize,
    pub(crate) write_queue:    usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl:            Duration::from_secs(6 * 3600),
            clean_interval: Duration::from_secs(24 * 3600),
            revalidate:     true,
            initial_size:   1000,
            write_queue:    1024,
        }
    }
}

impl CacheConfig {
    pub(crate) fn resolve(&self) -> Result<CacheSettings, ConfigError> {
        if self.write_queue == 0 {
            return Err(ConfigError::InvalidValue { key: "cache.write_queue", value: "0".into() });
        }
        Ok(CacheSettings {
            ttl:            duration("cache.time_to_live", &self.time_to_live)?,
            clean_interval: duration("cache.clean_interval", &self.clean_interval)?,
            revalidate:     self.revalidate,
            initial_size:   self.initial_size,
            write_queue:    self.write_queue,
        })
    }
}

/// Verbosity of SQL logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DbLogLevel {
    #[default]
    Silent,
    Error,
    Warn,
    Info,
}

impl DbLogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "silent" => Some(Self::Silent),
            "error"       => Some(Self::Error),
            "warn"        => Some(Self::Warn),
            "info"        => Some(Self::Info),
            _             => None,
        }
    }
}

/// [`DatabaseConfig`] with its durations and log level parsed.
#[derive(Clone, Debug)]
pub(crate) struct PoolSettings {
    pub(crate) max_open:      usize,
    pub(crate) max_idle:      usize,
    pub(crate) max_lifetime:  Duration,
    pub(crate) max_idle_time: Duration,
    pub(crate) log_level:     DbLogLevel,
    pub(crate) table_prefix:  String,
}

impl DatabaseConfig {
    pub(crate) fn resolve(&self) -> Result<PoolSettings, ConfigError> {
        let log_level = DbLogLevel::parse(&self.log_level).ok_or_else(|| ConfigError::InvalidValue {
            key:   "database.log_level",
            value: self.log_level.clone(),
        })?;
        // The prefix is spliced into SQL, so only identifier characters pass.
        if !self.table_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidValue {
                key:   "database.table_prefix",
                value: self.table_prefix.clone(),
            });
        }
        Ok(PoolSettings {
            max_open:      self.max_open_conns,
            max_idle:      self.max_idle_conns,
            max_lifetime:  duration("database.conn_max_lifetime", &self.conn_max_lifetime)?,
            max_idle_time: duration("database.conn_max_idle_time", &self.conn_max_idle_time)?,
            log_level,
            table_prefix:  self.table_prefix.clone(),
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
