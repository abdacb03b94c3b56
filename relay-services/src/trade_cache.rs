//! Trade Cache
//!
//! Namespaced key/value cache with TTL classes. Entries live in memory for
//! lookups and are mirrored into SQLite so a restarted relay can still serve
//! recent trades while the agent is down.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use relay_core::RelayError;

pub const DEFAULT_KEY_PREFIX: &str = "relay:";

/// How long an entry may be served as current
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    /// 5 minutes
    Short,
    /// 1 hour
    Medium,
    /// 1 day
    Long,
    /// Stored for reference only; never served as current data
    None,
}

impl TtlClass {
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            TtlClass::Short => Some(Duration::from_secs(5 * 60)),
            TtlClass::Medium => Some(Duration::from_secs(60 * 60)),
            TtlClass::Long => Some(Duration::from_secs(24 * 60 * 60)),
            TtlClass::None => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TtlClass::Short => "short",
            TtlClass::Medium => "medium",
            TtlClass::Long => "long",
            TtlClass::None => "none",
        }
    }

    fn from_db(s: &str) -> Option<Self> {
        match s {
            "short" => Some(TtlClass::Short),
            "medium" => Some(TtlClass::Medium),
            "long" => Some(TtlClass::Long),
            "none" => Some(TtlClass::None),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradeCacheConfig {
    /// SQLite file; `None` keeps the cache in memory only
    pub db_path: Option<PathBuf>,
    pub key_prefix: String,
}

impl Default for TradeCacheConfig {
    fn default() -> Self {
        Self {
            db_path: Some(PathBuf::from("data/relay-cache.db")),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    ttl_class: TtlClass,
    stored_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl_class.ttl() else {
            return false;
        };
        let age = now.signed_duration_since(self.stored_at);
        age.num_milliseconds() < ttl.as_millis() as i64
    }
}

/// Cache with in-memory + optional SQLite backing
pub struct TradeCache {
    prefix: String,
    entries: RwLock<HashMap<String, CacheEntry>>,
    db: Option<Mutex<Connection>>,
}

impl TradeCache {
    /// Open the cache described by `config`, loading persisted entries
    pub fn new(config: &TradeCacheConfig) -> Result<Self, TradeCacheError> {
        let Some(path) = &config.db_path else {
            return Ok(Self::in_memory(&config.key_prefix));
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    TradeCacheError::Io(format!("Failed to create cache directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn, &config.key_prefix)
    }

    /// Cache without persistence
    pub fn in_memory(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            entries: RwLock::new(HashMap::new()),
            db: None,
        }
    }

    fn with_connection(conn: Connection, prefix: &str) -> Result<Self, TradeCacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                ttl_class TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            );
            "#,
        )?;

        let cache = Self {
            prefix: prefix.to_string(),
            entries: RwLock::new(HashMap::new()),
            db: Some(Mutex::new(conn)),
        };

        let loaded = cache.load_from_db()?;
        info!("Loaded {} cache entries from database", loaded);

        Ok(cache)
    }

    fn load_from_db(&self) -> Result<usize, TradeCacheError> {
        let Some(db) = &self.db else {
            return Ok(0);
        };
        let conn = db.lock();

        let mut stmt = conn.prepare("SELECT key, value, ttl_class, stored_at FROM cache_entries")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: String = row.get(1)?;
            let ttl_class: String = row.get(2)?;
            let stored_at: i64 = row.get(3)?;
            Ok((key, value, ttl_class, stored_at))
        })?;

        let mut entries = self.entries.write();
        let mut loaded = 0;

        for (key, value, ttl_class, stored_at) in rows.flatten() {
            let Some(ttl_class) = TtlClass::from_db(&ttl_class) else {
                warn!("Skipping cache entry {} with unknown ttl class", key);
                continue;
            };
            let stored_at = DateTime::from_timestamp_millis(stored_at).unwrap_or_else(Utc::now);

            entries.insert(
                key,
                CacheEntry {
                    value,
                    ttl_class,
                    stored_at,
                },
            );
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Full storage key for `key`
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Store `value` as JSON under `key`
    pub fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_class: TtlClass,
    ) -> Result<(), TradeCacheError> {
        self.put_json_at(key, value, ttl_class, Utc::now())
    }

    /// Store `value` as if it had been written at `stored_at`
    pub fn put_json_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_class: TtlClass,
        stored_at: DateTime<Utc>,
    ) -> Result<(), TradeCacheError> {
        let full_key = self.namespaced(key);
        let value = serde_json::to_string(value)?;

        if let Some(db) = &self.db {
            db.lock().execute(
                r#"
                INSERT OR REPLACE INTO cache_entries (key, value, ttl_class, stored_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![full_key, value, ttl_class.as_str(), stored_at.timestamp_millis()],
            )?;
        }

        debug!("Cached {} ({})", full_key, ttl_class.as_str());
        self.entries.write().insert(
            full_key,
            CacheEntry {
                value,
                ttl_class,
                stored_at,
            },
        );

        Ok(())
    }

    /// Read a current entry
    ///
    /// Returns `None` for missing keys, expired entries and entries stored
    /// under [`TtlClass::None`].
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, TradeCacheError> {
        let full_key = self.namespaced(key);

        let value = {
            let entries = self.entries.read();
            match entries.get(&full_key) {
                Some(entry) if entry.is_fresh(Utc::now()) => entry.value.clone(),
                Some(entry) => {
                    debug!(
                        "Cache entry {} not current ({})",
                        full_key,
                        entry.ttl_class.as_str()
                    );
                    return Ok(None);
                }
                None => return Ok(None),
            }
        };

        Ok(Some(serde_json::from_str(&value)?))
    }

    pub fn remove(&self, key: &str) -> Result<bool, TradeCacheError> {
        let full_key = self.namespaced(key);

        if let Some(db) = &self.db {
            db.lock()
                .execute("DELETE FROM cache_entries WHERE key = ?1", params![full_key])?;
        }

        Ok(self.entries.write().remove(&full_key).is_some())
    }

    /// Drop every entry that can no longer be served
    pub fn purge_expired(&self) -> Result<usize, TradeCacheError> {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, entry)| entry.ttl_class != TtlClass::None && !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();

        if let Some(db) = &self.db {
            let conn = db.lock();
            for key in &expired {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            }
        }

        let mut entries = self.entries.write();
        for key in &expired {
            entries.remove(key);
        }

        Ok(expired.len())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for TradeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeCache")
            .field("prefix", &self.prefix)
            .field("entries", &self.len())
            .field("persistent", &self.db.is_some())
            .finish()
    }
}

/// Errors from the trade cache
#[derive(Debug, thiserror::Error)]
pub enum TradeCacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<TradeCacheError> for RelayError {
    fn from(e: TradeCacheError) -> Self {
        RelayError::cache(e.to_string())
    }
}
