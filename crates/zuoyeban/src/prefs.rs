//! Board preferences and the key-value stores that persist them.
//!
//! Preferences are stored as strings under fixed keys, the way the board's
//! browser front end used to keep them in cookies. [`Preferences`] is the
//! typed view: missing or unreadable values fall back to their defaults.

use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db;
use crate::error::PreferenceError;

pub const REFRESH_INTERVAL_KEY: &str = "refresh_interval";
pub const FONT_SIZE_KEY: &str = "font_size";
pub const HIDE_EXPIRED_KEY: &str = "hide_expired";
pub const DELETE_BUTTON_KEY: &str = "delete_button";
pub const EDIT_BUTTON_KEY: &str = "edit_button";
pub const QUICK_PUBLISH_KEY: &str = "quick_publish";

/// Every key written by [`Preferences::save`]
pub const ALL_KEYS: [&str; 6] = [
    REFRESH_INTERVAL_KEY,
    FONT_SIZE_KEY,
    HIDE_EXPIRED_KEY,
    DELETE_BUTTON_KEY,
    EDIT_BUTTON_KEY,
    QUICK_PUBLISH_KEY,
];

const REFRESH_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 10..=3600;
const FONT_SIZE_RANGE: std::ops::RangeInclusive<u32> = 8..=64;

/// Database path that selects an in-memory store
pub const MEMORY_PATH: &str = ":memory:";

/// Lifetime of a stored value, renewed on every write
const MAX_AGE_DAYS: i64 = 30;

/// Key-value storage for preference strings
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, used by tests and one-off CLI runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().map_err(|_| anyhow!("preference store poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("preference store poisoned"))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().map_err(|_| anyhow!("preference store poisoned"))?;
        values.remove(key);
        Ok(())
    }
}

/// SQLite-backed store whose values expire like cookies
pub struct SqliteStore {
    conn: Mutex<Connection>,
    max_age: chrono::Duration,
}

impl SqliteStore {
    /// Open the database, apply migrations and drop expired values.
    /// `:memory:` keeps preferences for the life of the process only.
    pub fn open(path: &Path) -> Result<Self> {
        if path == Path::new(MEMORY_PATH) {
            return Self::in_memory();
        }
        Self::with_connection(db::init_db(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(db::init_memory_db()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let purged = db::purge_expired(&conn, Utc::now().timestamp())?;
        if purged > 0 {
            debug!(count = purged, "Purged expired preferences");
        }
        debug!(count = db::count_preferences(&conn)?, "Preference store ready");
        Ok(Self {
            conn: Mutex::new(conn),
            max_age: chrono::Duration::days(MAX_AGE_DAYS),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("preference store poisoned"))
    }
}

impl PreferenceStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        db::get_preference(&conn, key, Utc::now().timestamp())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let expires_at = (Utc::now() + self.max_age).timestamp();
        let conn = self.lock()?;
        db::set_preference(&conn, key, value, expires_at)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        db::delete_preference(&conn, key)?;
        Ok(())
    }
}

/// Typed board preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Seconds between automatic refreshes
    pub refresh_interval: u64,

    /// Body font size in pixels
    pub font_size: u32,

    pub hide_expired: bool,
    pub delete_button: bool,

    /// Shows an edit control per entry
    pub edit_button: bool,

    pub quick_publish: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            refresh_interval: 60,
            font_size: 16,
            hide_expired: false,
            delete_button: false,
            edit_button: false,
            quick_publish: false,
        }
    }
}

impl Preferences {
    /// Read preferences, using defaults for anything missing or invalid
    pub fn load(store: &dyn PreferenceStore) -> Result<Self> {
        let defaults = Self::default();
        let loaded = Self {
            refresh_interval: read_or(store, REFRESH_INTERVAL_KEY, defaults.refresh_interval)?,
            font_size: read_or(store, FONT_SIZE_KEY, defaults.font_size)?,
            hide_expired: read_or(store, HIDE_EXPIRED_KEY, defaults.hide_expired)?,
            delete_button: read_or(store, DELETE_BUTTON_KEY, defaults.delete_button)?,
            edit_button: read_or(store, EDIT_BUTTON_KEY, defaults.edit_button)?,
            quick_publish: read_or(store, QUICK_PUBLISH_KEY, defaults.quick_publish)?,
        };

        // Out-of-range values that slipped into storage are not trusted
        Ok(Self {
            refresh_interval: if REFRESH_INTERVAL_RANGE.contains(&loaded.refresh_interval) {
                loaded.refresh_interval
            } else {
                warn!(value = loaded.refresh_interval, "Stored refresh interval out of range");
                defaults.refresh_interval
            },
            font_size: if FONT_SIZE_RANGE.contains(&loaded.font_size) {
                loaded.font_size
            } else {
                warn!(value = loaded.font_size, "Stored font size out of range");
                defaults.font_size
            },
            ..loaded
        })
    }

    /// Validate and write every preference
    pub fn save(&self, store: &dyn PreferenceStore) -> Result<()> {
        self.validate()?;
        store.set(REFRESH_INTERVAL_KEY, &self.refresh_interval.to_string())?;
        store.set(FONT_SIZE_KEY, &self.font_size.to_string())?;
        store.set(HIDE_EXPIRED_KEY, &self.hide_expired.to_string())?;
        store.set(DELETE_BUTTON_KEY, &self.delete_button.to_string())?;
        store.set(EDIT_BUTTON_KEY, &self.edit_button.to_string())?;
        store.set(QUICK_PUBLISH_KEY, &self.quick_publish.to_string())?;
        Ok(())
    }

    /// Forget every stored preference, so the defaults apply again
    pub fn reset(store: &dyn PreferenceStore) -> Result<()> {
        for key in ALL_KEYS {
            store.remove(key)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), PreferenceError> {
        if !REFRESH_INTERVAL_RANGE.contains(&self.refresh_interval) {
            return Err(PreferenceError::RefreshInterval(self.refresh_interval));
        }
        if !FONT_SIZE_RANGE.contains(&self.font_size) {
            return Err(PreferenceError::FontSize(self.font_size));
        }
        Ok(())
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }
}

/// Partial update, as sent by the settings form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceUpdate {
    pub refresh_interval: Option<u64>,
    pub font_size: Option<u32>,
    pub hide_expired: Option<bool>,
    pub delete_button: Option<bool>,
    pub edit_button: Option<bool>,
    pub quick_publish: Option<bool>,
}

impl PreferenceUpdate {
    /// Apply on top of `current`, validating the result
    pub fn apply(self, current: Preferences) -> Result<Preferences, PreferenceError> {
        let updated = Preferences {
            refresh_interval: self.refresh_interval.unwrap_or(current.refresh_interval),
            font_size: self.font_size.unwrap_or(current.font_size),
            hide_expired: self.hide_expired.unwrap_or(current.hide_expired),
            delete_button: self.delete_button.unwrap_or(current.delete_button),
            edit_button: self.edit_button.unwrap_or(current.edit_button),
            quick_publish: self.quick_publish.unwrap_or(current.quick_publish),
        };
        updated.validate()?;
        Ok(updated)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn read_or<T: FromStr>(store: &dyn PreferenceStore, key: &str, default: T) -> Result<T> {
    match store.get(key)? {
        None => Ok(default),
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                warn!(key = key, value = %raw, "Ignoring unreadable preference");
                Ok(default)
            }
        },
    }
}
