// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Database module for durable agent state
//!
//! Two tables: `device_config` holds identity and other key/value settings,
//! `events` is the append-only detection log. Every write is committed with
//! `synchronous = FULL` before the call returns.

use chrono::Local;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;

/// Identity keys in `device_config`
pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_DEVICE_TOKEN: &str = "device_token";
pub const KEY_PAIRING_CODE: &str = "pairing_code";

/// Row id of a stored detection event
pub type EventId = i64;

/// Storage failures. These are fatal to the calling operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to prepare database directory {path:?}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Credentials issued by the backend once pairing completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub device_id: String,
    pub device_token: String,
}

/// A detection event as read back from the log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: EventId,
    pub timestamp: String,
    pub score: f64,
    pub is_anomaly: bool,
    pub synced: bool,
    pub created_at: String,
}

/// Event log counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_events: usize,
    pub unsynced_events: usize,
    pub anomalies: usize,
}

/// Durable state store
pub struct Database {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self, StoreError> {
        Self::open_path(&config.database_path())
    }

    /// Open or create the database at `path`
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;

        // Durability over throughput: the agent writes a few rows per second at most.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = FULL;
            "#,
        )?;

        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };

        db.create_tables()?;

        info!("Database opened at {:?}", path);
        Ok(db)
    }

    /// Volatile database for tests and dry runs
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: PathBuf::from(":memory:"),
        };
        db.create_tables()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                anomaly_score REAL NOT NULL,
                is_anomaly INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_events_synced ON events(synced);

            CREATE TABLE IF NOT EXISTS device_config (
                key TEXT PRIMARY KEY,
                value TEXT
            );
            "#,
        )?;

        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();

        let value = conn
            .query_row(
                "SELECT value FROM device_config WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;

        Ok(value.flatten())
    }

    /// Set a config value
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT OR REPLACE INTO device_config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;

        debug!(key, "config value stored");
        Ok(())
    }

    /// Remove a config value
    pub fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM device_config WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// Persist both halves of the paired identity in one transaction
    pub fn save_credentials(&self, credentials: &DeviceCredentials) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO device_config (key, value) VALUES (?1, ?2)",
            params![KEY_DEVICE_ID, credentials.device_id],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO device_config (key, value) VALUES (?1, ?2)",
            params![KEY_DEVICE_TOKEN, credentials.device_token],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// Stored credentials, only when both id and token are present
    pub fn load_credentials(&self) -> Result<Option<DeviceCredentials>, StoreError> {
        let device_id = self.get(KEY_DEVICE_ID)?;
        let device_token = self.get(KEY_DEVICE_TOKEN)?;

        Ok(match (device_id, device_token) {
            (Some(device_id), Some(device_token))
                if !device_id.is_empty() && !device_token.is_empty() =>
            {
                Some(DeviceCredentials { device_id, device_token })
            }
            _ => None,
        })
    }

    /// Drop the identity keys (device id, token and pairing code). Events stay.
    pub fn clear_identity(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();

        let removed = conn.execute(
            "DELETE FROM device_config WHERE key IN (?1, ?2, ?3)",
            params![KEY_DEVICE_ID, KEY_DEVICE_TOKEN, KEY_PAIRING_CODE],
        )?;

        info!("Cleared {} identity keys", removed);
        Ok(removed)
    }

    /// Append a detection event
    pub fn append_event(
        &self,
        timestamp: &str,
        score: f64,
        is_anomaly: bool,
    ) -> Result<EventId, StoreError> {
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO events (timestamp, anomaly_score, is_anomaly, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                timestamp,
                score,
                is_anomaly,
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Events not yet delivered, oldest first
    pub fn list_unsynced(&self) -> Result<Vec<StoredEvent>, StoreError> {
        self.query_events("WHERE synced = 0")
    }

    /// Full event log, oldest first
    pub fn list_events(&self) -> Result<Vec<StoredEvent>, StoreError> {
        self.query_events("")
    }

    fn query_events(&self, filter: &str) -> Result<Vec<StoredEvent>, StoreError> {
        let conn = self.conn.lock();

        let sql = format!(
            "SELECT id, timestamp, anomaly_score, is_anomaly, synced, created_at
             FROM events {} ORDER BY id ASC",
            filter
        );

        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map([], |row| {
            Ok(StoredEvent {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                score: row.get(2)?,
                is_anomaly: row.get(3)?,
                synced: row.get(4)?,
                created_at: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }

    /// Flag events as delivered. Safe to repeat; returns rows newly flipped.
    pub fn mark_synced(&self, ids: &[EventId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();

        let tx = conn.transaction()?;
        let mut flipped = 0;
        {
            let mut stmt = tx.prepare("UPDATE events SET synced = 1 WHERE id = ?1 AND synced = 0")?;
            for id in ids {
                flipped += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;

        Ok(flipped)
    }

    /// Get event log statistics
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock();

        let (total, unsynced, anomalies): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_anomaly != 0 THEN 1 ELSE 0 END), 0)
             FROM events",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            total_events: total as usize,
            unsynced_events: unsynced as usize,
            anomalies: anomalies as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> DeviceCredentials {
        DeviceCredentials {
            device_id: "dev-1".to_string(),
            device_token: "tok-1".to_string(),
        }
    }

    #[test]
    fn test_config_get_set_delete() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.get("missing").unwrap(), None);
        db.set("wifi_ssid", "barn").unwrap();
        db.set("wifi_ssid", "shed").unwrap();
        assert_eq!(db.get("wifi_ssid").unwrap().as_deref(), Some("shed"));
        assert!(db.delete("wifi_ssid").unwrap());
        assert_eq!(db.get("wifi_ssid").unwrap(), None);
    }

    #[test]
    fn test_events_are_appended_in_order_and_unsynced() {
        let db = Database::open_in_memory().unwrap();

        let a = db.append_event("2026-01-01T00:00:00", 0.05, false).unwrap();
        let b = db.append_event("2026-01-01T00:00:01", 0.30, true).unwrap();
        assert!(b > a);

        let events = db.list_unsynced().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, a);
        assert!(!events[0].is_anomaly);
        assert!(events[1].is_anomaly);
        assert!(events.iter().all(|e| !e.synced));
        assert!(!events[0].created_at.is_empty());
    }

    #[test]
    fn test_mark_synced_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let id = db.append_event("t0", 0.0, false).unwrap();
        db.append_event("t1", 0.0, false).unwrap();

        assert_eq!(db.mark_synced(&[id]).unwrap(), 1);
        assert_eq!(db.mark_synced(&[id]).unwrap(), 0);
        assert_eq!(db.mark_synced(&[]).unwrap(), 0);

        let all = db.list_events().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].synced);
        assert!(!all[1].synced);
        assert_eq!(db.list_unsynced().unwrap().len(), 1);
    }

    #[test]
    fn test_synced_never_reverts() {
        let db = Database::open_in_memory().unwrap();
        let id = db.append_event("t0", 0.2, true).unwrap();
        db.mark_synced(&[id]).unwrap();
        db.append_event("t1", 0.1, false).unwrap();
        db.mark_synced(&[id, id]).unwrap();

        let first = &db.list_events().unwrap()[0];
        assert!(first.synced);
        assert!(first.is_anomaly);
        assert_eq!(first.score, 0.2);
    }

    #[test]
    fn test_clear_identity_leaves_events_and_other_keys() {
        let db = Database::open_in_memory().unwrap();
        db.save_credentials(&creds()).unwrap();
        db.set(KEY_PAIRING_CODE, "ABC123").unwrap();
        db.set("wifi_ssid", "barn").unwrap();
        db.append_event("t0", 0.0, false).unwrap();

        assert_eq!(db.clear_identity().unwrap(), 3);

        assert_eq!(db.load_credentials().unwrap(), None);
        assert_eq!(db.get(KEY_PAIRING_CODE).unwrap(), None);
        assert_eq!(db.get("wifi_ssid").unwrap().as_deref(), Some("barn"));
        assert_eq!(db.stats().unwrap().total_events, 1);
    }

    #[test]
    fn test_half_identity_is_not_credentials() {
        let db = Database::open_in_memory().unwrap();
        db.set(KEY_DEVICE_TOKEN, "tok").unwrap();
        assert_eq!(db.load_credentials().unwrap(), None);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("events.db");

        {
            let db = Database::open_path(&path).unwrap();
            db.save_credentials(&creds()).unwrap();
            db.append_event("t0", 0.4, true).unwrap();
            db.append_event("t1", 0.0, false).unwrap();
        }

        let db = Database::open_path(&path).unwrap();
        assert_eq!(db.load_credentials().unwrap(), Some(creds()));
        let pending = db.list_unsynced().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].timestamp, "t0");
        assert_eq!(
            db.stats().unwrap(),
            StoreStats { total_events: 2, unsynced_events: 2, anomalies: 1 }
        );
    }
}
