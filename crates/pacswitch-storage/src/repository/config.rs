//! Configuration repository.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::models::ConfigEntry;

/// Repository for configuration operations.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a configuration value.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<ConfigEntry>> {
        let mut stmt = conn.prepare("SELECT key, value FROM config WHERE key = ?1")?;

        let entry = stmt
            .query_row([key], |row| {
                let value_str: String = row.get(1)?;
                Ok(ConfigEntry {
                    key: row.get(0)?,
                    value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
                })
            })
            .ok();

        Ok(entry)
    }

    /// Set a configuration value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Delete a configuration value.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Delete every configuration value.
    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM config", [])?;
        Ok(())
    }

    /// Get a typed configuration value with a default.
    ///
    /// Missing keys and unparseable values both fall back to the
    /// default; a stored value never hard-fails a read.
    pub fn get_or_default<T: serde::de::DeserializeOwned>(
        conn: &Connection,
        key: &str,
        default: T,
    ) -> Result<T> {
        match Self::get(conn, key)? {
            Some(entry) => Ok(serde_json::from_value(entry.value).unwrap_or(default)),
            None => Ok(default),
        }
    }
}
