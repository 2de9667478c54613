//! MTProto activity state repository.
//!
//! A single-row diagnostics record describing the last applied MTProto
//! configuration.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use pacswitch_core::mtproto::MtprotoActivity;

use crate::error::Result;

/// Repository for the MTProto activity record.
pub struct MtprotoStateRepo;

impl MtprotoStateRepo {
    /// Get the current record, if one was ever written.
    pub fn get(conn: &Connection) -> Result<Option<MtprotoActivity>> {
        let mut stmt = conn.prepare(
            "SELECT server, port, secret_provided, activated_at, source
             FROM mtproto_state WHERE id = 1",
        )?;

        let record = stmt
            .query_row([], |row| {
                let activated_at_str: String = row.get(3)?;
                Ok(MtprotoActivity {
                    server: row.get(0)?,
                    port: row.get(1)?,
                    secret_provided: row.get::<_, i32>(2)? != 0,
                    activated_at: parse_datetime(&activated_at_str),
                    source: row.get(4)?,
                })
            })
            .ok();

        Ok(record)
    }

    /// Write (or overwrite) the record.
    pub fn set(conn: &Connection, activity: &MtprotoActivity) -> Result<()> {
        conn.execute(
            "INSERT INTO mtproto_state (id, server, port, secret_provided, activated_at, source)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                server = ?1, port = ?2, secret_provided = ?3, activated_at = ?4, source = ?5",
            params![
                activity.server,
                activity.port,
                activity.secret_provided as i32,
                activity.activated_at.to_rfc3339(),
                activity.source,
            ],
        )?;

        Ok(())
    }

    /// Remove the record.
    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM mtproto_state", [])?;
        Ok(())
    }
}

/// Parse a datetime from its stored format.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
