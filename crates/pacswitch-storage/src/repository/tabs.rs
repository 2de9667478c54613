//! Tab rules and tab pattern repositories.
//!
//! Tab rules are durable assignments keyed by the browser's tab id.
//! Tab patterns are the materialized snapshots consumed by PAC
//! synthesis; they are wiped and rewritten wholesale on every
//! reconciliation pass.

use rusqlite::{params, Connection, Row};

use pacswitch_core::rules::{ProxyType, TabAssignment, TabPattern, TabRule};

use crate::error::Result;

/// Repository for per-tab proxy assignments.
pub struct TabRulesRepo;

impl TabRulesRepo {
    /// Get the assignment for one tab.
    pub fn get(conn: &Connection, tab_id: i64) -> Result<Option<TabRule>> {
        let mut stmt =
            conn.prepare("SELECT tab_id, assignment FROM tab_rules WHERE tab_id = ?1")?;
        let rule = stmt.query_row([tab_id], row_to_tab_rule).ok().flatten();
        Ok(rule)
    }

    /// Get all assignments.
    pub fn get_all(conn: &Connection) -> Result<Vec<TabRule>> {
        let mut stmt =
            conn.prepare("SELECT tab_id, assignment FROM tab_rules ORDER BY tab_id ASC")?;

        let rules = stmt
            .query_map([], row_to_tab_rule)?
            .filter_map(|r| r.ok())
            .flatten()
            .collect();

        Ok(rules)
    }

    /// Replace every assignment.
    pub fn replace_all(conn: &Connection, rules: &[TabRule]) -> Result<()> {
        conn.execute("DELETE FROM tab_rules", [])?;

        for rule in rules {
            conn.execute(
                "INSERT INTO tab_rules (tab_id, assignment) VALUES (?1, ?2)",
                params![rule.tab_id, rule.assignment.as_string()],
            )?;
        }

        Ok(())
    }

    /// Set or update one tab's assignment.
    pub fn set(conn: &Connection, rule: &TabRule) -> Result<()> {
        conn.execute(
            "INSERT INTO tab_rules (tab_id, assignment) VALUES (?1, ?2)
             ON CONFLICT(tab_id) DO UPDATE SET assignment = ?2",
            params![rule.tab_id, rule.assignment.as_string()],
        )?;
        Ok(())
    }

    /// Remove one tab's assignment.
    pub fn delete(conn: &Connection, tab_id: i64) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM tab_rules WHERE tab_id = ?1", [tab_id])?;
        Ok(deleted > 0)
    }

    /// Delete every assignment.
    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM tab_rules", [])?;
        Ok(())
    }
}

/// Unparseable assignments are dropped, not surfaced as errors.
fn row_to_tab_rule(row: &Row<'_>) -> rusqlite::Result<Option<TabRule>> {
    let tab_id: i64 = row.get(0)?;
    let assignment_str: String = row.get(1)?;
    Ok(TabAssignment::parse(&assignment_str).map(|assignment| TabRule { tab_id, assignment }))
}

/// Repository for materialized tab patterns.
pub struct TabPatternsRepo;

impl TabPatternsRepo {
    /// Get all patterns in generation order.
    pub fn get_all(conn: &Connection) -> Result<Vec<TabPattern>> {
        let mut stmt = conn.prepare(
            "SELECT pattern, proxy_type, server, port, username, password, mtproto_secret
             FROM tab_patterns ORDER BY position ASC",
        )?;

        let patterns = stmt
            .query_map([], row_to_tab_pattern)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(patterns)
    }

    /// Replace the whole snapshot.
    pub fn replace_all(conn: &Connection, patterns: &[TabPattern]) -> Result<()> {
        conn.execute("DELETE FROM tab_patterns", [])?;

        for pattern in patterns {
            conn.execute(
                "INSERT INTO tab_patterns
                 (pattern, proxy_type, server, port, username, password, mtproto_secret)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    pattern.pattern,
                    pattern.proxy_type.as_str(),
                    pattern.server,
                    pattern.port,
                    pattern.username,
                    pattern.password,
                    pattern.mtproto_secret,
                ],
            )?;
        }

        Ok(())
    }

    /// Delete every pattern.
    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM tab_patterns", [])?;
        Ok(())
    }
}

fn row_to_tab_pattern(row: &Row<'_>) -> rusqlite::Result<TabPattern> {
    let proxy_type_str: String = row.get(1)?;
    Ok(TabPattern {
        pattern: row.get(0)?,
        proxy_type: ProxyType::parse(&proxy_type_str).unwrap_or(ProxyType::Direct),
        server: row.get(2)?,
        port: row.get(3)?,
        username: row.get(4)?,
        password: row.get(5)?,
        mtproto_secret: row.get(6)?,
    })
}
