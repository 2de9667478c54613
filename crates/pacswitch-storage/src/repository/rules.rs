//! Domain rules repository.
//!
//! Rules are kept in an explicit evaluation order via the `position`
//! column; the stable `id` survives reordering.

use rusqlite::{params, Connection, Row};

use pacswitch_core::rules::{DomainRule, ProxyType};

use crate::error::{Result, StorageError};

/// Repository for domain rule operations.
pub struct DomainRulesRepo;

impl DomainRulesRepo {
    /// Append a rule at the end of the evaluation order.
    pub fn insert(conn: &Connection, rule: &DomainRule) -> Result<()> {
        let position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM domain_rules",
            [],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO domain_rules
             (id, position, pattern, proxy_type, server, port, username, password, mtproto_secret)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rule.id,
                position,
                rule.pattern,
                rule.proxy_type.as_str(),
                rule.server,
                rule.port,
                rule.username,
                rule.password,
                rule.mtproto_secret,
            ],
        )?;

        Ok(())
    }

    /// Get a rule by its stable id.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<DomainRule>> {
        let mut stmt = conn.prepare(
            "SELECT id, pattern, proxy_type, server, port, username, password, mtproto_secret
             FROM domain_rules WHERE id = ?1",
        )?;

        let rule = stmt.query_row([id], row_to_rule).ok();
        Ok(rule)
    }

    /// Get all rules in evaluation order.
    pub fn get_all(conn: &Connection) -> Result<Vec<DomainRule>> {
        let mut stmt = conn.prepare(
            "SELECT id, pattern, proxy_type, server, port, username, password, mtproto_secret
             FROM domain_rules ORDER BY position ASC",
        )?;

        let rules = stmt
            .query_map([], row_to_rule)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(rules)
    }

    /// Replace the whole list, positions following slice order.
    pub fn replace_all(conn: &Connection, rules: &[DomainRule]) -> Result<()> {
        conn.execute("DELETE FROM domain_rules", [])?;

        for (position, rule) in rules.iter().enumerate() {
            conn.execute(
                "INSERT INTO domain_rules
                 (id, position, pattern, proxy_type, server, port, username, password, mtproto_secret)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rule.id,
                    position as i64,
                    rule.pattern,
                    rule.proxy_type.as_str(),
                    rule.server,
                    rule.port,
                    rule.username,
                    rule.password,
                    rule.mtproto_secret,
                ],
            )?;
        }

        Ok(())
    }

    /// Update a rule in place, keeping its position.
    pub fn update(conn: &Connection, rule: &DomainRule) -> Result<()> {
        let updated = conn.execute(
            "UPDATE domain_rules SET pattern = ?1, proxy_type = ?2, server = ?3, port = ?4,
             username = ?5, password = ?6, mtproto_secret = ?7, updated_at = datetime('now')
             WHERE id = ?8",
            params![
                rule.pattern,
                rule.proxy_type.as_str(),
                rule.server,
                rule.port,
                rule.username,
                rule.password,
                rule.mtproto_secret,
                rule.id,
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("Rule with id {}", rule.id)));
        }

        Ok(())
    }

    /// Delete a rule by id.
    pub fn delete(conn: &Connection, id: &str) -> Result<()> {
        let deleted = conn.execute("DELETE FROM domain_rules WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(StorageError::NotFound(format!("Rule with id {id}")));
        }

        Ok(())
    }

    /// Delete every rule.
    pub fn clear(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM domain_rules", [])?;
        Ok(())
    }

    /// Count total rules.
    pub fn count(conn: &Connection) -> Result<i64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM domain_rules", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Maps a row to a rule. Unknown proxy types fall back to direct rather
/// than failing the whole read.
fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<DomainRule> {
    let proxy_type_str: String = row.get(2)?;
    Ok(DomainRule {
        id: row.get(0)?,
        pattern: row.get(1)?,
        proxy_type: ProxyType::parse(&proxy_type_str).unwrap_or(ProxyType::Direct),
        server: row.get(3)?,
        port: row.get(4)?,
        username: row.get(5)?,
        password: row.get(6)?,
        mtproto_secret: row.get(7)?,
    })
}
