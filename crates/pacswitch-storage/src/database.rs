//! High-level database interface.

use std::path::PathBuf;

use directories::ProjectDirs;
use tracing::info;

use pacswitch_core::mtproto::MtprotoActivity;
use pacswitch_core::rules::{DomainRule, GlobalSettings, Options, TabPattern, TabRule};

use crate::error::{Result, StorageError};
use crate::models::keys;
use crate::pool::ConnectionPool;
use crate::repository::{
    ConfigRepo, DomainRulesRepo, MtprotoStateRepo, TabPatternsRepo, TabRulesRepo,
};

/// High-level database interface for Pacswitch.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        let path = Self::default_db_path()?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "pacswitch", "pacswitch")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("pacswitch.db"))
    }

    // === Settings ===

    /// Get the global proxy settings; missing or unreadable values fall
    /// back to defaults.
    pub fn get_settings(&self) -> Result<GlobalSettings> {
        let conn = self.pool.get()?;
        ConfigRepo::get_or_default(&conn, keys::PROXY_SETTINGS, GlobalSettings::default())
    }

    /// Store the global proxy settings.
    pub fn set_settings(&self, settings: &GlobalSettings) -> Result<()> {
        let conn = self.pool.get()?;
        ConfigRepo::set(&conn, keys::PROXY_SETTINGS, &serde_json::to_value(settings)?)
    }

    /// Get the secondary options; missing or unreadable values fall
    /// back to defaults.
    pub fn get_options(&self) -> Result<Options> {
        let conn = self.pool.get()?;
        ConfigRepo::get_or_default(&conn, keys::OPTIONS, Options::default())
    }

    /// Store the secondary options.
    pub fn set_options(&self, options: &Options) -> Result<()> {
        let conn = self.pool.get()?;
        ConfigRepo::set(&conn, keys::OPTIONS, &serde_json::to_value(options)?)
    }

    // === Domain rules ===

    /// Get all domain rules in evaluation order.
    pub fn get_domain_rules(&self) -> Result<Vec<DomainRule>> {
        let conn = self.pool.get()?;
        DomainRulesRepo::get_all(&conn)
    }

    /// Get a domain rule by its stable id.
    pub fn get_domain_rule(&self, id: &str) -> Result<Option<DomainRule>> {
        let conn = self.pool.get()?;
        DomainRulesRepo::get_by_id(&conn, id)
    }

    /// Append a domain rule at the end of the evaluation order.
    pub fn add_domain_rule(&self, rule: &DomainRule) -> Result<()> {
        let conn = self.pool.get()?;
        DomainRulesRepo::insert(&conn, rule)
    }

    /// Replace the whole rule list (order = evaluation order).
    pub fn replace_domain_rules(&self, rules: &[DomainRule]) -> Result<()> {
        let conn = self.pool.get()?;
        DomainRulesRepo::replace_all(&conn, rules)
    }

    /// Update a domain rule in place.
    pub fn update_domain_rule(&self, rule: &DomainRule) -> Result<()> {
        let conn = self.pool.get()?;
        DomainRulesRepo::update(&conn, rule)
    }

    /// Delete a domain rule.
    pub fn delete_domain_rule(&self, id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        DomainRulesRepo::delete(&conn, id)
    }

    // === Tab rules and patterns ===

    /// Get all tab assignments.
    pub fn get_tab_rules(&self) -> Result<Vec<TabRule>> {
        let conn = self.pool.get()?;
        TabRulesRepo::get_all(&conn)
    }

    /// Replace all tab assignments.
    pub fn replace_tab_rules(&self, rules: &[TabRule]) -> Result<()> {
        let conn = self.pool.get()?;
        TabRulesRepo::replace_all(&conn, rules)
    }

    /// Get the materialized tab pattern snapshot.
    pub fn get_tab_patterns(&self) -> Result<Vec<TabPattern>> {
        let conn = self.pool.get()?;
        TabPatternsRepo::get_all(&conn)
    }

    /// Replace the materialized tab pattern snapshot.
    pub fn replace_tab_patterns(&self, patterns: &[TabPattern]) -> Result<()> {
        let conn = self.pool.get()?;
        TabPatternsRepo::replace_all(&conn, patterns)
    }

    // === MTProto activity ===

    /// Get the MTProto activity record.
    pub fn get_mtproto_activity(&self) -> Result<Option<MtprotoActivity>> {
        let conn = self.pool.get()?;
        MtprotoStateRepo::get(&conn)
    }

    /// Record an applied MTProto configuration.
    pub fn record_mtproto_activity(&self, activity: &MtprotoActivity) -> Result<()> {
        let conn = self.pool.get()?;
        MtprotoStateRepo::set(&conn, activity)
    }

    // === Reset ===

    /// Wipe every setting, rule, tab assignment, pattern, and activity
    /// record.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.pool.get()?;
        ConfigRepo::clear(&conn)?;
        DomainRulesRepo::clear(&conn)?;
        TabRulesRepo::clear(&conn)?;
        TabPatternsRepo::clear(&conn)?;
        MtprotoStateRepo::clear(&conn)?;
        Ok(())
    }
}
