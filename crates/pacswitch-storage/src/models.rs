//! Data models for storage.
//!
//! The rule and settings types themselves live in `pacswitch_core`;
//! this module holds the storage-only shapes.

use serde::{Deserialize, Serialize};

/// Well-known configuration keys.
pub mod keys {
    /// Global proxy settings ([`pacswitch_core::GlobalSettings`]).
    pub const PROXY_SETTINGS: &str = "proxy_settings";
    /// Secondary options ([`pacswitch_core::Options`]).
    pub const OPTIONS: &str = "options";
}

/// A configuration entry stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Configuration key.
    pub key: String,
    /// Configuration value (JSON).
    pub value: serde_json::Value,
}
