//! Pacswitch Storage - SQLite persistence layer.
//!
//! This crate stores everything the policy engine resolves from:
//!
//! - Global proxy settings and secondary options (key-value JSON)
//! - The ordered domain rule list (stable ids, explicit positions)
//! - Per-tab assignments keyed by browser tab id
//! - The transient tab pattern snapshot (regenerated, never hand-edited)
//! - The MTProto activity record (diagnostics only)
//!
//! # Example
//!
//! ```no_run
//! use pacswitch_storage::Database;
//! use pacswitch_core::rules::{DomainRule, ProxyType};
//!
//! let db = Database::in_memory().unwrap();
//!
//! let rule = DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080);
//! db.add_domain_rule(&rule).unwrap();
//! assert_eq!(db.get_domain_rules().unwrap().len(), 1);
//! ```

mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use database::Database;
pub use error::{Result, StorageError};
pub use models::ConfigEntry;
pub use pool::ConnectionPool;
pub use repository::{ConfigRepo, DomainRulesRepo, MtprotoStateRepo, TabPatternsRepo, TabRulesRepo};
