//! Repository layer: one struct per table family.

pub mod config;
pub mod rules;
pub mod state;
pub mod tabs;

pub use config::ConfigRepo;
pub use rules::DomainRulesRepo;
pub use state::MtprotoStateRepo;
pub use tabs::{TabPatternsRepo, TabRulesRepo};
