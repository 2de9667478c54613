//! Pacswitch Core - pattern matching, rule model, and PAC synthesis.
//!
//! This crate holds the policy engine of Pacswitch: given global proxy
//! settings, an ordered list of per-domain rules, and materialized
//! per-tab overrides, it resolves the configuration into a proxy policy
//! — a direct connection, a single fixed proxy, or a synthesized PAC
//! decision procedure.
//!
//! ```
//! use pacswitch_core::rules::{DomainRule, GlobalSettings, ProxyType};
//! use pacswitch_core::resolver::resolve;
//!
//! let rules = vec![
//!     DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
//! ];
//! let policy = resolve(&GlobalSettings::default(), &rules, &[]);
//! assert_eq!(policy.mode(), "pac_script");
//! ```

pub mod bundles;
pub mod directive;
pub mod mtproto;
pub mod pac;
pub mod pattern;
pub mod resolver;
pub mod rules;

pub use directive::{encode, Credentials, ProxyDirective};
pub use pac::{HostMatcher, PacEntry, PacProgram};
pub use pattern::{matches, normalize_host};
pub use resolver::{resolve, Policy};
pub use rules::{
    DomainRule, FallbackMode, GlobalSettings, Options, ProxyType, StartupBehavior, TabAssignment,
    TabPattern, TabRule, ValidationError,
};
