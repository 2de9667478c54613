//! Policy resolution.
//!
//! One function decides, from the current settings and rule sets, which
//! of three policy shapes to apply:
//!
//! 1. Any usable domain rule, tab pattern, or well-known-bundle MTProto
//!    rule forces a PAC program — per-domain and per-tab policy must
//!    override the global default even when the global proxy is off.
//! 2. Otherwise a disabled proxy (or a direct fallback mode) resolves
//!    to a direct connection.
//! 3. Otherwise the configured proxy becomes a fixed policy.
//!
//! Resolution is pure; every apply cycle re-resolves from scratch.

use serde::{Deserialize, Serialize};

use crate::bundles::matching_bundle;
use crate::directive::{encode, ProxyDirective};
use crate::pac::PacProgram;
use crate::rules::{DomainRule, FallbackMode, GlobalSettings, ProxyType, TabPattern};

/// A resolved proxy policy, ready to hand to the network layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Policy {
    /// Connect everything directly.
    Direct,
    /// Route everything through one proxy, minus the bypass list.
    Fixed {
        directive: ProxyDirective,
        bypass: Vec<String>,
    },
    /// Per-host decisions via a synthesized PAC program.
    Pac { program: PacProgram },
}

impl Policy {
    /// Returns the policy mode as a string.
    pub fn mode(&self) -> &'static str {
        match self {
            Policy::Direct => "direct",
            Policy::Fixed { .. } => "fixed_servers",
            Policy::Pac { .. } => "pac_script",
        }
    }

    /// Returns true for the direct policy.
    pub fn is_direct(&self) -> bool {
        matches!(self, Policy::Direct)
    }
}

/// Returns true if any domain rule is an MTProto rule targeting a
/// well-known bundle (these keep PAC mode alive even with the global
/// proxy disabled).
pub fn has_bundle_mtproto_rules(domain_rules: &[DomainRule]) -> bool {
    domain_rules
        .iter()
        .any(|r| r.proxy_type == ProxyType::Mtproto && matching_bundle(&r.pattern).is_some())
}

/// Resolves the current configuration into a policy.
pub fn resolve(
    settings: &GlobalSettings,
    domain_rules: &[DomainRule],
    tab_patterns: &[TabPattern],
) -> Policy {
    let has_domain_rules = domain_rules.iter().any(DomainRule::is_wellformed);
    let has_tab_patterns = tab_patterns.iter().any(TabPattern::is_wellformed);

    if has_domain_rules || has_tab_patterns || has_bundle_mtproto_rules(domain_rules) {
        return Policy::Pac {
            program: PacProgram::synthesize(tab_patterns, domain_rules, settings),
        };
    }

    if !settings.enabled
        || settings.fallback == FallbackMode::Direct
        || settings.proxy_type == ProxyType::Direct
    {
        return Policy::Direct;
    }

    Policy::Fixed {
        directive: encode(
            settings.proxy_type,
            &settings.server,
            settings.port,
            &settings.username,
            &settings.password,
        ),
        bypass: settings.bypass_hosts(),
    }
}
