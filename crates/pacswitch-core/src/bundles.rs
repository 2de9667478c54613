//! Well-known domain bundles.
//!
//! Some services are reachable under several domains, and a user who
//! types one of them almost always means all of them. A bundle pairs a
//! set of marker substrings with the service's full domain set; any rule
//! whose pattern contains a marker is expanded to cover the whole set
//! during PAC synthesis.
//!
//! The bundle list is compiled in, like the bundled site lists the rest
//! of the system ships with. Only Telegram is currently bundled, since
//! it is the one service MTProto rules exist for.

use crate::rules::{DomainRule, GlobalSettings, ProxyType};

/// A well-known service with aliased domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainBundle {
    /// Service name, for diagnostics.
    pub name: &'static str,
    /// Substrings that identify a user pattern as targeting this service.
    pub markers: &'static [&'static str],
    /// Full pattern set the service is reachable under.
    pub domains: &'static [&'static str],
}

impl DomainBundle {
    /// Returns true if the pattern references this bundle.
    pub fn matches_marker(&self, pattern: &str) -> bool {
        let pattern = pattern.to_ascii_lowercase();
        self.markers.iter().any(|m| pattern.contains(m))
    }

    /// Builds one domain rule per bundle pattern from the given MTProto
    /// settings, for automatic Telegram rule setup.
    pub fn rules_from_settings(&self, settings: &GlobalSettings) -> Vec<DomainRule> {
        self.domains
            .iter()
            .map(|domain| {
                DomainRule::new(*domain, ProxyType::Mtproto)
                    .with_server(settings.server.clone(), settings.port)
                    .with_secret(settings.mtproto_secret.clone())
            })
            .collect()
    }
}

/// Telegram: MTProto rules target it, and its web client spans several
/// domains.
pub const TELEGRAM: DomainBundle = DomainBundle {
    name: "Telegram",
    markers: &["telegram", "t.me"],
    domains: &[
        "telegram.org",
        "*.telegram.org",
        "web.telegram.org",
        "t.me",
        "*.t.me",
    ],
};

/// All compiled-in bundles.
pub const BUNDLES: &[&DomainBundle] = &[&TELEGRAM];

/// Finds the bundle a pattern references, if any.
pub fn matching_bundle(pattern: &str) -> Option<&'static DomainBundle> {
    BUNDLES.iter().copied().find(|b| b.matches_marker(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_markers_match() {
        assert!(TELEGRAM.matches_marker("*.telegram.org"));
        assert!(TELEGRAM.matches_marker("t.me"));
        assert!(TELEGRAM.matches_marker("web.Telegram.org"));
        assert!(!TELEGRAM.matches_marker("example.com"));
    }

    #[test]
    fn matching_bundle_finds_telegram() {
        assert_eq!(matching_bundle("t.me; *.telegram.org"), Some(&TELEGRAM));
        assert_eq!(matching_bundle("*.example.com"), None);
    }

    #[test]
    fn rules_from_settings_cover_all_domains() {
        let settings = GlobalSettings {
            server: "1.2.3.4".to_string(),
            port: 443,
            mtproto_secret: "dd00ff".to_string(),
            ..Default::default()
        };
        let rules = TELEGRAM.rules_from_settings(&settings);
        assert_eq!(rules.len(), TELEGRAM.domains.len());
        for rule in &rules {
            assert_eq!(rule.proxy_type, ProxyType::Mtproto);
            assert_eq!(rule.server, "1.2.3.4");
            assert_eq!(rule.mtproto_secret, "dd00ff");
            assert!(rule.is_wellformed());
        }
    }
}
