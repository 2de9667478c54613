//! Tab enumeration and reconciliation.
//!
//! The browser owns the live tab list; this module models that boundary
//! as a [`TabProvider`] and turns durable per-tab assignments into the
//! disposable [`TabPattern`] snapshot PAC synthesis consumes. A command
//! may also carry the tab list inline, in which case the provider is
//! bypassed for that reconciliation pass.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pacswitch_core::pattern::normalize_host;
use pacswitch_core::rules::{DomainRule, TabAssignment, TabPattern, TabRule};

/// A browser tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabInfo {
    /// Ephemeral browser tab identifier.
    pub id: i64,
    /// Current URL of the tab.
    pub url: String,
    /// Tab title, for display.
    #[serde(default)]
    pub title: String,
}

/// Source of the live tab list.
pub trait TabProvider: Send + Sync {
    /// Returns the currently open tabs.
    fn tabs(&self) -> Vec<TabInfo>;
}

/// A tab provider backed by an explicitly maintained list.
///
/// The host pushes its tab snapshot here; tests and embedders set it
/// directly.
#[derive(Default)]
pub struct StaticTabProvider {
    tabs: RwLock<Vec<TabInfo>>,
}

impl StaticTabProvider {
    /// Creates an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the tab list.
    pub fn set_tabs(&self, tabs: Vec<TabInfo>) {
        *self.tabs.write() = tabs;
    }
}

impl TabProvider for StaticTabProvider {
    fn tabs(&self) -> Vec<TabInfo> {
        self.tabs.read().clone()
    }
}

/// Materializes tab assignments into PAC-ready patterns.
///
/// Tabs without an assignment or with a `default` assignment produce
/// nothing. Non-http(s) tabs are skipped. Assignments pointing at a
/// deleted rule are dropped with a warning rather than failing the
/// pass.
pub fn materialize_tab_patterns(
    tabs: &[TabInfo],
    tab_rules: &[TabRule],
    domain_rules: &[DomainRule],
) -> Vec<TabPattern> {
    let mut patterns = Vec::new();

    for tab in tabs {
        let Some(rule) = tab_rules.iter().find(|r| r.tab_id == tab.id) else {
            continue;
        };

        if !tab.url.starts_with("http://") && !tab.url.starts_with("https://") {
            debug!(tab_id = tab.id, url = %tab.url, "skipping non-http tab");
            continue;
        }

        let host = normalize_host(&tab.url);
        if host.is_empty() {
            continue;
        }

        match &rule.assignment {
            TabAssignment::Default => {}
            TabAssignment::Direct => {
                patterns.push(TabPattern::direct(host));
            }
            TabAssignment::Rule(id) => match domain_rules.iter().find(|r| &r.id == id) {
                Some(domain_rule) => {
                    patterns.push(TabPattern::from_rule(host, domain_rule));
                }
                None => {
                    warn!(tab_id = tab.id, rule_id = %id, "tab references a missing rule, skipping");
                }
            },
        }
    }

    patterns
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacswitch_core::rules::ProxyType;

    fn tab(id: i64, url: &str) -> TabInfo {
        TabInfo {
            id,
            url: url.to_string(),
            title: String::new(),
        }
    }

    fn assignment(tab_id: i64, assignment: TabAssignment) -> TabRule {
        TabRule { tab_id, assignment }
    }

    #[test]
    fn direct_assignment_materializes_tab_host() {
        let tabs = vec![tab(1, "https://web.example.com/path")];
        let rules = vec![assignment(1, TabAssignment::Direct)];

        let patterns = materialize_tab_patterns(&tabs, &rules, &[]);
        assert_eq!(patterns, vec![TabPattern::direct("web.example.com")]);
    }

    #[test]
    fn rule_assignment_snapshots_the_rule() {
        let domain_rule =
            DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080);
        let tabs = vec![tab(1, "https://app.example.com/")];
        let rules = vec![assignment(1, TabAssignment::Rule(domain_rule.id.clone()))];

        let patterns = materialize_tab_patterns(&tabs, &rules, &[domain_rule]);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "app.example.com");
        assert_eq!(patterns[0].proxy_type, ProxyType::Socks5);
        assert_eq!(patterns[0].server, "s");
    }

    #[test]
    fn default_assignment_produces_nothing() {
        let tabs = vec![tab(1, "https://example.com/")];
        let rules = vec![assignment(1, TabAssignment::Default)];
        assert!(materialize_tab_patterns(&tabs, &rules, &[]).is_empty());
    }

    #[test]
    fn non_http_tabs_are_skipped() {
        let tabs = vec![
            tab(1, "chrome://settings"),
            tab(2, "about:blank"),
            tab(3, ""),
        ];
        let rules = vec![
            assignment(1, TabAssignment::Direct),
            assignment(2, TabAssignment::Direct),
            assignment(3, TabAssignment::Direct),
        ];
        assert!(materialize_tab_patterns(&tabs, &rules, &[]).is_empty());
    }

    #[test]
    fn dangling_rule_reference_is_dropped() {
        let tabs = vec![tab(1, "https://example.com/")];
        let rules = vec![assignment(1, TabAssignment::Rule("gone".to_string()))];
        assert!(materialize_tab_patterns(&tabs, &rules, &[]).is_empty());
    }

    #[test]
    fn unassigned_tabs_produce_nothing() {
        let tabs = vec![tab(1, "https://example.com/")];
        assert!(materialize_tab_patterns(&tabs, &[], &[]).is_empty());
    }

    #[test]
    fn static_provider_roundtrip() {
        let provider = StaticTabProvider::new();
        assert!(provider.tabs().is_empty());

        provider.set_tabs(vec![tab(1, "https://example.com/")]);
        assert_eq!(provider.tabs().len(), 1);
    }
}
