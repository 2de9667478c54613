//! PAC program synthesis and rendering.
//!
//! The decision procedure is built as data first: an ordered list of
//! (matcher set, directive) entries plus a default directive. Priority
//! is positional — tab overrides come first, then domain rules in list
//! order, then the default — so evaluation and rendering cannot
//! disagree about ordering. Only [`PacProgram::render`] turns the
//! structure into the textual `FindProxyForURL` script the network
//! layer consumes.
//!
//! Synthesis never fails. Malformed rules are skipped with a warning,
//! and in the worst case the program degrades to a DIRECT-only script.

use std::fmt::Write as _;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bundles::matching_bundle;
use crate::directive::{encode, ProxyDirective};
use crate::pattern::{glob_to_regex, normalize_host, suffix_matches};
use crate::rules::{DomainRule, FallbackMode, GlobalSettings, TabPattern};

/// One compiled way a host can match an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum HostMatcher {
    /// Exact hostname equality.
    Exact(String),
    /// The base domain itself or any subdomain of it (`*.base`).
    Suffix(String),
    /// Anchored regex source compiled from a glob segment.
    Glob(String),
}

impl HostMatcher {
    /// Compiles a single pattern segment. Returns `None` for segments
    /// that cannot match anything.
    fn from_segment(segment: &str) -> Option<Self> {
        let segment = segment.trim().to_ascii_lowercase();
        if segment.is_empty() {
            return None;
        }
        if let Some(base) = segment.strip_prefix("*.") {
            if base.is_empty() {
                return None;
            }
            return Some(HostMatcher::Suffix(base.to_string()));
        }
        if segment.contains('*') {
            return Some(HostMatcher::Glob(glob_to_regex(&segment)));
        }
        Some(HostMatcher::Exact(segment))
    }

    /// Tests a normalized (bare, lowercase) hostname.
    pub fn matches(&self, host: &str) -> bool {
        match self {
            HostMatcher::Exact(name) => host == name,
            HostMatcher::Suffix(base) => suffix_matches(host, base),
            HostMatcher::Glob(source) => Regex::new(source)
                .map(|re| re.is_match(host))
                .unwrap_or(false),
        }
    }

    /// Renders the matcher as a JavaScript boolean expression.
    fn render_condition(&self) -> String {
        match self {
            HostMatcher::Exact(name) => format!("host === \"{}\"", escape_js(name)),
            HostMatcher::Suffix(base) => format!("matchSuffix(host, \"{}\")", escape_js(base)),
            HostMatcher::Glob(source) => format!("matchGlob(host, \"{}\")", escape_js(source)),
        }
    }
}

/// One prioritized entry of the decision procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacEntry {
    /// Matchers, any of which routes the host to `directive`.
    pub matchers: Vec<HostMatcher>,
    /// Directive returned when the entry matches.
    pub directive: ProxyDirective,
}

/// The complete, ordered decision procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacProgram {
    entries: Vec<PacEntry>,
    default_directive: ProxyDirective,
}

impl PacProgram {
    /// A program that always answers `DIRECT`.
    pub fn direct_only() -> Self {
        Self {
            entries: Vec::new(),
            default_directive: ProxyDirective::Direct,
        }
    }

    /// Builds the program from the current rule sets.
    ///
    /// Tab patterns are emitted first (they outrank domain rules), then
    /// domain rules in list order. Rules without a usable pattern or
    /// server are skipped. Patterns referencing a well-known bundle are
    /// expanded to the bundle's full domain set.
    pub fn synthesize(
        tab_patterns: &[TabPattern],
        domain_rules: &[DomainRule],
        settings: &GlobalSettings,
    ) -> Self {
        let mut entries = Vec::new();

        for pattern in tab_patterns {
            if !pattern.is_wellformed() {
                warn!(pattern = %pattern.pattern, "skipping malformed tab pattern");
                continue;
            }
            let matchers = compile_matchers(&pattern.pattern);
            if matchers.is_empty() {
                continue;
            }
            entries.push(PacEntry {
                matchers,
                directive: encode(
                    pattern.proxy_type,
                    &pattern.server,
                    pattern.port,
                    &pattern.username,
                    &pattern.password,
                ),
            });
        }

        for rule in domain_rules {
            if !rule.is_wellformed() {
                warn!(pattern = %rule.pattern, "skipping malformed domain rule");
                continue;
            }
            let matchers = compile_matchers(&rule.pattern);
            if matchers.is_empty() {
                continue;
            }
            entries.push(PacEntry {
                matchers,
                directive: encode(
                    rule.proxy_type,
                    &rule.server,
                    rule.port,
                    &rule.username,
                    &rule.password,
                ),
            });
        }

        let default_directive = default_directive(settings);

        Self {
            entries,
            default_directive,
        }
    }

    /// The prioritized entries.
    pub fn entries(&self) -> &[PacEntry] {
        &self.entries
    }

    /// The directive returned when no entry matches.
    pub fn default_directive(&self) -> &ProxyDirective {
        &self.default_directive
    }

    /// Evaluates the program against a host (or URL), mirroring what
    /// the rendered script would answer.
    pub fn evaluate(&self, host: &str) -> &ProxyDirective {
        let host = normalize_host(host);
        if host.is_empty() {
            return &self.default_directive;
        }
        for entry in &self.entries {
            if entry.matchers.iter().any(|m| m.matches(&host)) {
                return &entry.directive;
            }
        }
        &self.default_directive
    }

    /// Counts entries that would route the given host.
    pub fn matching_entries(&self, host: &str) -> usize {
        let host = normalize_host(host);
        self.entries
            .iter()
            .filter(|e| e.matchers.iter().any(|m| m.matches(&host)))
            .count()
    }

    /// Renders the program as an ASCII `FindProxyForURL` script.
    ///
    /// Identical programs render to byte-identical text.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(512 + self.entries.len() * 96);

        out.push_str(
            "function FindProxyForURL(url, host) {\n\
             \x20 if (!host) return \"DIRECT\";\n\
             \x20 host = host.toLowerCase();\n\
             \x20 if (host.charAt(host.length - 1) === \".\") host = host.slice(0, host.length - 1);\n\
             \x20 function matchSuffix(h, base) {\n\
             \x20   return h === base || h.slice(-(base.length + 1)) === \".\" + base;\n\
             \x20 }\n\
             \x20 function matchGlob(h, source) {\n\
             \x20   return new RegExp(source).test(h);\n\
             \x20 }\n",
        );

        for entry in &self.entries {
            let conditions: Vec<String> =
                entry.matchers.iter().map(|m| m.render_condition()).collect();
            let _ = write!(
                out,
                "  if ({}) return \"{}\";\n",
                conditions.join(" || "),
                escape_js(&entry.directive.to_string())
            );
        }

        let _ = write!(
            out,
            "  return \"{}\";\n}}\n",
            escape_js(&self.default_directive.to_string())
        );

        sanitize_ascii(&out)
    }
}

/// Computes the default directive from the global settings.
fn default_directive(settings: &GlobalSettings) -> ProxyDirective {
    if !settings.enabled
        || settings.fallback == FallbackMode::Direct
        || !settings.proxy_type.needs_server()
    {
        return ProxyDirective::Direct;
    }
    encode(
        settings.proxy_type,
        &settings.server,
        settings.port,
        &settings.username,
        &settings.password,
    )
}

/// Compiles a pattern into its matcher set, expanding bundle references.
fn compile_matchers(pattern: &str) -> Vec<HostMatcher> {
    let mut matchers: Vec<HostMatcher> = pattern
        .split(';')
        .filter_map(HostMatcher::from_segment)
        .collect();

    if let Some(bundle) = matching_bundle(pattern) {
        for domain in bundle.domains {
            if let Some(matcher) = HostMatcher::from_segment(domain) {
                if !matchers.contains(&matcher) {
                    matchers.push(matcher);
                }
            }
        }
    }

    // Bundle expansion and repeated segments can collide
    let mut deduped = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        if !deduped.contains(&matcher) {
            deduped.push(matcher);
        }
    }
    deduped
}

/// Escapes a string for embedding in a JavaScript double-quoted literal.
fn escape_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' | '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Reduces a script to the character set the network layer accepts:
/// printable ASCII plus newline and tab.
pub fn sanitize_ascii(script: &str) -> String {
    script
        .chars()
        .filter(|&c| c == '\n' || c == '\t' || (' '..='~').contains(&c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::ProxyType;

    fn socks_rule(pattern: &str) -> DomainRule {
        DomainRule::new(pattern, ProxyType::Socks5).with_server("s", 1080)
    }

    // ==================== Synthesis Tests ====================

    #[test]
    fn empty_inputs_give_direct_only_program() {
        let program = PacProgram::synthesize(&[], &[], &GlobalSettings::default());
        assert!(program.entries().is_empty());
        assert_eq!(program.default_directive(), &ProxyDirective::Direct);
        assert_eq!(program.evaluate("example.com"), &ProxyDirective::Direct);
    }

    #[test]
    fn domain_rule_routes_matching_hosts() {
        let rules = vec![socks_rule("*.example.com")];
        let program = PacProgram::synthesize(&[], &rules, &GlobalSettings::default());

        assert_eq!(
            program.evaluate("a.example.com").to_string(),
            "SOCKS s:1080"
        );
        assert_eq!(program.evaluate("other.org").to_string(), "DIRECT");
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = vec![
            DomainRule::new("*.example.com", ProxyType::Direct),
            socks_rule("*.example.com"),
        ];
        let program = PacProgram::synthesize(&[], &rules, &GlobalSettings::default());
        assert_eq!(program.evaluate("a.example.com"), &ProxyDirective::Direct);
    }

    #[test]
    fn tab_patterns_outrank_domain_rules() {
        let tabs = vec![TabPattern::direct("a.example.com")];
        let rules = vec![socks_rule("*.example.com")];
        let program = PacProgram::synthesize(&tabs, &rules, &GlobalSettings::default());

        assert_eq!(program.evaluate("a.example.com"), &ProxyDirective::Direct);
        // Sibling hosts still hit the domain rule
        assert_eq!(program.evaluate("b.example.com").to_string(), "SOCKS s:1080");
    }

    #[test]
    fn malformed_rules_are_skipped_but_later_rules_survive() {
        let rules = vec![
            DomainRule::new("", ProxyType::Direct),
            DomainRule::new("*.broken.example", ProxyType::Socks5), // no server
            socks_rule("*.example.com"),
        ];
        let program = PacProgram::synthesize(&[], &rules, &GlobalSettings::default());
        assert_eq!(program.entries().len(), 1);
        assert_eq!(program.evaluate("a.example.com").to_string(), "SOCKS s:1080");
    }

    #[test]
    fn enabled_settings_become_default_directive() {
        let settings = GlobalSettings {
            enabled: true,
            proxy_type: ProxyType::Http,
            server: "10.0.0.1".to_string(),
            port: 3128,
            username: "u".to_string(),
            password: "p".to_string(),
            ..Default::default()
        };
        let program = PacProgram::synthesize(&[], &[socks_rule("*.example.com")], &settings);
        assert_eq!(
            program.evaluate("unrelated.org").to_string(),
            "HTTP u:p@10.0.0.1:3128"
        );
    }

    #[test]
    fn direct_fallback_mode_forces_direct_default() {
        let settings = GlobalSettings {
            enabled: true,
            proxy_type: ProxyType::Http,
            server: "10.0.0.1".to_string(),
            port: 3128,
            fallback: FallbackMode::Direct,
            ..Default::default()
        };
        let program = PacProgram::synthesize(&[], &[], &settings);
        assert_eq!(program.default_directive(), &ProxyDirective::Direct);
    }

    // ==================== Bundle Expansion Tests ====================

    #[test]
    fn telegram_pattern_expands_to_full_bundle() {
        let rule = DomainRule::new("t.me", ProxyType::Mtproto)
            .with_server("1.2.3.4", 443)
            .with_secret("dd00");
        let program = PacProgram::synthesize(&[], &[rule], &GlobalSettings::default());

        for host in ["t.me", "web.telegram.org", "telegram.org", "cdn.t.me"] {
            assert_eq!(
                program.evaluate(host).to_string(),
                "SOCKS5 1.2.3.4:443",
                "host {host} should route through the bundle"
            );
        }
        assert_eq!(program.evaluate("example.com").to_string(), "DIRECT");
    }

    #[test]
    fn bundle_expansion_deduplicates_matchers() {
        let rule = DomainRule::new("t.me; *.t.me", ProxyType::Mtproto)
            .with_server("1.2.3.4", 443)
            .with_secret("dd00");
        let program = PacProgram::synthesize(&[], &[rule], &GlobalSettings::default());
        let entry = &program.entries()[0];
        for (i, matcher) in entry.matchers.iter().enumerate() {
            assert!(
                !entry.matchers[..i].contains(matcher),
                "duplicate matcher {matcher:?}"
            );
        }
    }

    // ==================== Rendering Tests ====================

    #[test]
    fn render_is_deterministic() {
        let rules = vec![socks_rule("*.example.com"), socks_rule("t.me")];
        let tabs = vec![TabPattern::direct("a.example.com")];
        let settings = GlobalSettings::default();

        let a = PacProgram::synthesize(&tabs, &rules, &settings).render();
        let b = PacProgram::synthesize(&tabs, &rules, &settings).render();
        assert_eq!(a, b);
    }

    #[test]
    fn render_is_ascii_only() {
        let rules = vec![socks_rule("*.ex\u{00e4}mple.com")];
        let script = PacProgram::synthesize(&[], &rules, &GlobalSettings::default()).render();
        assert!(script.is_ascii());
    }

    #[test]
    fn render_contains_entry_point_and_directives() {
        let rules = vec![socks_rule("*.example.com")];
        let script = PacProgram::synthesize(&[], &rules, &GlobalSettings::default()).render();

        assert!(script.starts_with("function FindProxyForURL(url, host)"));
        assert!(script.contains("matchSuffix(host, \"example.com\")"));
        assert!(script.contains("return \"SOCKS s:1080\";"));
        assert!(script.ends_with("return \"DIRECT\";\n}\n"));
    }

    #[test]
    fn render_orders_tab_entries_before_domain_entries() {
        let tabs = vec![TabPattern::direct("a.example.com")];
        let rules = vec![socks_rule("*.example.com")];
        let script = PacProgram::synthesize(&tabs, &rules, &GlobalSettings::default()).render();

        let tab_pos = script.find("host === \"a.example.com\"").unwrap();
        let rule_pos = script.find("matchSuffix(host, \"example.com\")").unwrap();
        assert!(tab_pos < rule_pos);
    }

    #[test]
    fn render_escapes_quotes_in_patterns() {
        let rules = vec![DomainRule::new("bad\"pattern", ProxyType::Direct)];
        let script = PacProgram::synthesize(&[], &rules, &GlobalSettings::default()).render();
        assert!(script.contains("host === \"bad\\\"pattern\""));
    }

    #[test]
    fn glob_entries_render_regex_sources() {
        let rules = vec![DomainRule::new("cdn*.example.com", ProxyType::Direct)];
        let program = PacProgram::synthesize(&[], &rules, &GlobalSettings::default());
        let script = program.render();

        // The embedded source must carry doubled backslashes so the JS
        // string literal decodes back to the regex
        assert!(script.contains("matchGlob(host, \"^cdn.*\\\\.example\\\\.com$\")"));
        assert_eq!(program.evaluate("cdn7.example.com"), &ProxyDirective::Direct);
    }

    // ==================== Sanitizer Tests ====================

    #[test]
    fn sanitize_ascii_strips_non_ascii() {
        assert_eq!(sanitize_ascii("a\u{2603}b\nc"), "ab\nc");
        assert_eq!(sanitize_ascii("plain"), "plain");
    }

    #[test]
    fn matching_entries_counts_overlaps() {
        let rules = vec![socks_rule("*.example.com"), socks_rule("a.example.com")];
        let program = PacProgram::synthesize(&[], &rules, &GlobalSettings::default());
        assert_eq!(program.matching_entries("a.example.com"), 2);
        assert_eq!(program.matching_entries("other.org"), 0);
    }
}
