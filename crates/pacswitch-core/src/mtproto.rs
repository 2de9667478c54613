//! MTProto proxy support.
//!
//! The host network stack has no MTProto transport, so MTProto
//! configurations are carried along for two purposes only: downgrading
//! to SOCKS5 at directive-encoding time, and diagnostics. This module
//! holds the secret handling, the activity bookkeeping record, the
//! SOCKS5 conversion, and the support report assembled for the UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::{DomainRule, GlobalSettings, ProxyType, ValidationError};

/// Guidance shown whenever MTProto limitations are diagnosed.
pub const RECOMMENDATION: &str = "Browsers cannot speak MTProto natively; the proxy is applied \
as SOCKS5 transport only. For reliable Telegram access use a plain SOCKS5 proxy, the Telegram \
desktop app, or a local MTProto-to-SOCKS5 translation service.";

/// Normalizes an MTProto secret: trims, strips the optional "dd"
/// prefix, lowercases, and verifies the remainder is hex.
pub fn normalize_secret(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingSecret);
    }

    let lowered = trimmed.to_ascii_lowercase();
    let stripped = lowered.strip_prefix("dd").unwrap_or(&lowered);

    if stripped.is_empty() || !stripped.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ValidationError::BadSecret(trimmed.to_string()));
    }

    Ok(stripped.to_string())
}

/// Bookkeeping record written whenever an MTProto configuration takes
/// part in an applied policy. Diagnostics only — never consulted by the
/// matching logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtprotoActivity {
    /// MTProto server.
    pub server: String,
    /// MTProto port.
    pub port: u16,
    /// Whether a secret was configured (the secret itself stays out of
    /// the record).
    pub secret_provided: bool,
    /// When the configuration was last applied.
    pub activated_at: DateTime<Utc>,
    /// Where the configuration came from: "settings", "domain_rule", or
    /// "tab_rule".
    pub source: String,
}

impl MtprotoActivity {
    /// Creates an activity record stamped with the current time.
    pub fn new(server: impl Into<String>, port: u16, secret_provided: bool, source: &str) -> Self {
        Self {
            server: server.into(),
            port,
            secret_provided,
            activated_at: Utc::now(),
            source: source.to_string(),
        }
    }
}

/// Summary of one Telegram-related rule, for the support report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramRuleSummary {
    pub pattern: String,
    pub proxy_type: ProxyType,
}

/// MTProto support report (the `diagnoseMTProtoSupport` payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtprotoReport {
    /// Currently applied policy mode.
    pub policy_mode: String,
    /// Length of the applied PAC script, when one is applied.
    pub pac_script_len: Option<usize>,
    /// Whether an MTProto configuration has been applied.
    pub mtproto_active: bool,
    /// The last activity record, if any.
    pub details: Option<MtprotoActivity>,
    /// Telegram-related rules currently configured.
    pub telegram_rules: Vec<TelegramRuleSummary>,
    /// How many PAC entries route Telegram hosts.
    pub telegram_pac_matches: usize,
    /// Human-readable limitation notice.
    pub recommendation: String,
}

/// Collects Telegram-related rules from the rule list.
pub fn telegram_rules(domain_rules: &[DomainRule]) -> Vec<TelegramRuleSummary> {
    domain_rules
        .iter()
        .filter(|r| crate::bundles::TELEGRAM.matches_marker(&r.pattern))
        .map(|r| TelegramRuleSummary {
            pattern: r.pattern.clone(),
            proxy_type: r.proxy_type,
        })
        .collect()
}

/// Converts MTProto global settings to their SOCKS5 transport
/// equivalent. Returns true if anything changed.
pub fn convert_settings_to_socks5(settings: &mut GlobalSettings) -> bool {
    if settings.proxy_type != ProxyType::Mtproto {
        return false;
    }
    settings.proxy_type = ProxyType::Socks5;
    settings.mtproto_secret.clear();
    true
}

/// Converts one MTProto rule to its SOCKS5 transport equivalent.
/// Returns true if the rule changed.
pub fn convert_rule_to_socks5(rule: &mut DomainRule) -> bool {
    if rule.proxy_type != ProxyType::Mtproto {
        return false;
    }
    rule.proxy_type = ProxyType::Socks5;
    rule.mtproto_secret.clear();
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Secret Tests ====================

    #[test]
    fn secret_strips_dd_prefix() {
        assert_eq!(normalize_secret("dd0123abcd").unwrap(), "0123abcd");
    }

    #[test]
    fn secret_without_prefix_passes_through() {
        assert_eq!(normalize_secret("0123ABCD").unwrap(), "0123abcd");
    }

    #[test]
    fn secret_rejects_non_hex() {
        assert!(matches!(
            normalize_secret("not-hex!"),
            Err(ValidationError::BadSecret(_))
        ));
    }

    #[test]
    fn secret_rejects_empty() {
        assert_eq!(normalize_secret("  "), Err(ValidationError::MissingSecret));
        // A bare prefix carries no key material
        assert!(matches!(
            normalize_secret("dd"),
            Err(ValidationError::BadSecret(_))
        ));
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn convert_settings_rewrites_mtproto() {
        let mut settings = GlobalSettings {
            proxy_type: ProxyType::Mtproto,
            server: "1.2.3.4".to_string(),
            port: 443,
            mtproto_secret: "dd00".to_string(),
            ..Default::default()
        };
        assert!(convert_settings_to_socks5(&mut settings));
        assert_eq!(settings.proxy_type, ProxyType::Socks5);
        assert!(settings.mtproto_secret.is_empty());
        assert_eq!(settings.server, "1.2.3.4");
    }

    #[test]
    fn convert_settings_leaves_other_types_alone() {
        let mut settings = GlobalSettings::default();
        assert!(!convert_settings_to_socks5(&mut settings));
        assert_eq!(settings.proxy_type, ProxyType::Http);
    }

    #[test]
    fn convert_rule_rewrites_mtproto_only() {
        let mut rule = DomainRule::new("t.me", ProxyType::Mtproto)
            .with_server("1.2.3.4", 443)
            .with_secret("dd00");
        assert!(convert_rule_to_socks5(&mut rule));
        assert_eq!(rule.proxy_type, ProxyType::Socks5);
        assert!(rule.mtproto_secret.is_empty());
        assert!(!convert_rule_to_socks5(&mut rule));
    }

    // ==================== Report Tests ====================

    #[test]
    fn telegram_rules_filters_by_marker() {
        let rules = vec![
            DomainRule::new("*.telegram.org", ProxyType::Mtproto).with_server("s", 443),
            DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
        ];
        let summaries = telegram_rules(&rules);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].pattern, "*.telegram.org");
    }

    #[test]
    fn activity_record_omits_secret_material() {
        let activity = MtprotoActivity::new("1.2.3.4", 443, true, "settings");
        let json = serde_json::to_string(&activity).unwrap();
        assert!(json.contains("secret_provided"));
        assert!(!json.contains("dd00"));
        assert_eq!(activity.source, "settings");
    }
}
