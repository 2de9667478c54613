//! Rule and settings model.
//!
//! Three layers of configuration feed the policy resolver:
//!
//! 1. [`GlobalSettings`] — the default proxy applied when nothing more
//!    specific matches.
//! 2. [`DomainRule`] — an ordered list of per-domain overrides; list
//!    order is evaluation priority, first match wins.
//! 3. Tab overrides — a [`TabAssignment`] per browser tab, materialized
//!    at apply time into disposable [`TabPattern`] snapshots.
//!
//! Domain rules carry a stable generated identifier so tab assignments
//! survive reordering and deletion of other rules.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of generated rule identifiers.
const RULE_ID_LEN: usize = 12;

/// Errors raised when validating user-supplied settings or rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// An enabled non-direct proxy needs a server and port.
    #[error("please enter a valid server and port")]
    MissingServer,

    /// MTProto proxies need a secret key.
    #[error("please enter a secret key for the MTProto proxy")]
    MissingSecret,

    /// The MTProto secret must be hexadecimal.
    #[error("MTProto secret is not valid hex: {0}")]
    BadSecret(String),

    /// A domain rule needs a pattern.
    #[error("please enter a domain pattern")]
    MissingPattern,

    /// A custom PAC script must define the standard entry point.
    #[error("PAC script must contain a FindProxyForURL function")]
    InvalidCustomPac,
}

/// Supported proxy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    /// No proxy: connect directly.
    Direct,
    /// HTTP proxy.
    #[default]
    Http,
    /// HTTPS (CONNECT over TLS) proxy.
    Https,
    /// SOCKS4 proxy.
    Socks4,
    /// SOCKS5 proxy.
    Socks5,
    /// Telegram MTProto proxy. The host network stack cannot speak
    /// MTProto, so this is downgraded to its SOCKS5 transport when
    /// encoded into a directive.
    Mtproto,
}

impl ProxyType {
    /// Returns the type as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyType::Direct => "direct",
            ProxyType::Http => "http",
            ProxyType::Https => "https",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
            ProxyType::Mtproto => "mtproto",
        }
    }

    /// Parses a type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(ProxyType::Direct),
            "http" => Some(ProxyType::Http),
            "https" => Some(ProxyType::Https),
            "socks4" => Some(ProxyType::Socks4),
            "socks5" => Some(ProxyType::Socks5),
            "mtproto" => Some(ProxyType::Mtproto),
            _ => None,
        }
    }

    /// Returns true if this type requires a server and port.
    pub fn needs_server(&self) -> bool {
        !matches!(self, ProxyType::Direct)
    }
}

impl std::fmt::Display for ProxyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the resolver should do when no rule matches and the global
/// proxy is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    /// Honor the configured global proxy as the default route.
    #[default]
    Global,
    /// Always fall back to a direct connection; only domain and tab
    /// rules ever route through a proxy.
    Direct,
}

/// Global proxy settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// Master switch for the global proxy.
    pub enabled: bool,
    /// Proxy type for the default route.
    pub proxy_type: ProxyType,
    /// Proxy server hostname or IP.
    pub server: String,
    /// Proxy server port.
    pub port: u16,
    /// Username for HTTP/HTTPS authentication.
    pub username: String,
    /// Password for HTTP/HTTPS authentication.
    pub password: String,
    /// Whitespace- or comma-separated hosts that bypass the proxy.
    pub bypass_list: String,
    /// MTProto secret (hex, optional "dd" prefix).
    pub mtproto_secret: String,
    /// Default-route behavior when no rule matches.
    pub fallback: FallbackMode,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_type: ProxyType::Http,
            server: String::new(),
            port: 8080,
            username: String::new(),
            password: String::new(),
            bypass_list: String::new(),
            mtproto_secret: String::new(),
            fallback: FallbackMode::Global,
        }
    }
}

impl GlobalSettings {
    /// Validates settings before they are persisted.
    ///
    /// Disabled settings are always valid; an enabled non-direct proxy
    /// needs a server and port, and MTProto additionally needs a secret.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.enabled || !self.proxy_type.needs_server() {
            return Ok(());
        }
        if self.server.trim().is_empty() || self.port == 0 {
            return Err(ValidationError::MissingServer);
        }
        if self.proxy_type == ProxyType::Mtproto && self.mtproto_secret.trim().is_empty() {
            return Err(ValidationError::MissingSecret);
        }
        Ok(())
    }

    /// Splits the bypass list into individual hosts.
    pub fn bypass_hosts(&self) -> Vec<String> {
        self.bypass_list
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Generates a stable rule identifier.
pub fn generate_rule_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RULE_ID_LEN)
        .map(char::from)
        .collect()
}

/// A per-domain proxy rule.
///
/// The pattern may contain several `;`-separated sub-patterns; see
/// [`crate::pattern::matches`] for the matching semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRule {
    /// Stable identifier; survives reordering of the rule list.
    #[serde(default = "generate_rule_id")]
    pub id: String,
    /// Domain pattern.
    pub pattern: String,
    /// Proxy type for matching hosts.
    pub proxy_type: ProxyType,
    /// Proxy server hostname or IP.
    #[serde(default)]
    pub server: String,
    /// Proxy server port.
    #[serde(default)]
    pub port: u16,
    /// Username for HTTP/HTTPS authentication.
    #[serde(default)]
    pub username: String,
    /// Password for HTTP/HTTPS authentication.
    #[serde(default)]
    pub password: String,
    /// MTProto secret for mtproto rules.
    #[serde(default)]
    pub mtproto_secret: String,
}

impl DomainRule {
    /// Creates a rule with a fresh identifier.
    pub fn new(pattern: impl Into<String>, proxy_type: ProxyType) -> Self {
        Self {
            id: generate_rule_id(),
            pattern: pattern.into(),
            proxy_type,
            server: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            mtproto_secret: String::new(),
        }
    }

    /// Sets the server and port.
    pub fn with_server(mut self, server: impl Into<String>, port: u16) -> Self {
        self.server = server.into();
        self.port = port;
        self
    }

    /// Sets the credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the MTProto secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.mtproto_secret = secret.into();
        self
    }

    /// Returns true if the rule carries enough data to synthesize a
    /// PAC entry. Malformed rules are skipped, not rejected.
    pub fn is_wellformed(&self) -> bool {
        if self.pattern.trim().is_empty() {
            return false;
        }
        if self.proxy_type.needs_server() && (self.server.trim().is_empty() || self.port == 0) {
            return false;
        }
        true
    }

    /// Validates a rule before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pattern.trim().is_empty() {
            return Err(ValidationError::MissingPattern);
        }
        if self.proxy_type.needs_server() && (self.server.trim().is_empty() || self.port == 0) {
            return Err(ValidationError::MissingServer);
        }
        if self.proxy_type == ProxyType::Mtproto && self.mtproto_secret.trim().is_empty() {
            return Err(ValidationError::MissingSecret);
        }
        Ok(())
    }
}

/// What a tab is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TabAssignment {
    /// Direct connection for this tab's host.
    Direct,
    /// Follow the global settings (no tab pattern is generated).
    Default,
    /// Route through the domain rule with this identifier.
    Rule(String),
}

impl TabAssignment {
    /// Renders the assignment as its storage string.
    pub fn as_string(&self) -> String {
        match self {
            TabAssignment::Direct => "direct".to_string(),
            TabAssignment::Default => "default".to_string(),
            TabAssignment::Rule(id) => format!("rule:{id}"),
        }
    }

    /// Parses an assignment from its storage string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(TabAssignment::Direct),
            "default" => Some(TabAssignment::Default),
            other => other
                .strip_prefix("rule:")
                .filter(|id| !id.is_empty())
                .map(|id| TabAssignment::Rule(id.to_string())),
        }
    }
}

impl From<TabAssignment> for String {
    fn from(value: TabAssignment) -> Self {
        value.as_string()
    }
}

impl TryFrom<String> for TabAssignment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TabAssignment::parse(&value).ok_or_else(|| format!("unknown tab assignment: {value}"))
    }
}

/// A tab's proxy override, keyed by the browser's ephemeral tab id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabRule {
    /// Browser tab identifier.
    pub tab_id: i64,
    /// What this tab routes through.
    pub assignment: TabAssignment,
}

/// A materialized tab override: the tab's hostname snapshotted together
/// with the proxy it resolved to.
///
/// Tab patterns are regenerated on every tab or rule change and are a
/// disposable cache, never source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabPattern {
    /// Hostname of the tab at materialization time.
    pub pattern: String,
    /// Proxy type for this tab.
    pub proxy_type: ProxyType,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub mtproto_secret: String,
}

impl TabPattern {
    /// Creates a direct-connection pattern for a host.
    pub fn direct(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            proxy_type: ProxyType::Direct,
            server: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            mtproto_secret: String::new(),
        }
    }

    /// Snapshots a domain rule for a specific host.
    pub fn from_rule(pattern: impl Into<String>, rule: &DomainRule) -> Self {
        Self {
            pattern: pattern.into(),
            proxy_type: rule.proxy_type,
            server: rule.server.clone(),
            port: rule.port,
            username: rule.username.clone(),
            password: rule.password.clone(),
            mtproto_secret: rule.mtproto_secret.clone(),
        }
    }

    /// Returns true if the pattern can be synthesized into a PAC entry.
    pub fn is_wellformed(&self) -> bool {
        if self.pattern.trim().is_empty() {
            return false;
        }
        if self.proxy_type.needs_server() && (self.server.trim().is_empty() || self.port == 0) {
            return false;
        }
        true
    }
}

/// Behavior at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupBehavior {
    /// Re-apply whatever was configured last.
    #[default]
    Remember,
    /// Always start with a direct connection.
    Direct,
    /// Always start with the proxy enabled.
    Enabled,
}

/// Secondary options (options page of the original UI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Behavior at startup.
    pub startup_behavior: StartupBehavior,
    /// Show a notification after settings changes.
    pub show_notifications: bool,
    /// Re-apply the policy after a network-layer error.
    pub auto_reconnect: bool,
    /// Bypass synthesis and apply `custom_pac_script` verbatim.
    pub use_custom_pac: bool,
    /// User-authored PAC script, used when `use_custom_pac` is set.
    pub custom_pac_script: String,
    /// Ask the host privacy layer to block WebRTC IP leaks. Recorded
    /// and surfaced only; enforcement belongs to the host.
    pub block_webrtc: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            startup_behavior: StartupBehavior::Remember,
            show_notifications: true,
            auto_reconnect: false,
            use_custom_pac: false,
            custom_pac_script: String::new(),
            block_webrtc: false,
        }
    }
}

impl Options {
    /// Validates options before they are persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.use_custom_pac && !self.custom_pac_script.contains("function FindProxyForURL") {
            return Err(ValidationError::InvalidCustomPac);
        }
        Ok(())
    }
}
