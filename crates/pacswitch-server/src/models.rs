//! API request and response models.

use serde::{Deserialize, Serialize};

use pacswitch_core::mtproto::MtprotoActivity;
use pacswitch_core::rules::{DomainRule, GlobalSettings, Options, ProxyType, TabRule};
use pacswitch_proxy::AppliedPolicy;

use crate::tabs::TabInfo;

/// The envelope every command answers with, exactly once.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Whether the command succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Command-specific payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResponse {
    /// A bare success.
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    /// A success carrying a payload.
    pub fn with_data(data: impl Serialize) -> Self {
        Self {
            success: true,
            error: None,
            data: serde_json::to_value(data).ok(),
        }
    }

    /// A failure with a user-facing message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Request body for `updateProxySettings`.
#[derive(Debug, Deserialize)]
pub struct UpdateProxySettingsRequest {
    /// The new global settings.
    pub settings: GlobalSettings,
}

/// Request body for `updateOptionsSettings`.
#[derive(Debug, Deserialize)]
pub struct UpdateOptionsRequest {
    /// The new options.
    pub options: Options,
}

/// Optional request body for `updateTabProxies`.
///
/// When `tabs` is present it is the live tab list; otherwise the
/// server-side provider is consulted.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTabProxiesRequest {
    #[serde(default)]
    pub tabs: Option<Vec<TabInfo>>,
}

/// Request body for PUT /api/rules.
#[derive(Debug, Deserialize)]
pub struct ReplaceRulesRequest {
    /// The full rule list in evaluation order.
    pub rules: Vec<DomainRule>,
}

/// Response body for GET /api/rules.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub rules: Vec<DomainRule>,
}

/// Request body for PUT /api/tabs.
#[derive(Debug, Deserialize)]
pub struct ReplaceTabRulesRequest {
    /// The full set of per-tab assignments.
    pub rules: Vec<TabRule>,
}

/// Response body for GET /api/tabs.
#[derive(Debug, Serialize)]
pub struct TabsResponse {
    pub tabs: Vec<TabInfo>,
    pub rules: Vec<TabRule>,
}

/// Response body for GET /api/policy.
#[derive(Debug, Serialize)]
pub struct PolicyResponse {
    pub policy: Option<AppliedPolicy>,
}

/// Payload for `runDiagnostics`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DiagnosticsData {
    pub settings_enabled: bool,
    pub proxy_type: ProxyType,
    pub policy_mode: Option<String>,
    pub pac_script_len: Option<usize>,
    pub domain_rule_count: usize,
    pub tab_rule_count: usize,
    pub tab_pattern_count: usize,
    pub mtproto_active: bool,
    pub mtproto_details: Option<MtprotoActivity>,
}

/// Payload for `convertMTProtoToSOCKS5`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConvertMtprotoData {
    /// Whether the global settings were converted.
    pub settings_converted: bool,
    /// How many domain rules were converted.
    pub rules_converted: usize,
}

/// Payload for `reloadTelegramProxy`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadTelegramData {
    /// How many Telegram rules are now configured.
    pub rules_installed: usize,
}
