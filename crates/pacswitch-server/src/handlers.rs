//! API route handlers.
//!
//! Command routes answer through the `{success, error, data}` envelope
//! and respond exactly once, even when the apply behind them times out.
//! The rule/tab resource routes use plain REST semantics.

use axum::extract::State;
use axum::Json;
use tracing::{info, warn};

use pacswitch_core::bundles::TELEGRAM;
use pacswitch_core::mtproto::{
    convert_rule_to_socks5, convert_settings_to_socks5, telegram_rules, MtprotoReport,
    RECOMMENDATION,
};
use pacswitch_core::resolver::{resolve, Policy};
use pacswitch_core::rules::{GlobalSettings, ProxyType};
use pacswitch_storage::{Database, StorageError};

use crate::apply::ApplyTrigger;
use crate::error::{ApiError, Result};
use crate::models::{
    CommandResponse, ConvertMtprotoData, DiagnosticsData, PolicyResponse, ReloadTelegramData,
    ReplaceRulesRequest, ReplaceTabRulesRequest, RulesResponse, TabsResponse,
    UpdateOptionsRequest, UpdateProxySettingsRequest, UpdateTabProxiesRequest,
};
use crate::state::AppState;
use crate::tabs::materialize_tab_patterns;

// ==================== Command routes ====================

/// POST /api/commands/updateProxySettings
pub async fn update_proxy_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateProxySettingsRequest>,
) -> Json<CommandResponse> {
    let settings = req.settings;

    if let Err(e) = settings.validate() {
        return Json(CommandResponse::failure(e.to_string()));
    }

    if let Err(e) = state.db.set_settings(&settings) {
        return Json(CommandResponse::failure(e.to_string()));
    }

    // An enabled MTProto configuration implies Telegram coverage
    if settings.enabled
        && settings.proxy_type == ProxyType::Mtproto
        && !settings.mtproto_secret.trim().is_empty()
    {
        if let Err(e) = sync_telegram_rules(&state.db, &settings) {
            warn!("failed to install Telegram rules: {e}");
        }
    }

    match state.apply.apply_and_wait(ApplyTrigger::SettingsChanged).await {
        Ok(_) => Json(CommandResponse::ok()),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/updatePacFile
pub async fn update_pac_file(State(state): State<AppState>) -> Json<CommandResponse> {
    match state.apply.apply_and_wait(ApplyTrigger::RulesChanged).await {
        Ok(_) => Json(CommandResponse::ok()),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/updateOptionsSettings
pub async fn update_options_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateOptionsRequest>,
) -> Json<CommandResponse> {
    if let Err(e) = req.options.validate() {
        return Json(CommandResponse::failure(e.to_string()));
    }

    if let Err(e) = state.db.set_options(&req.options) {
        return Json(CommandResponse::failure(e.to_string()));
    }

    match state.apply.apply_and_wait(ApplyTrigger::OptionsChanged).await {
        Ok(_) => Json(CommandResponse::ok()),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/updateTabProxies
///
/// Reconciles per-tab assignments against the live tab list (carried in
/// the request, or read from the provider), regenerates the tab pattern
/// snapshot, and re-applies.
pub async fn update_tab_proxies(
    State(state): State<AppState>,
    body: Option<Json<UpdateTabProxiesRequest>>,
) -> Json<CommandResponse> {
    let tabs = body
        .and_then(|Json(req)| req.tabs)
        .unwrap_or_else(|| state.tabs.tabs());

    let tab_rules = state.db.get_tab_rules().unwrap_or_else(|e| {
        warn!("failed to load tab rules, using none: {e}");
        Vec::new()
    });
    let domain_rules = state.db.get_domain_rules().unwrap_or_else(|e| {
        warn!("failed to load domain rules, using none: {e}");
        Vec::new()
    });

    let patterns = materialize_tab_patterns(&tabs, &tab_rules, &domain_rules);
    info!(
        tabs = tabs.len(),
        patterns = patterns.len(),
        "tab patterns regenerated"
    );

    if let Err(e) = state.db.replace_tab_patterns(&patterns) {
        return Json(CommandResponse::failure(e.to_string()));
    }

    match state.apply.apply_and_wait(ApplyTrigger::TabsChanged).await {
        Ok(_) => Json(CommandResponse::ok()),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/resetSettings
pub async fn reset_settings(State(state): State<AppState>) -> Json<CommandResponse> {
    if let Err(e) = state.db.clear_all() {
        return Json(CommandResponse::failure(e.to_string()));
    }

    match state.apply.apply_and_wait(ApplyTrigger::Reset).await {
        Ok(_) => Json(CommandResponse::ok()),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/runDiagnostics
pub async fn run_diagnostics(State(state): State<AppState>) -> Json<CommandResponse> {
    let settings = state.db.get_settings().unwrap_or_default();
    let domain_rules = state.db.get_domain_rules().unwrap_or_default();
    let tab_rules = state.db.get_tab_rules().unwrap_or_default();
    let tab_patterns = state.db.get_tab_patterns().unwrap_or_default();
    let activity = state.db.get_mtproto_activity().unwrap_or_default();

    let applied = state.target.policy();

    let data = DiagnosticsData {
        settings_enabled: settings.enabled,
        proxy_type: settings.proxy_type,
        policy_mode: applied.as_ref().map(|p| p.mode().to_string()),
        pac_script_len: applied.as_ref().and_then(|p| p.script()).map(str::len),
        domain_rule_count: domain_rules.len(),
        tab_rule_count: tab_rules.len(),
        tab_pattern_count: tab_patterns.len(),
        mtproto_active: activity.is_some(),
        mtproto_details: activity,
    };

    Json(CommandResponse::with_data(data))
}

/// POST /api/commands/reloadTelegramProxy
///
/// Reinstalls the Telegram rule set from the current MTProto settings,
/// or re-applies existing Telegram rules when the settings are not an
/// MTProto configuration.
pub async fn reload_telegram_proxy(State(state): State<AppState>) -> Json<CommandResponse> {
    let settings = state.db.get_settings().unwrap_or_default();

    let has_mtproto_settings = settings.proxy_type == ProxyType::Mtproto
        && !settings.server.trim().is_empty()
        && !settings.mtproto_secret.trim().is_empty();

    if has_mtproto_settings {
        if let Err(e) = sync_telegram_rules(&state.db, &settings) {
            return Json(CommandResponse::failure(e.to_string()));
        }
    } else {
        let rules = state.db.get_domain_rules().unwrap_or_default();
        let has_telegram_mtproto = rules
            .iter()
            .any(|r| r.proxy_type == ProxyType::Mtproto && TELEGRAM.matches_marker(&r.pattern));
        if !has_telegram_mtproto {
            return Json(CommandResponse::failure("No MTProto rules found"));
        }
    }

    let installed = state
        .db
        .get_domain_rules()
        .unwrap_or_default()
        .iter()
        .filter(|r| TELEGRAM.matches_marker(&r.pattern))
        .count();

    match state.apply.apply_and_wait(ApplyTrigger::RulesChanged).await {
        Ok(_) => Json(CommandResponse::with_data(ReloadTelegramData {
            rules_installed: installed,
        })),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// POST /api/commands/diagnoseMTProtoSupport
pub async fn diagnose_mtproto_support(State(state): State<AppState>) -> Json<CommandResponse> {
    let settings = state.db.get_settings().unwrap_or_default();
    let domain_rules = state.db.get_domain_rules().unwrap_or_default();
    let tab_patterns = state.db.get_tab_patterns().unwrap_or_default();
    let activity = state.db.get_mtproto_activity().unwrap_or_default();

    let applied = state.target.policy();

    let telegram_pac_matches = match resolve(&settings, &domain_rules, &tab_patterns) {
        Policy::Pac { program } => program.matching_entries("web.telegram.org"),
        _ => 0,
    };

    let report = MtprotoReport {
        policy_mode: applied
            .as_ref()
            .map(|p| p.mode().to_string())
            .unwrap_or_else(|| "none".to_string()),
        pac_script_len: applied.as_ref().and_then(|p| p.script()).map(str::len),
        mtproto_active: activity.is_some(),
        details: activity,
        telegram_rules: telegram_rules(&domain_rules),
        telegram_pac_matches,
        recommendation: RECOMMENDATION.to_string(),
    };

    Json(CommandResponse::with_data(report))
}

/// POST /api/commands/convertMTProtoToSOCKS5
///
/// Rewrites the MTProto global settings and any MTProto domain rules to
/// their SOCKS5 transport equivalents, then re-applies.
pub async fn convert_mtproto_to_socks5(State(state): State<AppState>) -> Json<CommandResponse> {
    let mut settings = state.db.get_settings().unwrap_or_default();
    let settings_converted = convert_settings_to_socks5(&mut settings);
    if settings_converted {
        if let Err(e) = state.db.set_settings(&settings) {
            return Json(CommandResponse::failure(e.to_string()));
        }
    }

    let mut rules = state.db.get_domain_rules().unwrap_or_default();
    let rules_converted = rules
        .iter_mut()
        .map(|r| convert_rule_to_socks5(r))
        .filter(|&changed| changed)
        .count();
    if rules_converted > 0 {
        if let Err(e) = state.db.replace_domain_rules(&rules) {
            return Json(CommandResponse::failure(e.to_string()));
        }
    }

    match state.apply.apply_and_wait(ApplyTrigger::SettingsChanged).await {
        Ok(_) => Json(CommandResponse::with_data(ConvertMtprotoData {
            settings_converted,
            rules_converted,
        })),
        Err(e) => Json(CommandResponse::failure(e)),
    }
}

/// Replaces any existing Telegram rules with a fresh set built from the
/// given MTProto settings.
fn sync_telegram_rules(
    db: &Database,
    settings: &GlobalSettings,
) -> std::result::Result<usize, StorageError> {
    let mut rules = db.get_domain_rules()?;
    rules.retain(|r| !TELEGRAM.matches_marker(&r.pattern));
    rules.extend(TELEGRAM.rules_from_settings(settings));
    db.replace_domain_rules(&rules)?;
    info!("Telegram rules reinstalled from MTProto settings");
    Ok(TELEGRAM.domains.len())
}

// ==================== Resource routes ====================

/// GET /api/rules
pub async fn get_rules(State(state): State<AppState>) -> Result<Json<RulesResponse>> {
    let rules = state.db.get_domain_rules()?;
    Ok(Json(RulesResponse { rules }))
}

/// PUT /api/rules - replace the rule list (order = evaluation order).
pub async fn replace_rules(
    State(state): State<AppState>,
    Json(req): Json<ReplaceRulesRequest>,
) -> Result<Json<RulesResponse>> {
    for rule in &req.rules {
        rule.validate().map_err(ApiError::Validation)?;
    }

    state.db.replace_domain_rules(&req.rules)?;
    state.apply.trigger(ApplyTrigger::RulesChanged);

    let rules = state.db.get_domain_rules()?;
    Ok(Json(RulesResponse { rules }))
}

/// GET /api/tabs
pub async fn get_tabs(State(state): State<AppState>) -> Result<Json<TabsResponse>> {
    Ok(Json(TabsResponse {
        tabs: state.tabs.tabs(),
        rules: state.db.get_tab_rules()?,
    }))
}

/// PUT /api/tabs - replace the per-tab assignments.
pub async fn replace_tab_rules(
    State(state): State<AppState>,
    Json(req): Json<ReplaceTabRulesRequest>,
) -> Result<Json<TabsResponse>> {
    state.db.replace_tab_rules(&req.rules)?;

    Ok(Json(TabsResponse {
        tabs: state.tabs.tabs(),
        rules: state.db.get_tab_rules()?,
    }))
}

/// GET /api/policy - the policy currently installed at the target.
pub async fn get_policy(State(state): State<AppState>) -> Json<PolicyResponse> {
    Json(PolicyResponse {
        policy: state.target.policy(),
    })
}
