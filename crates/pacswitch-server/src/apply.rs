//! The apply worker.
//!
//! Every trigger — startup, a settings or rule mutation, a tab change —
//! performs a full, independent resolve-and-apply: load state, resolve
//! a policy, overwrite the target. Triggers flow through a single
//! mpsc-fed worker task per policy target, so overlapping triggers
//! serialize deterministically and the last completed apply wins.
//!
//! Storage read failures degrade to defaults rather than failing the
//! cycle; a target failure falls back to a direct connection so the
//! network layer is never left without a valid policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use pacswitch_core::mtproto::MtprotoActivity;
use pacswitch_core::pac::sanitize_ascii;
use pacswitch_core::resolver::resolve;
use pacswitch_core::rules::{DomainRule, GlobalSettings, Options, ProxyType, TabPattern};
use pacswitch_proxy::{AppliedPolicy, PolicyTarget};
use pacswitch_storage::Database;

/// How long a command handler waits for its apply to complete before
/// responding anyway.
pub const APPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// What caused an apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTrigger {
    Startup,
    SettingsChanged,
    OptionsChanged,
    RulesChanged,
    TabsChanged,
    Reset,
}

impl ApplyTrigger {
    /// Returns the trigger as a string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyTrigger::Startup => "startup",
            ApplyTrigger::SettingsChanged => "settings_changed",
            ApplyTrigger::OptionsChanged => "options_changed",
            ApplyTrigger::RulesChanged => "rules_changed",
            ApplyTrigger::TabsChanged => "tabs_changed",
            ApplyTrigger::Reset => "reset",
        }
    }
}

/// Outcome reported to a waiting command handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The apply completed; carries the applied policy mode.
    Applied(&'static str),
    /// The apply did not complete within [`APPLY_TIMEOUT`]; it keeps
    /// running behind the response.
    TimedOut,
}

struct ApplyMsg {
    trigger: ApplyTrigger,
    ack: Option<oneshot::Sender<Result<&'static str, String>>>,
}

/// Handle for enqueueing apply cycles.
#[derive(Clone)]
pub struct ApplyHandle {
    tx: mpsc::UnboundedSender<ApplyMsg>,
}

impl ApplyHandle {
    /// Enqueues an apply without waiting for it.
    pub fn trigger(&self, trigger: ApplyTrigger) {
        if self
            .tx
            .send(ApplyMsg { trigger, ack: None })
            .is_err()
        {
            warn!("apply worker is gone, trigger dropped");
        }
    }

    /// Enqueues an apply and waits for it, bounded by [`APPLY_TIMEOUT`].
    ///
    /// A timeout is not an error: the response must go out exactly once
    /// even if the apply stalls, so the caller gets [`ApplyOutcome::TimedOut`]
    /// and the cycle finishes behind it.
    pub async fn apply_and_wait(&self, trigger: ApplyTrigger) -> Result<ApplyOutcome, String> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(ApplyMsg {
                trigger,
                ack: Some(ack_tx),
            })
            .map_err(|_| "apply worker unavailable".to_string())?;

        match tokio::time::timeout(APPLY_TIMEOUT, ack_rx).await {
            Ok(Ok(Ok(mode))) => Ok(ApplyOutcome::Applied(mode)),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err("apply worker unavailable".to_string()),
            Err(_) => {
                warn!(
                    trigger = trigger.as_str(),
                    "apply did not complete within {:?}, responding anyway",
                    APPLY_TIMEOUT
                );
                Ok(ApplyOutcome::TimedOut)
            }
        }
    }
}

/// Spawns the single-consumer apply worker for a policy target.
pub fn spawn_apply_worker(db: Arc<Database>, target: Arc<dyn PolicyTarget>) -> ApplyHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<ApplyMsg>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            debug!(trigger = msg.trigger.as_str(), "apply cycle starting");
            let result = perform_apply(&db, &*target);

            match &result {
                Ok(mode) => info!(trigger = msg.trigger.as_str(), mode, "policy applied"),
                Err(e) => warn!(trigger = msg.trigger.as_str(), "apply failed: {e}"),
            }

            if let Some(ack) = msg.ack {
                let _ = ack.send(result);
            }
        }
    });

    ApplyHandle { tx }
}

/// One full resolve-and-apply cycle.
fn perform_apply(db: &Database, target: &dyn PolicyTarget) -> Result<&'static str, String> {
    let options = db.get_options().unwrap_or_else(|e| {
        warn!("failed to load options, using defaults: {e}");
        Options::default()
    });

    // A user-authored PAC script bypasses synthesis entirely
    if options.use_custom_pac && !options.custom_pac_script.trim().is_empty() {
        let applied = AppliedPolicy::PacScript {
            script: sanitize_ascii(&options.custom_pac_script),
        };
        return install(target, applied);
    }

    let settings = db.get_settings().unwrap_or_else(|e| {
        warn!("failed to load settings, using defaults: {e}");
        GlobalSettings::default()
    });
    let domain_rules = db.get_domain_rules().unwrap_or_else(|e| {
        warn!("failed to load domain rules, using none: {e}");
        Vec::new()
    });
    let tab_patterns = db.get_tab_patterns().unwrap_or_else(|e| {
        warn!("failed to load tab patterns, using none: {e}");
        Vec::new()
    });

    record_mtproto_activity(db, &settings, &domain_rules, &tab_patterns);

    let policy = resolve(&settings, &domain_rules, &tab_patterns);
    install(target, AppliedPolicy::from_policy(&policy))
}

/// Installs a policy, falling back to DIRECT if the target rejects it.
fn install(target: &dyn PolicyTarget, applied: AppliedPolicy) -> Result<&'static str, String> {
    let mode = applied.mode();
    match target.set_policy(applied) {
        Ok(()) => Ok(mode),
        Err(e) => {
            warn!("target rejected policy, falling back to direct: {e}");
            if let Err(fallback_err) = target.set_policy(AppliedPolicy::Direct) {
                warn!("direct fallback also failed: {fallback_err}");
            }
            Err(e.to_string())
        }
    }
}

/// Records which MTProto configuration (if any) takes part in the
/// current apply. Bookkeeping only; failures are logged and ignored.
fn record_mtproto_activity(
    db: &Database,
    settings: &GlobalSettings,
    domain_rules: &[DomainRule],
    tab_patterns: &[TabPattern],
) {
    let activity = if settings.enabled && settings.proxy_type == ProxyType::Mtproto {
        Some(MtprotoActivity::new(
            settings.server.clone(),
            settings.port,
            !settings.mtproto_secret.is_empty(),
            "settings",
        ))
    } else if let Some(rule) = domain_rules
        .iter()
        .find(|r| r.proxy_type == ProxyType::Mtproto && r.is_wellformed())
    {
        Some(MtprotoActivity::new(
            rule.server.clone(),
            rule.port,
            !rule.mtproto_secret.is_empty(),
            "domain_rule",
        ))
    } else {
        tab_patterns
            .iter()
            .find(|p| p.proxy_type == ProxyType::Mtproto && p.is_wellformed())
            .map(|p| {
                MtprotoActivity::new(
                    p.server.clone(),
                    p.port,
                    !p.mtproto_secret.is_empty(),
                    "tab_rule",
                )
            })
    };

    if let Some(activity) = activity {
        if let Err(e) = db.record_mtproto_activity(&activity) {
            warn!("failed to record MTProto activity: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacswitch_core::rules::DomainRule;
    use pacswitch_proxy::MemoryTarget;

    fn setup() -> (Arc<Database>, Arc<MemoryTarget>, ApplyHandle) {
        let db = Arc::new(Database::in_memory().unwrap());
        let target = Arc::new(MemoryTarget::new());
        let handle = spawn_apply_worker(db.clone(), target.clone());
        (db, target, handle)
    }

    #[tokio::test]
    async fn apply_with_no_config_installs_direct() {
        let (_db, target, handle) = setup();

        let outcome = handle.apply_and_wait(ApplyTrigger::Startup).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied("direct"));
        assert_eq!(target.policy().unwrap(), AppliedPolicy::Direct);
    }

    #[tokio::test]
    async fn apply_with_enabled_settings_installs_fixed() {
        let (db, target, handle) = setup();

        db.set_settings(&GlobalSettings {
            enabled: true,
            server: "10.0.0.1".to_string(),
            port: 3128,
            ..Default::default()
        })
        .unwrap();

        let outcome = handle
            .apply_and_wait(ApplyTrigger::SettingsChanged)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied("fixed_servers"));

        match target.policy().unwrap() {
            AppliedPolicy::FixedServers { directive, .. } => {
                assert_eq!(directive, "HTTP 10.0.0.1:3128");
            }
            other => panic!("expected fixed policy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn apply_with_rules_installs_pac_script() {
        let (db, target, handle) = setup();

        db.add_domain_rule(
            &DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
        )
        .unwrap();

        let outcome = handle
            .apply_and_wait(ApplyTrigger::RulesChanged)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied("pac_script"));

        let script = target.policy().unwrap().script().unwrap().to_string();
        assert!(script.contains("SOCKS s:1080"));
    }

    #[tokio::test]
    async fn custom_pac_bypasses_synthesis() {
        let (db, target, handle) = setup();

        db.set_options(&Options {
            use_custom_pac: true,
            custom_pac_script:
                "function FindProxyForURL(url, host) { return \"PROXY h:80\"; }".to_string(),
            ..Default::default()
        })
        .unwrap();
        // Rules exist but the custom script wins
        db.add_domain_rule(
            &DomainRule::new("*.example.com", ProxyType::Socks5).with_server("s", 1080),
        )
        .unwrap();

        handle
            .apply_and_wait(ApplyTrigger::OptionsChanged)
            .await
            .unwrap();

        let script = target.policy().unwrap().script().unwrap().to_string();
        assert!(script.contains("PROXY h:80"));
        assert!(!script.contains("SOCKS s:1080"));
    }

    #[tokio::test]
    async fn rapid_triggers_serialize_and_last_state_wins() {
        let (db, target, handle) = setup();

        for _ in 0..5 {
            handle.trigger(ApplyTrigger::SettingsChanged);
        }

        db.set_settings(&GlobalSettings {
            enabled: true,
            server: "final".to_string(),
            port: 8080,
            ..Default::default()
        })
        .unwrap();

        let outcome = handle
            .apply_and_wait(ApplyTrigger::SettingsChanged)
            .await
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied("fixed_servers"));

        // All six applies ran, in order, and the last reflects the
        // final stored state
        assert_eq!(target.apply_count(), 6);
        match target.policy().unwrap() {
            AppliedPolicy::FixedServers { directive, .. } => {
                assert_eq!(directive, "HTTP final:8080");
            }
            other => panic!("expected fixed policy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mtproto_rule_apply_records_activity() {
        let (db, _target, handle) = setup();

        db.add_domain_rule(
            &DomainRule::new("t.me", ProxyType::Mtproto)
                .with_server("1.2.3.4", 443)
                .with_secret("dd00"),
        )
        .unwrap();

        handle
            .apply_and_wait(ApplyTrigger::RulesChanged)
            .await
            .unwrap();

        let activity = db.get_mtproto_activity().unwrap().unwrap();
        assert_eq!(activity.server, "1.2.3.4");
        assert_eq!(activity.source, "domain_rule");
        assert!(activity.secret_provided);
    }
}
