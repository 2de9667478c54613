//! Policy targets.
//!
//! A [`PolicyTarget`] is the seam between the policy engine and the
//! host network layer: it accepts a fully resolved [`AppliedPolicy`],
//! reports the one currently in effect, and surfaces apply failures
//! through an error-event callback. Applies are idempotent overwrites;
//! whatever arrives last wins.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pacswitch_core::resolver::Policy;

use crate::error::Result;

/// A resolved policy in the shape the network layer consumes.
///
/// This mirrors the host proxy API's value space: a direct mode, a
/// fixed-servers mode, or a PAC script mode carrying the rendered
/// script text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AppliedPolicy {
    /// No proxying.
    Direct,
    /// One proxy for everything, minus the bypass list.
    FixedServers {
        directive: String,
        #[serde(default)]
        bypass: Vec<String>,
    },
    /// Per-request decisions via the embedded PAC script.
    PacScript { script: String },
}

impl AppliedPolicy {
    /// Renders a resolved [`Policy`] into its applied form. This is
    /// the single place PAC programs become text.
    pub fn from_policy(policy: &Policy) -> Self {
        match policy {
            Policy::Direct => AppliedPolicy::Direct,
            Policy::Fixed { directive, bypass } => AppliedPolicy::FixedServers {
                directive: directive.to_string(),
                bypass: bypass.clone(),
            },
            Policy::Pac { program } => AppliedPolicy::PacScript {
                script: program.render(),
            },
        }
    }

    /// Returns the policy mode as a string.
    pub fn mode(&self) -> &'static str {
        match self {
            AppliedPolicy::Direct => "direct",
            AppliedPolicy::FixedServers { .. } => "fixed_servers",
            AppliedPolicy::PacScript { .. } => "pac_script",
        }
    }

    /// Returns the PAC script, when one is applied.
    pub fn script(&self) -> Option<&str> {
        match self {
            AppliedPolicy::PacScript { script } => Some(script),
            _ => None,
        }
    }
}

/// Callback invoked when a policy apply fails at the target.
pub type OnPolicyErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// The network-layer boundary.
pub trait PolicyTarget: Send + Sync {
    /// Installs a policy, replacing whatever was in effect.
    fn set_policy(&self, policy: AppliedPolicy) -> Result<()>;

    /// Returns the policy currently in effect, if any.
    fn policy(&self) -> Option<AppliedPolicy>;
}

/// An in-memory policy target.
///
/// The default target for tests and for embedding, where the consumer
/// reads the applied policy back out instead of installing it anywhere.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<RwLock<MemoryTargetState>>,
}

#[derive(Default)]
struct MemoryTargetState {
    current: Option<AppliedPolicy>,
    applies: u64,
}

impl MemoryTarget {
    /// Creates an empty target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of applies performed, for observing overwrite behavior.
    pub fn apply_count(&self) -> u64 {
        self.state.read().applies
    }
}

impl PolicyTarget for MemoryTarget {
    fn set_policy(&self, policy: AppliedPolicy) -> Result<()> {
        debug!(mode = policy.mode(), "applying policy to memory target");
        let mut state = self.state.write();
        state.current = Some(policy);
        state.applies += 1;
        Ok(())
    }

    fn policy(&self) -> Option<AppliedPolicy> {
        self.state.read().current.clone()
    }
}
