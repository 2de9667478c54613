//! File-backed policy target.
//!
//! Writes the effective policy as a PAC file at a fixed path, which an
//! OS or browser proxy configuration can point at (`file://` or served
//! by the host). Direct and fixed policies are written as equivalent
//! single-return scripts so the file always holds a valid decision
//! procedure.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::Result;
use crate::target::{AppliedPolicy, OnPolicyErrorCallback, PolicyTarget};

/// Policy target that renders every applied policy into a PAC file.
pub struct PacFileTarget {
    path: PathBuf,
    current: RwLock<Option<AppliedPolicy>>,
    on_error: RwLock<Option<OnPolicyErrorCallback>>,
}

impl PacFileTarget {
    /// Creates a target writing to the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
            on_error: RwLock::new(None),
        }
    }

    /// Registers a callback invoked when a write fails.
    pub fn on_error<F>(self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_error.write() = Some(Arc::new(callback));
        self
    }

    /// Path of the PAC file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders any applied policy as PAC text.
    fn script_for(policy: &AppliedPolicy) -> String {
        match policy {
            AppliedPolicy::Direct => {
                "function FindProxyForURL(url, host) {\n  return \"DIRECT\";\n}\n".to_string()
            }
            AppliedPolicy::FixedServers { directive, bypass } => {
                let mut out = String::from("function FindProxyForURL(url, host) {\n");
                for host in bypass {
                    out.push_str(&format!(
                        "  if (shExpMatch(host, \"{}\")) return \"DIRECT\";\n",
                        host.replace('\\', "").replace('"', "")
                    ));
                }
                out.push_str(&format!("  return \"{directive}\";\n}}\n"));
                out
            }
            AppliedPolicy::PacScript { script } => script.clone(),
        }
    }

    fn emit_error(&self, message: &str) {
        warn!("PAC file target error: {message}");
        if let Some(callback) = self.on_error.read().as_ref() {
            callback(message);
        }
    }
}

impl PolicyTarget for PacFileTarget {
    fn set_policy(&self, policy: AppliedPolicy) -> Result<()> {
        let script = Self::script_for(&policy);

        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                self.emit_error(&e.to_string());
                return Err(e.into());
            }
        }

        if let Err(e) = std::fs::write(&self.path, script) {
            self.emit_error(&e.to_string());
            return Err(e.into());
        }

        info!(mode = policy.mode(), path = ?self.path, "PAC file written");
        *self.current.write() = Some(policy);
        Ok(())
    }

    fn policy(&self) -> Option<AppliedPolicy> {
        self.current.read().clone()
    }
}
