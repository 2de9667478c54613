//! Pacswitch Proxy - network-layer policy targets.
//!
//! The policy engine resolves configuration into a policy; this crate
//! owns the boundary where that policy is installed. The host network
//! layer is modeled as a [`PolicyTarget`]: set a policy, read back the
//! one in effect, get told about apply failures. Two implementations
//! ship: an in-memory target for tests and embedding, and a file-backed
//! target that renders everything to a PAC file on disk.

pub mod error;
mod pac_file;
mod target;

pub use error::{Result, TargetError};
pub use pac_file::PacFileTarget;
pub use target::{AppliedPolicy, MemoryTarget, OnPolicyErrorCallback, PolicyTarget};
