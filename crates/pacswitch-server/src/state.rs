//! Application state for the API server.

use std::sync::Arc;

use pacswitch_proxy::{MemoryTarget, PolicyTarget};
use pacswitch_storage::Database;

use crate::apply::{spawn_apply_worker, ApplyHandle};
use crate::tabs::{StaticTabProvider, TabProvider};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection.
    pub db: Arc<Database>,
    /// The network-layer policy target.
    pub target: Arc<dyn PolicyTarget>,
    /// Source of the live tab list.
    pub tabs: Arc<dyn TabProvider>,
    /// Handle to the apply worker.
    pub apply: ApplyHandle,
}

impl AppState {
    /// Creates application state and spawns the apply worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        db: Database,
        target: Arc<dyn PolicyTarget>,
        tabs: Arc<dyn TabProvider>,
    ) -> Self {
        let db = Arc::new(db);
        let apply = spawn_apply_worker(db.clone(), target.clone());
        Self {
            db,
            target,
            tabs,
            apply,
        }
    }

    /// Creates state with an in-memory database, memory policy target,
    /// and empty tab provider (for tests).
    pub fn in_memory() -> Self {
        Self::new(
            Database::in_memory().expect("Failed to create in-memory database"),
            Arc::new(MemoryTarget::new()),
            Arc::new(StaticTabProvider::new()),
        )
    }
}
