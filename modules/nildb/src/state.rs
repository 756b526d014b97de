use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use nildb_nuc::Did;

use crate::api::auth::CommandPolicy;
use crate::domain::service::Service;

/// The node's own identity and trust anchors.
#[derive(Debug, Clone, Copy)]
pub struct NodeIdentity {
    /// Audience every presented token must name.
    pub did: Did,
    /// External authority trusted to root delegation chains; admin routes
    /// require chains rooted here.
    pub authority: Option<Did>,
}

/// Admin-toggled maintenance state.
#[derive(Debug, Clone, Default)]
pub struct Maintenance {
    pub active: bool,
    pub since: Option<DateTime<Utc>>,
}

/// Runtime log-level control, injected by the host so the handler layer
/// stays testable without a live subscriber.
pub trait LogLevelControl: Send + Sync {
    /// Apply a new filter directive, e.g. `info` or `nildb=debug`.
    ///
    /// # Errors
    /// A human-readable message when the directive does not parse.
    fn set(&self, directive: &str) -> Result<(), String>;

    fn current(&self) -> String;
}

/// Control that remembers the directive but drives no subscriber.
#[derive(Debug, Default)]
pub struct StaticLogControl {
    current: parking_lot::Mutex<String>,
}

impl LogLevelControl for StaticLogControl {
    fn set(&self, directive: &str) -> Result<(), String> {
        directive.clone_into(&mut self.current.lock());
        Ok(())
    }

    fn current(&self) -> String {
        self.current.lock().clone()
    }
}

/// Everything the REST layer needs, injected explicitly.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
    pub node: NodeIdentity,
    pub policy: Arc<CommandPolicy>,
    pub maintenance: Arc<ArcSwap<Maintenance>>,
    pub log_control: Arc<dyn LogLevelControl>,
    pub started_at: DateTime<Utc>,
}
