//! Flow Directory: existence checks for workspaces and flows.
//!
//! Task/flow records live elsewhere; sessions only need to know whether the
//! target exists before upgrading a connection.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

pub trait FlowDirectory: Send + Sync + 'static {
    fn workspace_exists(&self, workspace_id: &str) -> bool;
    fn flow_exists(&self, workspace_id: &str, flow_id: &str) -> bool;
}

/// In-memory directory: workspace id -> flow ids.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    workspaces: Arc<DashMap<String, HashSet<String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_workspace(&self, workspace_id: &str) {
        self.workspaces.entry(workspace_id.to_string()).or_default();
    }

    /// Registers the flow, creating its workspace if needed.
    pub fn register_flow(&self, workspace_id: &str, flow_id: &str) {
        self.workspaces
            .entry(workspace_id.to_string())
            .or_default()
            .insert(flow_id.to_string());
    }
}

impl FlowDirectory for MemoryDirectory {
    fn workspace_exists(&self, workspace_id: &str) -> bool {
        self.workspaces.contains_key(workspace_id)
    }

    fn flow_exists(&self, workspace_id: &str, flow_id: &str) -> bool {
        self.workspaces
            .get(workspace_id)
            .map(|flows| flows.contains(flow_id))
            .unwrap_or(false)
    }
}
