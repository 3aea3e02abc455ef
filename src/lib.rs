pub mod config;
pub mod directory;
pub mod error;
pub mod log;
pub mod server;
pub mod streaming;

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, StreamingConfig};
use crate::directory::{FlowDirectory, MemoryDirectory};
use crate::error::ApiError;
use crate::log::LogManager;

// ========================================
// ENGINE (The Singleton)
// ========================================

/// Shared server state. Cheap to clone: every field is a handle.
#[derive(Clone)]
pub struct FlowtailEngine {
    pub log: LogManager,
    pub directory: MemoryDirectory,
    pub streaming: StreamingConfig,
    /// Fires on server shutdown; every live session observes it.
    pub shutdown: CancellationToken,
    pub start_time: Instant,
}

impl FlowtailEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            log: LogManager::new(config.log.clone()),
            directory: MemoryDirectory::new(),
            streaming: config.streaming.clone(),
            shutdown: CancellationToken::new(),
            start_time: Instant::now(),
        }
    }

    /// Connect-time check: the workspace, then the flow, must exist.
    pub fn ensure_flow(&self, workspace_id: &str, flow_id: &str) -> Result<(), ApiError> {
        if !self.directory.workspace_exists(workspace_id) {
            return Err(ApiError::WorkspaceNotFound(workspace_id.to_string()));
        }
        if !self.directory.flow_exists(workspace_id, flow_id) {
            return Err(ApiError::FlowNotFound {
                workspace: workspace_id.to_string(),
                flow: flow_id.to_string(),
            });
        }
        Ok(())
    }
}
