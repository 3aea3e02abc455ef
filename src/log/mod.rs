//! Cursor log: append-only, per-key ordered event logs.
//!
//! The streaming layer only depends on [`CursorLog`]; [`LogManager`] is the
//! in-process store used by the server.

pub mod actor;
pub mod cursor;
pub mod entry;
pub mod log_manager;

use std::future::Future;
use std::time::Duration;

pub use actor::KeyStats;
pub use cursor::Cursor;
pub use entry::{Entry, EventType, StreamKey};
pub use log_manager::LogManager;

use crate::error::LogError;

/// Entries returned by one read, plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadBatch {
    pub entries: Vec<Entry>,
    pub next_cursor: Cursor,
}

/// Read side of the log store.
pub trait CursorLog: Clone + Send + Sync + 'static {
    /// Reads at most `max_count` entries positioned after `cursor`, blocking
    /// up to `block` when none are available yet.
    fn read_after(
        &self,
        key: &StreamKey,
        cursor: Cursor,
        max_count: usize,
        block: Duration,
    ) -> impl Future<Output = Result<ReadBatch, LogError>> + Send;
}
