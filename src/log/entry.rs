use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::log::cursor::Cursor;

/// Prefix used for the parent id of bounded per-action history logs.
pub const ACTION_PARENT_PREFIX: &str = "action:";

/// Identifies one logical ordered log: workspace + flow + parent.
/// An empty parent id is the flow's top-level feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKey {
    pub workspace_id: String,
    pub flow_id: String,
    pub parent_id: String,
}

impl StreamKey {
    pub fn new(
        workspace_id: impl Into<String>,
        flow_id: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            flow_id: flow_id.into(),
            parent_id: parent_id.into(),
        }
    }

    /// Key of the bounded history log of one flow action.
    pub fn for_action(workspace_id: &str, flow_id: &str, action_id: &str) -> Self {
        Self::new(workspace_id, flow_id, format!("{}{}", ACTION_PARENT_PREFIX, action_id))
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.workspace_id, self.flow_id, self.parent_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Sub-task progress update.
    Progress,
    /// Result of an LLM action.
    ActionResult,
    /// Free-form log line.
    Log,
    /// Flow or task status transition.
    Status,
    /// No further entries will ever be appended under this key.
    EndStream,
}

impl EventType {
    pub fn is_end_stream(&self) -> bool {
        matches!(self, EventType::EndStream)
    }
}

/// One delivered log entry. Serialized as-is for outbound frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(flatten)]
    pub key: StreamKey,
    #[serde(rename = "streamMessageId")]
    pub cursor: Cursor,
    pub event_type: EventType,
    pub payload: Value,
    /// Append time, unix millis.
    pub timestamp: i64,
}

impl Entry {
    pub fn is_end_stream(&self) -> bool {
        self.event_type.is_end_stream()
    }

    pub fn position(&self) -> u64 {
        self.cursor.position().unwrap_or(0)
    }
}
