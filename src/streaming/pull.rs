//! Pull mode: cursor in, batch plus next cursor out.

use serde::Serialize;

use crate::config::StreamingConfig;
use crate::error::{LogError, StreamError};
use crate::log::{Cursor, CursorLog, Entry, StreamKey};
use crate::streaming::sink::BatchSink;
use crate::streaming::tail;

/// One pull response. `cursor` is `"end"` once the resource is closed and
/// every entry has been returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullPage {
    pub entries: Vec<Entry>,
    pub cursor: Cursor,
}

impl PullPage {
    pub fn is_end(&self) -> bool {
        self.cursor.is_ended()
    }
}

pub async fn pull<L: CursorLog>(
    log: &L,
    key: &StreamKey,
    cursor: Cursor,
    config: &StreamingConfig,
) -> Result<PullPage, LogError> {
    let step = tail::poll_key(log, key, cursor, config.batch_size, config.pull_block()).await?;

    let mut sink = BatchSink::default();
    match tail::deliver_entries(&mut sink, step.entries).await {
        Ok(_) => {}
        Err(StreamError::Log(err)) => return Err(err),
        Err(other) => return Err(LogError::Unavailable(other.to_string())),
    }

    Ok(PullPage { entries: sink.into_entries(), cursor: step.next_cursor })
}
