//! Ordered resumable log tailing: the one primitive behind both the
//! multiplexed push sessions and the single-stream pull/push adapters.

use std::time::Duration;

use crate::error::{LogError, StreamError};
use crate::log::{Cursor, CursorLog, Entry, StreamKey};
use crate::streaming::sink::EntrySink;

/// Why a key will produce nothing more for this reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// An `EndStream` entry was read (and is included in the step).
    EndStream,
    /// The bounded resource is closed and fully read; cursor is `Ended`.
    Drained,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TailStep {
    pub entries: Vec<Entry>,
    pub next_cursor: Cursor,
    pub terminal: Option<Terminal>,
}

/// One bounded blocking read of `key` after `cursor`.
///
/// Entries at or before `cursor` are dropped and anything after an
/// `EndStream` marker is cut off, so the step never rewinds or runs past the
/// end of a key. A concrete cursor whose successors were already evicted
/// fails with [`LogError::Trimmed`] instead of silently skipping ahead.
pub async fn poll_key<L: CursorLog>(
    log: &L,
    key: &StreamKey,
    cursor: Cursor,
    max_count: usize,
    block: Duration,
) -> Result<TailStep, LogError> {
    if cursor.is_ended() {
        return Ok(TailStep { entries: Vec::new(), next_cursor: Cursor::Ended, terminal: Some(Terminal::Drained) });
    }

    let batch = log.read_after(key, cursor, max_count, block).await?;

    let floor = cursor.position();
    let mut entries = Vec::with_capacity(batch.entries.len());
    let mut end_stream = false;
    for entry in batch.entries {
        if floor.is_some_and(|f| entry.position() <= f) {
            continue;
        }
        end_stream = entry.is_end_stream();
        entries.push(entry);
        if end_stream {
            break;
        }
    }

    // Positions are dense, so a concrete cursor must resume at `n + 1`.
    if let (Cursor::At(requested), Some(first)) = (cursor, entries.first()) {
        if first.position() > requested + 1 {
            return Err(LogError::Trimmed { key: key.clone(), requested, oldest: first.position() });
        }
    }

    let (next_cursor, terminal) = if end_stream {
        (entries.last().map(|e| e.cursor).unwrap_or(batch.next_cursor), Some(Terminal::EndStream))
    } else if batch.next_cursor.is_ended() {
        (Cursor::Ended, Some(Terminal::Drained))
    } else {
        (entries.last().map(|e| e.cursor).unwrap_or(batch.next_cursor), None)
    };

    Ok(TailStep { entries, next_cursor, terminal })
}

/// Hands a step's entries to the sink in order. Returns how many went out.
pub async fn deliver_entries<S: EntrySink>(sink: &mut S, entries: Vec<Entry>) -> Result<u64, StreamError> {
    let mut delivered = 0;
    for entry in entries {
        sink.deliver(entry).await?;
        delivered += 1;
    }
    Ok(delivered)
}
