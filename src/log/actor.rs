//! Key Actor: single-task owner of one stream key's entries.
//! Zero locks: appends, reads and long-poll registrations are serialized
//! through the command channel.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::LogError;
use crate::log::cursor::Cursor;
use crate::log::entry::{Entry, EventType, StreamKey};

/// Commands sent to a Key Actor
pub(crate) enum KeyCommand {
    Append {
        event_type: EventType,
        payload: Value,
        reply: oneshot::Sender<Result<Cursor, LogError>>,
    },
    Read {
        after: Cursor,
        limit: usize,
        reply: oneshot::Sender<ReadSnapshot>,
    },
    /// Register for new data notifications (long-polling)
    WaitForData {
        after: u64,
        notify: Arc<Notify>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    GetStats {
        reply: oneshot::Sender<KeyStats>,
    },
}

/// Result of one read as seen by the actor at that instant.
#[derive(Debug, Clone)]
pub(crate) struct ReadSnapshot {
    pub entries: Vec<Entry>,
    /// The read position after `Latest`/`Start` resolution.
    pub after: u64,
    pub last_position: u64,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    pub key: StreamKey,
    pub retained: usize,
    pub last_position: u64,
    pub closed: bool,
    /// Long-poll registrations currently held by the actor.
    pub waiters: usize,
}

/// Handle to communicate with a Key Actor
#[derive(Clone)]
pub(crate) struct KeyHandle {
    pub key: StreamKey,
    tx: mpsc::Sender<KeyCommand>,
}

impl KeyHandle {
    pub fn spawn(key: StreamKey, buffer_size: usize, max_entries: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        tokio::spawn(key_actor(key.clone(), rx, max_entries));
        Self { key, tx }
    }

    pub async fn append(&self, event_type: EventType, payload: Value) -> Result<Cursor, LogError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(KeyCommand::Append { event_type, payload, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.dropped())?
    }

    pub async fn read(&self, after: Cursor, limit: usize) -> Result<ReadSnapshot, LogError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(KeyCommand::Read { after, limit, reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.dropped())
    }

    pub async fn wait_for_data(&self, after: u64, notify: Arc<Notify>) -> Result<(), LogError> {
        self.send(KeyCommand::WaitForData { after, notify }).await
    }

    pub async fn close(&self) -> Result<(), LogError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(KeyCommand::Close { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.dropped())
    }

    pub async fn stats(&self) -> Result<KeyStats, LogError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(KeyCommand::GetStats { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.dropped())
    }

    async fn send(&self, cmd: KeyCommand) -> Result<(), LogError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| LogError::Unavailable(format!("key actor {} closed", self.key)))
    }

    fn dropped(&self) -> LogError {
        LogError::Unavailable(format!("key actor {} dropped reply", self.key))
    }
}

/// The actual Key Actor loop - runs in a single Tokio task
async fn key_actor(key: StreamKey, mut rx: mpsc::Receiver<KeyCommand>, max_entries: usize) {
    let mut entries: VecDeque<Entry> = VecDeque::new();
    let mut last_position: u64 = 0;
    let mut closed = false;

    // Waiters hold Weak refs so a reader that gave up (timeout, cancelled
    // session) is cleaned up lazily instead of being kept alive here.
    let mut waiters: Vec<(u64, Weak<Notify>)> = Vec::new();

    tracing::debug!(key = %key, "Key actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            KeyCommand::Append { event_type, payload, reply } => {
                if closed {
                    let _ = reply.send(Err(LogError::Closed(key.clone())));
                    continue;
                }

                last_position += 1;
                let cursor = Cursor::At(last_position);
                entries.push_back(Entry {
                    key: key.clone(),
                    cursor,
                    event_type,
                    payload,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });

                if entries.len() > max_entries {
                    entries.pop_front();
                }

                waiters.retain(|(after, weak_notify)| {
                    if *after < last_position {
                        if let Some(notify) = weak_notify.upgrade() {
                            notify.notify_one();
                        }
                        false
                    } else {
                        weak_notify.upgrade().is_some()
                    }
                });

                let _ = reply.send(Ok(cursor));
            }

            KeyCommand::Read { after, limit, reply } => {
                let after = match after {
                    Cursor::Latest | Cursor::Ended => last_position,
                    other => other.position().unwrap_or(0),
                };

                // Cursors behind the retained window get the oldest retained entries;
                // readers compare positions to detect the gap.
                let first_retained = entries.front().map(|e| e.position()).unwrap_or(last_position + 1);
                let skip = after.saturating_sub(first_retained.saturating_sub(1)) as usize;
                let batch: Vec<Entry> = entries.iter().skip(skip).take(limit).cloned().collect();

                let _ = reply.send(ReadSnapshot {
                    entries: batch,
                    after,
                    last_position,
                    closed,
                });
            }

            KeyCommand::WaitForData { after, notify } => {
                if after < last_position || closed {
                    notify.notify_one();
                } else {
                    waiters.retain(|(_, weak_notify)| weak_notify.strong_count() > 0);
                    waiters.push((after, Arc::downgrade(&notify)));
                }
            }

            KeyCommand::Close { reply } => {
                if !closed {
                    closed = true;
                    tracing::debug!(key = %key, last_position, "Key closed");
                    for (_, weak_notify) in waiters.drain(..) {
                        if let Some(notify) = weak_notify.upgrade() {
                            notify.notify_one();
                        }
                    }
                }
                let _ = reply.send(());
            }

            KeyCommand::GetStats { reply } => {
                let _ = reply.send(KeyStats {
                    key: key.clone(),
                    retained: entries.len(),
                    last_position,
                    closed,
                    waiters: waiters.len(),
                });
            }
        }
    }

    tracing::debug!(key = %key, "Key actor stopped");
}
