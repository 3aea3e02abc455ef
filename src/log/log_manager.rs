//! Log Manager: Actor-based Router
//!
//! Structure:
//! - LogManager (Router): Maps stream keys to KeyActor handles. Only producers
//!   (append, close) create actors; readers of an unknown key park on a
//!   pending notifier until the key shows up.
//! - KeyActor (1 per StreamKey): Owns the entries, serves reads and long-poll waits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::LogConfig;
use crate::error::LogError;
use crate::log::actor::{KeyHandle, KeyStats, ReadSnapshot};
use crate::log::cursor::Cursor;
use crate::log::entry::{EventType, StreamKey};
use crate::log::{CursorLog, ReadBatch};

// ==========================================
// MANAGER COMMANDS
// ==========================================

const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

enum ManagerCommand {
    /// Get or create (producer side)
    GetActor {
        key: StreamKey,
        reply: oneshot::Sender<KeyHandle>,
    },
    /// Lookup only (reader side). When the key is unknown and a waiter is
    /// given, it is notified once a producer creates the key.
    FindActor {
        key: StreamKey,
        waiter: Option<Weak<Notify>>,
        reply: oneshot::Sender<Option<KeyHandle>>,
    },
    ListActors {
        reply: oneshot::Sender<Vec<KeyHandle>>,
    },
}

// ==========================================
// LOG MANAGER (The Router)
// ==========================================

#[derive(Clone)]
pub struct LogManager {
    tx: mpsc::Sender<ManagerCommand>,
}

impl LogManager {
    pub fn new(config: LogConfig) -> Self {
        let (tx, mut rx) = mpsc::channel(config.manager_channel_capacity);

        tokio::spawn(async move {
            let mut actors = HashMap::<StreamKey, KeyHandle>::new();
            let mut pending = HashMap::<StreamKey, Vec<Weak<Notify>>>::new();

            let mut sweep_timer = tokio::time::interval(PENDING_SWEEP_INTERVAL);
            sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    cmd = rx.recv() => {
                        let Some(cmd) = cmd else { break };
                        match cmd {
                            ManagerCommand::GetActor { key, reply } => {
                                let handle = match actors.get(&key) {
                                    Some(handle) => handle.clone(),
                                    None => {
                                        tracing::debug!(key = %key, "[LogManager] Spawning key actor");
                                        let handle = KeyHandle::spawn(
                                            key.clone(),
                                            config.actor_channel_capacity,
                                            config.max_entries_per_key,
                                        );
                                        actors.insert(key.clone(), handle.clone());
                                        for weak_notify in pending.remove(&key).unwrap_or_default() {
                                            if let Some(notify) = weak_notify.upgrade() {
                                                notify.notify_one();
                                            }
                                        }
                                        handle
                                    }
                                };
                                let _ = reply.send(handle);
                            }
                            ManagerCommand::FindActor { key, waiter, reply } => {
                                let handle = actors.get(&key).cloned();
                                if let (None, Some(waiter)) = (&handle, waiter) {
                                    let waiters = pending.entry(key).or_default();
                                    waiters.retain(|w| w.strong_count() > 0);
                                    waiters.push(waiter);
                                }
                                let _ = reply.send(handle);
                            }
                            ManagerCommand::ListActors { reply } => {
                                let _ = reply.send(actors.values().cloned().collect());
                            }
                        }
                    }
                    _ = sweep_timer.tick() => {
                        // Readers that gave up on keys nobody ever produced.
                        pending.retain(|_, waiters| {
                            waiters.retain(|w| w.strong_count() > 0);
                            !waiters.is_empty()
                        });
                    }
                }
            }
        });

        Self { tx }
    }

    async fn actor(&self, key: &StreamKey) -> Result<KeyHandle, LogError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ManagerCommand::GetActor { key: key.clone(), reply: tx })
            .await
            .map_err(|_| LogError::Unavailable("log manager closed".to_string()))?;
        rx.await.map_err(|_| LogError::Unavailable("log manager dropped reply".to_string()))
    }

    async fn find(&self, key: &StreamKey, waiter: Option<Weak<Notify>>) -> Result<Option<KeyHandle>, LogError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ManagerCommand::FindActor { key: key.clone(), waiter, reply: tx })
            .await
            .map_err(|_| LogError::Unavailable("log manager closed".to_string()))?;
        rx.await.map_err(|_| LogError::Unavailable("log manager dropped reply".to_string()))
    }

    // --- Public API ---

    /// Appends an entry and returns its cursor.
    pub async fn append(&self, key: &StreamKey, event_type: EventType, payload: Value) -> Result<Cursor, LogError> {
        self.actor(key).await?.append(event_type, payload).await
    }

    /// Marks a bounded resource complete: later appends fail and readers
    /// that drain it receive the `Ended` cursor.
    pub async fn close(&self, key: &StreamKey) -> Result<(), LogError> {
        self.actor(key).await?.close().await
    }

    pub async fn stats(&self) -> Result<Vec<KeyStats>, LogError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(ManagerCommand::ListActors { reply: tx })
            .await
            .map_err(|_| LogError::Unavailable("log manager closed".to_string()))?;
        let handles = rx.await.map_err(|_| LogError::Unavailable("log manager dropped reply".to_string()))?;

        let mut stats = Vec::with_capacity(handles.len());
        for handle in handles {
            stats.push(handle.stats().await?);
        }
        stats.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(stats)
    }

    async fn read_blocking(
        &self,
        key: &StreamKey,
        cursor: Cursor,
        max_count: usize,
        block: Duration,
    ) -> Result<ReadBatch, LogError> {
        if cursor.is_ended() {
            return Ok(ReadBatch::ended());
        }

        let deadline = Instant::now() + block;

        let created = Arc::new(Notify::new());
        let waiter = (!block.is_zero()).then(|| Arc::downgrade(&created));
        let handle = match self.find(key, waiter).await? {
            Some(handle) => handle,
            None if block.is_zero() => return Ok(ReadBatch::empty(cursor)),
            None => {
                let _ = tokio::time::timeout_at(deadline, created.notified()).await;
                match self.find(key, None).await? {
                    Some(handle) => handle,
                    None => return Ok(ReadBatch::empty(cursor)),
                }
            }
        };

        let snapshot = handle.read(cursor, max_count).await?;
        if !snapshot.entries.is_empty() || snapshot.closed || Instant::now() >= deadline {
            return Ok(ReadBatch::from_snapshot(snapshot));
        }

        // Long poll: the actor notifies immediately if data landed between
        // the read above and this registration.
        let notify = Arc::new(Notify::new());
        handle.wait_for_data(snapshot.after, notify.clone()).await?;
        let _ = tokio::time::timeout_at(deadline, notify.notified()).await;

        let snapshot = handle.read(position_cursor(snapshot.after), max_count).await?;
        Ok(ReadBatch::from_snapshot(snapshot))
    }
}

impl CursorLog for LogManager {
    fn read_after(
        &self,
        key: &StreamKey,
        cursor: Cursor,
        max_count: usize,
        block: Duration,
    ) -> impl Future<Output = Result<ReadBatch, LogError>> + Send {
        self.read_blocking(key, cursor, max_count, block)
    }
}

fn position_cursor(position: u64) -> Cursor {
    if position == 0 {
        Cursor::Start
    } else {
        Cursor::At(position)
    }
}

impl ReadBatch {
    pub(crate) fn ended() -> Self {
        Self { entries: Vec::new(), next_cursor: Cursor::Ended }
    }

    /// Nothing to read from a key that does not exist yet. `Latest` resolves
    /// to the empty tail.
    fn empty(cursor: Cursor) -> Self {
        Self { entries: Vec::new(), next_cursor: position_cursor(cursor.position().unwrap_or(0)) }
    }

    fn from_snapshot(snapshot: ReadSnapshot) -> Self {
        let ReadSnapshot { entries, after, last_position, closed } = snapshot;
        let read_up_to = entries.last().map(|e| e.position()).unwrap_or(after);

        let next_cursor = if closed && read_up_to >= last_position {
            Cursor::Ended
        } else {
            position_cursor(read_up_to)
        };

        Self { entries, next_cursor }
    }
}
