//! Multiplex Poller: merges polls of every subscribed key into one sink.
//!
//! The multiplexer task owns the session's [`SubscriptionSet`]. Subscription
//! changes reach it as [`SubscriptionIntent`]s over a channel and are applied
//! between poll cycles.

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::config::StreamingConfig;
use crate::error::StreamError;
use crate::log::{Cursor, CursorLog, StreamKey};
use crate::streaming::sink::EntrySink;
use crate::streaming::subscription_set::{SubscriptionIntent, SubscriptionSet};
use crate::streaming::tail::{self, Terminal};

pub struct Multiplexer<L, S> {
    session_id: Uuid,
    log: L,
    sink: S,
    intents: mpsc::Receiver<SubscriptionIntent>,
    intents_open: bool,
    subscriptions: SubscriptionSet,
    config: StreamingConfig,
    delivered: u64,
}

impl<L: CursorLog, S: EntrySink> Multiplexer<L, S> {
    pub fn new(
        session_id: Uuid,
        log: L,
        sink: S,
        intents: mpsc::Receiver<SubscriptionIntent>,
        config: StreamingConfig,
    ) -> Self {
        Self {
            session_id,
            log,
            sink,
            intents,
            intents_open: true,
            subscriptions: SubscriptionSet::new(),
            config,
            delivered: 0,
        }
    }

    /// Runs until cancelled (`Ok`, with the number of delivered entries), or
    /// until a read or the sink fails. Any read error ends the session: a key
    /// is never silently dropped from the set.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<u64, StreamError> {
        loop {
            self.drain_intents();

            if self.subscriptions.is_empty() {
                let idle = tokio::time::sleep(self.config.idle_interval());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(self.delivered),
                    intent = self.intents.recv(), if self.intents_open => match intent {
                        Some(intent) => self.apply(intent),
                        None => self.intents_open = false,
                    },
                    _ = idle => {}
                }
                continue;
            }

            let snapshot = self.subscriptions.snapshot();
            let cycle = poll_cycle(
                self.session_id,
                &self.log,
                &mut self.sink,
                &mut self.subscriptions,
                snapshot,
                &self.config,
            );

            tokio::select! {
                biased;
                // In-flight reads are dropped, not awaited.
                _ = cancel.cancelled() => return Ok(self.delivered),
                result = cycle => self.delivered += result?,
            }
        }
    }

    fn drain_intents(&mut self) {
        while self.intents_open {
            match self.intents.try_recv() {
                Ok(intent) => self.apply(intent),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.intents_open = false,
            }
        }
    }

    fn apply(&mut self, intent: SubscriptionIntent) {
        let SubscriptionIntent::Subscribe { key, cursor } = &intent;
        debug!(session = %self.session_id, key = %key, cursor = %cursor, "Subscribing");
        self.subscriptions.apply(intent);
    }
}

/// One read per subscribed key, all in flight together. Each key's batch is
/// delivered as soon as its read returns, so per-key order is the log order
/// while the interleaving across keys is whatever order reads complete in.
async fn poll_cycle<L: CursorLog, S: EntrySink>(
    session_id: Uuid,
    log: &L,
    sink: &mut S,
    subscriptions: &mut SubscriptionSet,
    snapshot: Vec<(StreamKey, Cursor)>,
    config: &StreamingConfig,
) -> Result<u64, StreamError> {
    let mut reads: FuturesUnordered<_> = snapshot
        .into_iter()
        .map(|(key, cursor)| async move {
            let step = tail::poll_key(log, &key, cursor, config.batch_size, config.block()).await;
            (key, step)
        })
        .collect();

    let mut delivered = 0;
    while let Some((key, step)) = reads.next().await {
        let step = step.map_err(|e| {
            tracing::error!(session = %session_id, key = %key, error = %e, "Poll failed");
            StreamError::from(e)
        })?;

        delivered += tail::deliver_entries(sink, step.entries).await?;
        subscriptions.advance(&key, step.next_cursor);

        if let Some(terminal) = step.terminal {
            subscriptions.remove(&key);
            match terminal {
                Terminal::EndStream => debug!(session = %session_id, key = %key, "End of stream, unsubscribed"),
                Terminal::Drained => debug!(session = %session_id, key = %key, "Resource drained, unsubscribed"),
            }
        }
    }

    Ok(delivered)
}
