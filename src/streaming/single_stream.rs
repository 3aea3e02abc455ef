//! Single-stream push: tails one key over a persistent connection.
//!
//! No subscription set and no second task: one cursor, one loop. Used for
//! bounded logs such as an action's history, so it stops once the resource
//! is drained.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StreamingConfig;
use crate::error::StreamError;
use crate::log::{Cursor, CursorLog, StreamKey};
use crate::streaming::session::{CloseReason, Inbound, SessionReport, SessionState};
use crate::streaming::sink::ChannelSink;
use crate::streaming::tail::{self, Terminal};

pub struct SingleStreamSession<L> {
    id: Uuid,
    key: StreamKey,
    cursor: Cursor,
    log: L,
    config: StreamingConfig,
    state: SessionState,
}

impl<L: CursorLog> SingleStreamSession<L> {
    pub fn open(key: StreamKey, cursor: Cursor, log: L, config: StreamingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            cursor,
            log,
            config,
            state: SessionState::Open,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "Single-stream state");
        self.state = next;
    }

    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Inbound>,
        outbound: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> SessionReport {
        info!(session = %self.id, key = %self.key, cursor = %self.cursor, "Single-stream session started");
        self.transition(SessionState::Streaming);

        let mut sink = ChannelSink::new(outbound);
        let mut delivered = 0;

        let reason = loop {
            let read = tail::poll_key(&self.log, &self.key, self.cursor, self.config.batch_size, self.config.block());
            tokio::pin!(read);

            // The read stays in flight while inbound frames are drained.
            let step = loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break Err(CloseReason::Shutdown),
                    step = &mut read => break step.map_err(CloseReason::PollFailed),
                    frame = inbound.recv() => match frame {
                        // Nothing to control on a single stream; text is ignored.
                        Some(Inbound::Text(_)) => continue,
                        Some(Inbound::Closed) | None => break Err(CloseReason::PeerDisconnected),
                    },
                }
            };

            let step = match step {
                Ok(step) => step,
                Err(reason) => break reason,
            };

            match tail::deliver_entries(&mut sink, step.entries).await {
                Ok(n) => delivered += n,
                Err(StreamError::Log(err)) => break CloseReason::PollFailed(err),
                Err(_) => break CloseReason::PeerDisconnected,
            }
            self.cursor = step.next_cursor;

            match step.terminal {
                Some(Terminal::Drained) => break CloseReason::Drained,
                Some(Terminal::EndStream) => break CloseReason::EndOfStream,
                None => {}
            }
        };

        self.transition(SessionState::Closing);
        // Closing the outbound channel tells the writer to close the connection.
        drop(sink);
        self.transition(SessionState::Closed);
        info!(session = %self.id, reason = ?reason, delivered, "Single-stream session closed");

        SessionReport { session_id: self.id, reason, delivered }
    }
}
