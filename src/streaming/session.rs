//! Session Controller: lifecycle of one push connection.
//!
//! A session runs two tasks: the control reader (inbound frames, liveness)
//! and the multiplexer (polling and delivery). Whichever stops first, or an
//! external shutdown, moves the session to `Closing`, which cancels both.

use std::sync::atomic::Ordering;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StreamingConfig;
use crate::error::{ControlError, LogError, StreamError};
use crate::log::{Cursor, CursorLog, StreamKey};
use crate::streaming::multiplexer::Multiplexer;
use crate::streaming::sink::ChannelSink;
use crate::streaming::subscription_set::SubscriptionIntent;

/// Frames coming from the client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The peer sent a close frame.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Streaming,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    PeerDisconnected,
    Shutdown,
    PollFailed(LogError),
    /// The control reader task died without reporting an exit.
    ReaderFailed(String),
    /// Single-stream only: the bounded resource was fully read.
    Drained,
    /// Single-stream only: an `EndStream` entry was delivered.
    EndOfStream,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub reason: CloseReason,
    pub delivered: u64,
}

/// Subscription request sent by the client at any time after connect.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub parent_id: String,
    #[serde(default)]
    pub last_stream_message_id: Option<String>,
}

impl ControlMessage {
    pub fn parse(raw: &str) -> Result<(String, Cursor), ControlError> {
        let msg: ControlMessage = serde_json::from_str(raw)?;
        let cursor = Cursor::parse_or_start(msg.last_stream_message_id.as_deref())?;
        Ok((msg.parent_id, cursor))
    }
}

enum ReaderExit {
    Disconnected,
    Cancelled,
}

/// Multiplexed push session over one flow's keys.
pub struct PushSession<L> {
    id: Uuid,
    workspace_id: String,
    flow_id: String,
    log: L,
    config: StreamingConfig,
    state: SessionState,
}

impl<L: CursorLog> PushSession<L> {
    /// Creates the session in `Open`. Workspace and flow existence must
    /// already have been checked.
    pub fn open(workspace_id: String, flow_id: String, log: L, config: StreamingConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            flow_id,
            log,
            config,
            state: SessionState::Open,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }

    pub async fn run(
        mut self,
        inbound: mpsc::Receiver<Inbound>,
        outbound: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> SessionReport {
        let cancel = shutdown.child_token();
        let (intent_tx, intent_rx) = mpsc::channel(self.config.control_channel_capacity);

        info!(session = %self.id, workspace = %self.workspace_id, flow = %self.flow_id, "Session started");
        self.transition(SessionState::Streaming);

        let mut reader = tokio::spawn(control_reader(
            self.id,
            self.workspace_id.clone(),
            self.flow_id.clone(),
            inbound,
            intent_tx,
            cancel.clone(),
        ));

        let sink = ChannelSink::new(outbound);
        let delivered = sink.counter();
        let multiplexer = Multiplexer::new(self.id, self.log.clone(), sink, intent_rx, self.config.clone());
        let mut poller = tokio::spawn(multiplexer.run(cancel.clone()));

        let mut reader_done = false;
        let mut poller_done = false;
        let reason = tokio::select! {
            exit = &mut reader => {
                reader_done = true;
                reader_close_reason(exit)
            }
            result = &mut poller => {
                poller_done = true;
                poller_close_reason(result)
            }
            _ = shutdown.cancelled() => CloseReason::Shutdown,
        };

        self.transition(SessionState::Closing);
        cancel.cancel();
        if !reader_done {
            let _ = reader.await;
        }
        if !poller_done {
            let _ = poller.await;
        }
        self.transition(SessionState::Closed);

        let report = SessionReport {
            session_id: self.id,
            reason,
            delivered: delivered.load(Ordering::Relaxed),
        };
        info!(session = %self.id, reason = ?report.reason, delivered = report.delivered, "Session closed");
        report
    }
}

fn reader_close_reason(exit: Result<ReaderExit, JoinError>) -> CloseReason {
    match exit {
        Ok(ReaderExit::Cancelled) => CloseReason::Shutdown,
        Ok(ReaderExit::Disconnected) => CloseReason::PeerDisconnected,
        Err(err) => CloseReason::ReaderFailed(err.to_string()),
    }
}

fn poller_close_reason(result: Result<Result<u64, StreamError>, JoinError>) -> CloseReason {
    match result {
        Ok(Ok(_)) => CloseReason::Shutdown,
        Ok(Err(StreamError::Log(err))) => CloseReason::PollFailed(err),
        Ok(Err(StreamError::PeerDisconnected)) => CloseReason::PeerDisconnected,
        Ok(Err(StreamError::Encode(msg))) => CloseReason::PollFailed(LogError::Unavailable(msg)),
        Err(err) => CloseReason::PollFailed(LogError::Unavailable(format!("poller task failed: {}", err))),
    }
}

/// Reads inbound frames, turns valid subscription requests into intents and
/// reports when the peer goes away. Never touches the subscription set.
async fn control_reader(
    session_id: Uuid,
    workspace_id: String,
    flow_id: String,
    mut inbound: mpsc::Receiver<Inbound>,
    intents: mpsc::Sender<SubscriptionIntent>,
    cancel: CancellationToken,
) -> ReaderExit {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            frame = inbound.recv() => frame,
        };

        let text = match frame {
            Some(Inbound::Text(text)) => text,
            Some(Inbound::Closed) | None => return ReaderExit::Disconnected,
        };

        let (parent_id, cursor) = match ControlMessage::parse(&text) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(session = %session_id, error = %err, "Dropping control message");
                continue;
            }
        };

        let intent = SubscriptionIntent::Subscribe {
            key: StreamKey::new(workspace_id.as_str(), flow_id.as_str(), parent_id),
            cursor,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReaderExit::Cancelled,
            sent = intents.send(intent) => {
                if sent.is_err() {
                    return ReaderExit::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_message_defaults_cursor_to_start() {
        let (parent, cursor) = ControlMessage::parse(r#"{"parentId":"task-1"}"#).unwrap();
        assert_eq!(parent, "task-1");
        assert_eq!(cursor, Cursor::Start);

        let (_, cursor) = ControlMessage::parse(r#"{"parentId":"","lastStreamMessageId":""}"#).unwrap();
        assert_eq!(cursor, Cursor::Start);
    }

    #[tokio::test]
    async fn reader_panic_has_its_own_close_reason() {
        let panicked = tokio::spawn(async { panic!("reader blew up") }).await.unwrap_err();
        assert!(matches!(reader_close_reason(Err(panicked)), CloseReason::ReaderFailed(_)));
        assert_eq!(reader_close_reason(Ok(ReaderExit::Disconnected)), CloseReason::PeerDisconnected);
        assert_eq!(reader_close_reason(Ok(ReaderExit::Cancelled)), CloseReason::Shutdown);
    }

    #[test]
    fn control_message_rejects_garbage() {
        assert!(ControlMessage::parse("{not json").is_err());
        assert!(ControlMessage::parse(r#"{"lastStreamMessageId":"3"}"#).is_err());
        assert!(ControlMessage::parse(r#"{"parentId":"x","lastStreamMessageId":"nope"}"#).is_err());
    }
}
