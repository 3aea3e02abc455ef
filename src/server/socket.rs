//! Socket Network Layer: WebSocket frame pump for a single connection.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::StreamingConfig;
use crate::log::CursorLog;
use crate::streaming::{Inbound, PushSession, SessionReport, SingleStreamSession};

/// Moves frames between the socket and the session channels. Returns when
/// the peer goes away or the session drops its outbound sender.
pub(crate) async fn run_socket(
    socket: WebSocket,
    inbound_tx: mpsc::Sender<Inbound>,
    mut outbound_rx: mpsc::Receiver<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx.send(Inbound::Text(text.as_str().to_owned())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        let _ = inbound_tx.send(Inbound::Closed).await;
                        break;
                    }
                    // Pings are answered by the transport; binary is not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!("ws read error: {}", err);
                        break;
                    }
                    None => break,
                }
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
                            tracing::debug!("ws write error: {}", err);
                            break;
                        }
                    }
                    None => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

pub(crate) async fn serve_push<L: CursorLog>(
    socket: WebSocket,
    session: PushSession<L>,
    config: &StreamingConfig,
    shutdown: CancellationToken,
) -> SessionReport {
    let (inbound_tx, inbound_rx) = mpsc::channel(config.control_channel_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_channel_capacity);

    let pump = tokio::spawn(run_socket(socket, inbound_tx, outbound_rx));
    let report = session.run(inbound_rx, outbound_tx, shutdown).await;
    let _ = pump.await;
    report
}

pub(crate) async fn serve_single_stream<L: CursorLog>(
    socket: WebSocket,
    session: SingleStreamSession<L>,
    config: &StreamingConfig,
    shutdown: CancellationToken,
) -> SessionReport {
    let (inbound_tx, inbound_rx) = mpsc::channel(config.control_channel_capacity);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_channel_capacity);

    let pump = tokio::spawn(run_socket(socket, inbound_tx, outbound_rx));
    let report = session.run(inbound_rx, outbound_tx, shutdown).await;
    let _ = pump.await;
    report
}
