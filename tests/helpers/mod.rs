#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flowtail::config::{Config, LogConfig, StreamingConfig};
use flowtail::error::LogError;
use flowtail::log::{Cursor, CursorLog, Entry, LogManager, ReadBatch, StreamKey};
use flowtail::streaming::{Inbound, PushSession, SessionReport};
use flowtail::FlowtailEngine;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const WS: &str = "W";
pub const FLOW: &str = "F";

pub fn key(parent: &str) -> StreamKey {
    StreamKey::new(WS, FLOW, parent)
}

/// Short intervals so tests observe several cycles quickly.
pub fn test_config() -> StreamingConfig {
    StreamingConfig {
        idle_interval_ms: 10,
        block_ms: 100,
        batch_size: 50,
        control_channel_capacity: 16,
        outbound_channel_capacity: 256,
        pull_block_ms: 0,
    }
}

pub fn setup_log() -> LogManager {
    LogManager::new(LogConfig::default())
}

/// Log double: forwards to a real `LogManager`, counts reads and can be
/// switched to fail every read.
#[derive(Clone)]
pub struct FaultyLog {
    pub inner: LogManager,
    pub reads: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl FaultyLog {
    pub fn new(inner: LogManager) -> Self {
        Self {
            inner,
            reads: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl CursorLog for FaultyLog {
    async fn read_after(
        &self,
        key: &StreamKey,
        cursor: Cursor,
        max_count: usize,
        block: Duration,
    ) -> Result<ReadBatch, LogError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LogError::Unavailable("injected failure".to_string()));
        }
        self.inner.read_after(key, cursor, max_count, block).await
    }
}

/// A push session running on channels instead of a socket.
pub struct SessionHarness {
    pub inbound: mpsc::Sender<Inbound>,
    pub outbound: mpsc::Receiver<String>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<SessionReport>,
}

impl SessionHarness {
    pub fn start<L: CursorLog>(log: L) -> Self {
        let config = test_config();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.control_channel_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_channel_capacity);
        let shutdown = CancellationToken::new();

        let session = PushSession::open(WS.to_string(), FLOW.to_string(), log, config);
        let handle = tokio::spawn(session.run(inbound_rx, outbound_tx, shutdown.clone()));

        Self { inbound: inbound_tx, outbound: outbound_rx, shutdown, handle }
    }

    pub async fn subscribe(&self, parent: &str, cursor: Option<&str>) {
        let msg = match cursor {
            Some(c) => format!(r#"{{"parentId":"{}","lastStreamMessageId":"{}"}}"#, parent, c),
            None => format!(r#"{{"parentId":"{}"}}"#, parent),
        };
        self.inbound.send(Inbound::Text(msg)).await.unwrap();
    }

    pub async fn next_entry(&mut self) -> Entry {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for entry")
            .expect("outbound closed");
        serde_json::from_str(&frame).unwrap()
    }

    /// Asserts nothing arrives for `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(wait, self.outbound.recv()).await {
            panic!("unexpected frame: {}", frame);
        }
    }

    pub async fn finish(self) -> SessionReport {
        tokio::time::timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("session did not stop in time")
            .unwrap()
    }
}

/// Full server on an ephemeral port with `W/F` registered.
pub async fn start_server() -> (String, FlowtailEngine) {
    let config = Config {
        streaming: test_config(),
        ..Config::default()
    };
    let engine = FlowtailEngine::new(&config);
    engine.directory.register_flow(WS, FLOW);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(flowtail::server::serve(listener, engine.clone()));

    (addr, engine)
}
