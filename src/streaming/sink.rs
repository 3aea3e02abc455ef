//! Output sinks: where tailed entries go, in arrival order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::log::Entry;

pub trait EntrySink: Send {
    fn deliver(&mut self, entry: Entry) -> impl Future<Output = Result<(), StreamError>> + Send;
}

/// Push mode: serializes each entry to one JSON text frame and hands it to
/// the connection's writer task.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    delivered: Arc<AtomicU64>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx, delivered: Arc::new(AtomicU64::new(0)) }
    }

    /// Shared count of frames handed to the writer.
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.delivered.clone()
    }
}

impl EntrySink for ChannelSink {
    async fn deliver(&mut self, entry: Entry) -> Result<(), StreamError> {
        let frame = serde_json::to_string(&entry).map_err(|e| StreamError::Encode(e.to_string()))?;
        self.tx.send(frame).await.map_err(|_| StreamError::PeerDisconnected)?;
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Pull mode: collects one response batch.
#[derive(Debug, Default)]
pub struct BatchSink {
    pub entries: Vec<Entry>,
}

impl BatchSink {
    pub fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

impl EntrySink for BatchSink {
    async fn deliver(&mut self, entry: Entry) -> Result<(), StreamError> {
        self.entries.push(entry);
        Ok(())
    }
}
