use std::collections::BTreeMap;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::telemetry::TelemetrySample;

pub mod memory;
#[cfg(feature = "firebase")]
pub mod firebase;

pub use memory::MemoryStore;

pub const VEHICLE_DATA_PATH: &str = "vehicleData";

/// Full collection contents, keyed by sample timestamp.
pub type Snapshot = BTreeMap<String, TelemetrySample>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store request failed: {0}")]
    Request(String),

    #[error("Store returned status {0}")]
    Status(u16),

    #[error("Failed to decode store payload: {0}")]
    Decode(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The whole mapping as it stands now; `None` when the collection is empty.
    Snapshot(Option<Snapshot>),
    Disconnected(String),
}

/// Remote key-value collection of telemetry samples.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Store a sample under its timestamp key, replacing any existing entry.
    async fn write(&self, sample: &TelemetrySample) -> Result<(), StoreError>;

    async fn read_all(&self) -> Result<Option<Snapshot>, StoreError>;

    async fn read_latest(&self) -> Result<Option<TelemetrySample>, StoreError> {
        Ok(self.read_all().await?.and_then(|snapshot| latest_entry(&snapshot).cloned()))
    }

    /// Receive the full mapping on every change until the handle is cancelled.
    fn subscribe(&self) -> Subscription;
}

/// Entry whose key is numerically greatest. Non-numeric keys are ignored.
pub fn latest_entry(snapshot: &Snapshot) -> Option<&TelemetrySample> {
    snapshot
        .iter()
        .filter_map(|(key, sample)| key.parse::<u64>().ok().map(|ts| (ts, sample)))
        .max_by_key(|(ts, _)| *ts)
        .map(|(_, sample)| sample)
}

/// Cancellation handle for a store subscription. Dropping it also cancels.
pub struct Subscription {
    rx: watch::Receiver<StoreEvent>,
    task: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl Subscription {
    /// The current value is delivered first, then one event per change.
    pub fn new(mut rx: watch::Receiver<StoreEvent>, task: Option<JoinHandle<()>>) -> Self {
        rx.mark_changed();
        Self::pending(rx, task)
    }

    /// Only values published after this call are delivered. For sources whose
    /// channel holds a placeholder until the first real result arrives.
    pub fn pending(rx: watch::Receiver<StoreEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            task,
            cancelled: false,
        }
    }

    /// Waits for the next event. `None` once cancelled or the source has gone away.
    pub async fn next(&mut self) -> Option<StoreEvent> {
        if self.cancelled {
            return None;
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Stop delivery and abort the feeding task, if any.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = StoreEvent> {
        stream::unfold(self, |mut sub| async move {
            let event = sub.next().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
