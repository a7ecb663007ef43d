use std::sync::RwLock;
use async_trait::async_trait;
use tokio::sync::watch;
use log::Level::Trace;

use crate::store::{Snapshot, StoreError, StoreEvent, Subscription, TelemetryStore};
use crate::telemetry::TelemetrySample;

/// In-process store. Keeps every sample for the life of the process.
pub struct MemoryStore {
    entries: RwLock<Snapshot>,
    events: watch::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = watch::channel(StoreEvent::Snapshot(None));
        Self {
            entries: RwLock::new(Snapshot::new()),
            events,
        }
    }

    fn snapshot(&self) -> Result<Option<Snapshot>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(if entries.is_empty() { None } else { Some(entries.clone()) })
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn write(&self, sample: &TelemetrySample) -> Result<(), StoreError> {
        let snapshot = {
            let mut entries = self
                .entries
                .write()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            entries.insert(sample.timestamp.clone(), sample.clone());
            entries.clone()
        };
        crate::store_log!(Trace, "Stored sample {} ({} entries)", sample.timestamp, snapshot.len());
        self.events.send_replace(StoreEvent::Snapshot(Some(snapshot)));
        Ok(())
    }

    async fn read_all(&self) -> Result<Option<Snapshot>, StoreError> {
        self.snapshot()
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.events.subscribe(), None)
    }
}
