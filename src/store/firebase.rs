//! Firebase Realtime Database over its REST surface.
//!
//! Each sample lives at `{database_url}/{path}/{timestamp}.json`. Change
//! subscriptions poll the collection and publish when the mapping differs
//! from the last one seen.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use tokio::sync::watch;
use log::Level::{Debug, Info, Warn};

use crate::store::{Snapshot, StoreError, StoreEvent, Subscription, TelemetryStore};
use crate::telemetry::TelemetrySample;

#[derive(Clone)]
struct Endpoint {
    client: Client,
    database_url: String,
    path: String,
    auth_token: Option<String>,
}

impl Endpoint {
    fn collection_url(&self) -> String {
        format!("{}/{}.json", self.database_url.trim_end_matches('/'), self.path.trim_matches('/'))
    }

    fn entry_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}.json",
            self.database_url.trim_end_matches('/'),
            self.path.trim_matches('/'),
            key
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token)]),
            None => request,
        }
    }

    async fn fetch_all(&self) -> Result<Option<Snapshot>, StoreError> {
        let response = self
            .authorize(self.client.get(self.collection_url()))
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        decode_snapshot(&body)
    }
}

/// `null` and `{}` both mean an empty collection.
fn decode_snapshot(body: &str) -> Result<Option<Snapshot>, StoreError> {
    let snapshot: Option<Snapshot> =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    Ok(snapshot.filter(|s| !s.is_empty()))
}

pub struct FirebaseStore {
    endpoint: Endpoint,
    poll_interval: Duration,
}

impl FirebaseStore {
    pub fn new(
        database_url: impl Into<String>,
        path: impl Into<String>,
        auth_token: Option<String>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = Endpoint {
            client,
            database_url: database_url.into(),
            path: path.into(),
            auth_token,
        };
        crate::store_log!(Info, "Using Firebase collection {}", endpoint.collection_url());

        Ok(Self { endpoint, poll_interval })
    }
}

#[async_trait]
impl TelemetryStore for FirebaseStore {
    async fn write(&self, sample: &TelemetrySample) -> Result<(), StoreError> {
        let response = self
            .endpoint
            .authorize(self.endpoint.client.put(self.endpoint.entry_url(&sample.timestamp)))
            .json(sample)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StoreError::Status(response.status().as_u16()));
        }
        crate::store_log!(Debug, "Wrote sample {}", sample.timestamp);
        Ok(())
    }

    async fn read_all(&self) -> Result<Option<Snapshot>, StoreError> {
        self.endpoint.fetch_all().await
    }

    fn subscribe(&self) -> Subscription {
        // Placeholder until the first poll answers; never delivered.
        let (tx, rx) = watch::channel(StoreEvent::Disconnected("connecting".to_string()));
        let endpoint = self.endpoint.clone();
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let event = match endpoint.fetch_all().await {
                    Ok(snapshot) => StoreEvent::Snapshot(snapshot),
                    Err(e) => {
                        crate::store_log!(Warn, "Subscription poll failed: {e}");
                        StoreEvent::Disconnected(e.to_string())
                    }
                };
                tx.send_if_modified(|current| {
                    if *current == event {
                        false
                    } else {
                        *current = event;
                        true
                    }
                });
                if tx.is_closed() {
                    break;
                }
            }
        });

        Subscription::pending(rx, Some(task))
    }
}
