use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use log::Level::{Error, Info, Warn};

use crate::speech::SpeechGate;
use crate::store::{StoreEvent, TelemetryStore};
use crate::telemetry::{SharedMonitorState, TelemetrySample};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Run one tick at `now_ms` and dispatch its side effects. Returns the
/// persistence task when a sample was taken; nothing waits on it.
pub async fn tick_once(
    state: &SharedMonitorState,
    speech: &SpeechGate,
    store: &Arc<dyn TelemetryStore>,
    now_ms: u64,
) -> Option<JoinHandle<()>> {
    // Hold the gate across evaluation so a recorded firing is always voiced.
    let claim = speech.try_claim();
    let outcome = {
        let mut monitor = state.lock().await;
        let alerts_enabled = monitor.audio_alerts;
        monitor.engine.tick(now_ms, alerts_enabled, claim.is_none())
    };

    if let (Some(kind), Some(claim)) = (outcome.alert, claim) {
        claim.speak(kind.utterance());
    }

    outcome
        .sample
        .map(|sample| persist(state.clone(), store.clone(), sample))
}

fn persist(
    state: SharedMonitorState,
    store: Arc<dyn TelemetryStore>,
    sample: TelemetrySample,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match store.write(&sample).await {
            Ok(()) => state.lock().await.clear_store_error(),
            Err(e) => {
                crate::store_log!(Error, "Failed to persist sample {}: {e}", sample.timestamp);
                state.lock().await.set_store_error(e.to_string());
            }
        }
    })
}

pub fn start_ticker(
    state: SharedMonitorState,
    speech: SpeechGate,
    store: Arc<dyn TelemetryStore>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        crate::engine_log!(Info, "Tick loop running every {:?}", period);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick_once(&state, &speech, &store, now_ms()).await;
        }
    })
}

/// Mirror the store's collection into the monitor state, last write wins.
pub fn start_history_listener(
    state: SharedMonitorState,
    store: Arc<dyn TelemetryStore>,
) -> JoinHandle<()> {
    let subscription = store.subscribe();
    tokio::spawn(async move {
        let mut events = Box::pin(subscription.into_stream());
        while let Some(event) = events.next().await {
            let mut monitor = state.lock().await;
            match event {
                StoreEvent::Snapshot(snapshot) => {
                    if !monitor.store_connected {
                        crate::store_log!(Info, "Store connected");
                    }
                    monitor.store_connected = true;
                    monitor.history = snapshot;
                }
                StoreEvent::Disconnected(reason) => {
                    if monitor.store_connected {
                        crate::store_log!(Warn, "Store disconnected: {reason}");
                    }
                    monitor.store_connected = false;
                    monitor.history = None;
                }
            }
        }
        crate::store_log!(Warn, "Store subscription ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use async_trait::async_trait;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use tokio::sync::Mutex;

    use crate::speech::{Speaker, SpeechError, Utterance};
    use crate::store::{MemoryStore, Snapshot, StoreError, Subscription};
    use crate::telemetry::alerts::CooldownTimers;
    use crate::telemetry::engine::Engine;
    use crate::telemetry::{MonitorState, SystemState};

    struct RejectingStore;

    #[async_trait]
    impl TelemetryStore for RejectingStore {
        async fn write(&self, _sample: &TelemetrySample) -> Result<(), StoreError> {
            Err(StoreError::Status(503))
        }

        async fn read_all(&self) -> Result<Option<Snapshot>, StoreError> {
            Err(StoreError::Status(503))
        }

        fn subscribe(&self) -> Subscription {
            let (_tx, rx) = tokio::sync::watch::channel(StoreEvent::Disconnected("down".to_string()));
            Subscription::new(rx, None)
        }
    }

    #[derive(Default)]
    struct RecordingSpeaker {
        spoken: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl Speaker for RecordingSpeaker {
        async fn speak(&self, utterance: &Utterance) -> Result<(), SpeechError> {
            self.spoken.lock().unwrap().push(utterance.text.clone());
            Ok(())
        }
    }

    fn monitor(speed: f64, seed: u64) -> SharedMonitorState {
        let state = SystemState {
            is_running: true,
            current_speed: speed,
            ..SystemState::default()
        };
        Arc::new(Mutex::new(MonitorState::new(
            Engine::with_state(state, SmallRng::seed_from_u64(seed)),
            false,
        )))
    }

    fn quiet_gate() -> SpeechGate {
        SpeechGate::new(Arc::new(RecordingSpeaker::default()))
    }

    // 10_500 mod 5000 = 500, inside the persistence window
    const PERSIST_AT: u64 = 1_700_000_010_500;

    #[tokio::test]
    async fn rejected_write_sets_flag_and_simulation_continues() {
        let failing = monitor(40.0, 21);
        let healthy = monitor(40.0, 21);
        let gate = quiet_gate();
        let bad: Arc<dyn TelemetryStore> = Arc::new(RejectingStore);
        let good: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());

        tick_once(&failing, &gate, &bad, PERSIST_AT).await.unwrap().await.unwrap();
        tick_once(&healthy, &gate, &good, PERSIST_AT).await.unwrap().await.unwrap();

        let failing_state = {
            let monitor = failing.lock().await;
            assert!(monitor.store_error.is_some());
            monitor.engine.state().clone()
        };
        assert!(healthy.lock().await.store_error.is_none());
        assert_eq!(failing_state, *healthy.lock().await.engine.state());

        // Next tick runs normally and matches the healthy run
        tick_once(&failing, &gate, &bad, PERSIST_AT + 1_500).await;
        tick_once(&healthy, &gate, &good, PERSIST_AT + 1_500).await;
        assert_eq!(
            *failing.lock().await.engine.state(),
            *healthy.lock().await.engine.state()
        );
    }

    #[tokio::test]
    async fn successful_write_clears_previous_error() {
        let state = monitor(40.0, 3);
        state.lock().await.set_store_error("earlier failure".to_string());
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn TelemetryStore> = store.clone();

        tick_once(&state, &quiet_gate(), &dyn_store, PERSIST_AT).await.unwrap().await.unwrap();

        assert!(state.lock().await.store_error.is_none());
        let latest = store.read_latest().await.unwrap().unwrap();
        assert_eq!(latest.timestamp, PERSIST_AT.to_string());
    }

    #[tokio::test]
    async fn no_write_outside_window() {
        let state = monitor(40.0, 4);
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
        assert!(tick_once(&state, &quiet_gate(), &store, 1_700_000_012_005).await.is_none());
        assert_eq!(store.read_all().await.unwrap(), None);
    }

    #[tokio::test]
    async fn stopped_system_issues_no_side_effects() {
        let state = monitor(40.0, 5);
        state.lock().await.engine.set_running(false);
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
        assert!(tick_once(&state, &quiet_gate(), &store, PERSIST_AT).await.is_none());
    }

    #[tokio::test]
    async fn tick_alert_reaches_the_speaker() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let gate = SpeechGate::new(speaker.clone());
        let state = monitor(90.0, 6);
        state.lock().await.set_audio_alerts(true);
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());

        // From 90 km/h a single tick stays over the limit, so some alert fires
        tick_once(&state, &gate, &store, 1_700_000_002_000).await;
        for _ in 0..100 {
            if !gate.is_speaking() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let spoken = speaker.spoken.lock().unwrap().clone();
        assert_eq!(spoken.len(), 1);
    }

    #[tokio::test]
    async fn busy_gate_leaves_cooldowns_untouched() {
        let speaker = Arc::new(RecordingSpeaker::default());
        let gate = SpeechGate::new(speaker.clone());
        let state = monitor(90.0, 6);
        state.lock().await.set_audio_alerts(true);
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());

        // Another caller (a test alert) owns the gate for this tick
        let held = gate.try_claim().unwrap();
        tick_once(&state, &gate, &store, 1_700_000_002_000).await;
        assert_eq!(*state.lock().await.engine.timers(), CooldownTimers::default());
        assert!(gate.is_speaking());
        drop(held);

        // Once free, the next tick both records and voices its alert
        tick_once(&state, &gate, &store, 1_700_000_003_000).await;
        let timers = *state.lock().await.engine.timers();
        assert_eq!(timers.last_alert_at, Some(1_700_000_003_000));
        for _ in 0..100 {
            if !gate.is_speaking() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(speaker.spoken.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn quiet_tick_releases_the_gate() {
        let state = monitor(20.0, 9);
        let gate = quiet_gate();
        let store: Arc<dyn TelemetryStore> = Arc::new(MemoryStore::new());
        tick_once(&state, &gate, &store, 1_700_000_002_000).await;
        assert!(!gate.is_speaking());
        assert!(gate.request(Utterance::new("test")));
    }

    #[tokio::test]
    async fn history_listener_tracks_store_and_disconnects() {
        let state = monitor(40.0, 7);
        let store = Arc::new(MemoryStore::new());
        let listener = start_history_listener(state.clone(), store.clone());

        store
            .write(&TelemetrySample {
                speed: 44.0,
                obstacle_distance: 180.0,
                timestamp: "1700000000000".to_string(),
            })
            .await
            .unwrap();

        let mut seen = 0;
        for _ in 0..200 {
            seen = state.lock().await.history_len();
            if seen == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(seen, 1);
        assert!(state.lock().await.store_connected);
        listener.abort();

        let offline = monitor(40.0, 8);
        let down: Arc<dyn TelemetryStore> = Arc::new(RejectingStore);
        let listener = start_history_listener(offline.clone(), down);
        let _ = listener.await;
        let monitor = offline.lock().await;
        assert!(!monitor.store_connected);
        assert_eq!(monitor.history_len(), 0);
    }
}
