mod commands;
mod config;
mod dashboard;
mod logging;
mod speech;
mod store;
mod telemetry;

use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use log::Level::{Error, Info};
use log::{error, info};

use crate::config::{Config, StoreConfig};
use crate::speech::{CommandSpeaker, NotifySpeaker, Speaker, SpeechGate};
use crate::store::{MemoryStore, StoreError, TelemetryStore};
use crate::telemetry::engine::Engine;
use crate::telemetry::{runner, MonitorState};

fn build_store(config: &StoreConfig) -> Result<Arc<dyn TelemetryStore>, StoreError> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "firebase")]
        StoreConfig::Firebase {
            database_url,
            path,
            auth_token,
            poll_interval_ms,
            timeout_ms,
        } => Ok(Arc::new(store::firebase::FirebaseStore::new(
            database_url.clone(),
            path.clone(),
            auth_token.clone(),
            Duration::from_millis(*timeout_ms),
            Duration::from_millis(*poll_interval_ms),
        )?)),
        #[cfg(not(feature = "firebase"))]
        StoreConfig::Firebase { .. } => Err(StoreError::Unavailable(
            "built without the firebase feature".to_string(),
        )),
    }
}

fn build_speaker(config: &config::SpeechConfig) -> Arc<dyn Speaker> {
    match &config.command {
        Some(program) => Arc::new(CommandSpeaker::new(program.clone())),
        None => Arc::new(NotifySpeaker),
    }
}

#[tokio::main]
async fn main() {
    logging::init_logging();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let store = match build_store(&config.store) {
        Ok(store) => store,
        Err(e) => {
            crate::store_log!(Error, "{e}");
            process::exit(1);
        }
    };
    let speech = SpeechGate::new(build_speaker(&config.speech));

    let mut engine = Engine::new(SmallRng::from_entropy());
    if config.autostart {
        engine.set_running(true);
    }
    let monitor_state = Arc::new(Mutex::new(MonitorState::new(engine, config.audio_alerts)));

    // Mirror the remote collection for the status view
    runner::start_history_listener(monitor_state.clone(), store.clone());

    runner::start_ticker(
        monitor_state.clone(),
        speech.clone(),
        store.clone(),
        Duration::from_millis(config.tick_period_ms),
    );

    if let Err(e) = commands::start_command_listener(
        &config.command_addr,
        monitor_state.clone(),
        speech,
        store,
    )
    .await
    {
        crate::commands_log!(Error, "Failed to bind {}: {e}", config.command_addr);
        process::exit(1);
    }

    crate::engine_log!(Info, "Speed monitor ready");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {e}");
    }
    info!("Shutting down");
}
