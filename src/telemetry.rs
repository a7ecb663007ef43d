use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use rand::rngs::SmallRng;

pub mod alerts;
pub mod engine;
pub mod runner;
pub mod sampler;

use crate::store::Snapshot;
use engine::Engine;

pub const DEFAULT_SPEED_LIMIT_KPH: f64 = 60.0;
pub const DEFAULT_BATTERY_LEVEL: f64 = 85.0;

pub const OBSTACLE_ALERT_MESSAGE: &str = "Obstacle Detected - Reducing Speed";
pub const OVERSPEED_ALERT_MESSAGE: &str = "Overspeed Alert - Speed Limit Exceeded";

/// Simulated vehicle state, advanced only by the engine tick or a start/stop command.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemState {
    pub is_running: bool,
    /// km/h, never negative
    pub current_speed: f64,
    pub speed_limit: f64,
    /// Only true for the tick it was synthesized on
    pub obstacle_detected: bool,
    /// Percent in [0, 100]
    pub battery_level: f64,
    /// Messages for the current tick only
    pub alerts: Vec<String>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            is_running: false,
            current_speed: 0.0,
            speed_limit: DEFAULT_SPEED_LIMIT_KPH,
            obstacle_detected: false,
            battery_level: DEFAULT_BATTERY_LEVEL,
            alerts: Vec::new(),
        }
    }
}

impl SystemState {
    pub fn is_overspeed(&self) -> bool {
        self.current_speed > self.speed_limit
    }

    pub fn speed_status(&self) -> SpeedStatus {
        SpeedStatus::classify(self.current_speed, self.speed_limit)
    }

    /// Fill level of the speed-control gauge, as a percentage of the limit.
    pub fn speed_ratio_percent(&self) -> f64 {
        self.current_speed / self.speed_limit * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedStatus {
    Normal,
    Warning,
    Overspeed,
}

impl SpeedStatus {
    pub fn classify(speed: f64, limit: f64) -> Self {
        if speed > limit {
            SpeedStatus::Overspeed
        } else if speed > limit * 0.8 {
            SpeedStatus::Warning
        } else {
            SpeedStatus::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpeedStatus::Normal => "NORMAL",
            SpeedStatus::Warning => "WARNING",
            SpeedStatus::Overspeed => "OVERSPEED",
        }
    }
}

/// One persisted record, keyed in the store by its `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub speed: f64,
    #[serde(rename = "obstacleDistance")]
    pub obstacle_distance: f64,
    pub timestamp: String,
}

/// Cosmetic per-module display switches. The engine never reads these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleToggles {
    pub speed_measurement: bool,
    pub detection_alerts: bool,
    pub speed_control: bool,
}

impl Default for ModuleToggles {
    fn default() -> Self {
        Self {
            speed_measurement: true,
            detection_alerts: true,
            speed_control: true,
        }
    }
}

impl ModuleToggles {
    /// Modules are numbered 1..=3 on the command surface.
    pub fn set(&mut self, module: u8, active: bool) -> bool {
        match module {
            1 => self.speed_measurement = active,
            2 => self.detection_alerts = active,
            3 => self.speed_control = active,
            _ => return false,
        }
        true
    }
}

pub struct MonitorState {
    pub engine: Engine<SmallRng>,
    pub audio_alerts: bool,
    pub modules: ModuleToggles,
    pub store_error: Option<(String, Instant)>,
    pub store_connected: bool,
    /// Last mapping delivered by the store subscription
    pub history: Option<Snapshot>,
}

impl MonitorState {
    pub fn new(engine: Engine<SmallRng>, audio_alerts: bool) -> Self {
        Self {
            engine,
            audio_alerts,
            modules: ModuleToggles::default(),
            store_error: None,
            store_connected: false,
            history: None,
        }
    }

    pub fn set_store_error(&mut self, error: String) {
        self.store_error = Some((error, Instant::now()));
    }

    pub fn clear_store_error(&mut self) {
        self.store_error = None;
    }

    pub fn set_audio_alerts(&mut self, enabled: bool) {
        self.audio_alerts = enabled;
    }

    pub fn history_len(&self) -> usize {
        self.history.as_ref().map(|h| h.len()).unwrap_or(0)
    }
}

pub type SharedMonitorState = Arc<Mutex<MonitorState>>;
