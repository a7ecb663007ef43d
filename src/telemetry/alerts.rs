use crate::telemetry::{SystemState, OBSTACLE_ALERT_MESSAGE, OVERSPEED_ALERT_MESSAGE};
use crate::speech::Utterance;
use log::Level::Info;

pub const OBSTACLE_ALERT_COOLDOWN_MS: u64 = 8_000;
pub const OVERSPEED_ALERT_COOLDOWN_MS: u64 = 6_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Obstacle,
    Overspeed,
}

impl AlertKind {
    pub fn message(&self) -> &'static str {
        match self {
            AlertKind::Obstacle => OBSTACLE_ALERT_MESSAGE,
            AlertKind::Overspeed => OVERSPEED_ALERT_MESSAGE,
        }
    }

    pub fn utterance(&self) -> Utterance {
        match self {
            AlertKind::Obstacle => Utterance::new("Warning. Obstacle detected ahead. Reducing speed.")
                .with_rate(1.1)
                .with_pitch(1.2)
                .with_volume(1.0),
            AlertKind::Overspeed => Utterance::new("Warning. Speed limit exceeded. Please slow down.")
                .with_rate(1.0)
                .with_pitch(1.0)
                .with_volume(0.9),
        }
    }
}

/// Last-fired wall-clock times in milliseconds. `None` means never fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CooldownTimers {
    pub last_obstacle_alert_at: Option<u64>,
    pub last_overspeed_alert_at: Option<u64>,
    /// Written on every firing of either kind; no gating decision reads it.
    pub last_alert_at: Option<u64>,
}

impl CooldownTimers {
    pub fn overspeed_alert_within(&self, now_ms: u64, window_ms: u64) -> bool {
        within(self.last_overspeed_alert_at, now_ms, window_ms)
    }

    fn record(&mut self, kind: AlertKind, now_ms: u64) {
        match kind {
            AlertKind::Obstacle => self.last_obstacle_alert_at = Some(now_ms),
            AlertKind::Overspeed => self.last_overspeed_alert_at = Some(now_ms),
        }
        self.last_alert_at = Some(now_ms);
    }
}

/// True when `last` is set and less than `window_ms` has passed since it.
fn within(last: Option<u64>, now_ms: u64, window_ms: u64) -> bool {
    match last {
        Some(at) => now_ms.saturating_sub(at) < window_ms,
        None => false,
    }
}

/// True when `last` is unset or strictly more than `cooldown_ms` has passed.
fn cooled_down(last: Option<u64>, now_ms: u64, cooldown_ms: u64) -> bool {
    match last {
        Some(at) => now_ms.saturating_sub(at) > cooldown_ms,
        None => true,
    }
}

#[derive(Debug, Default)]
pub struct AlertPolicy {
    timers: CooldownTimers,
}

impl AlertPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timers(&self) -> &CooldownTimers {
        &self.timers
    }

    /// Decide which alert, if any, to voice for the freshly computed state.
    ///
    /// Obstacle is considered first. Once it fires an utterance is in flight,
    /// so the overspeed check in the same tick sees `speaking` and drops out.
    pub fn evaluate(
        &mut self,
        state: &SystemState,
        now_ms: u64,
        alerts_enabled: bool,
        speaking: bool,
    ) -> Option<AlertKind> {
        if !alerts_enabled {
            return None;
        }
        let mut speaking = speaking;
        let mut fired = None;

        if state.obstacle_detected
            && !speaking
            && cooled_down(self.timers.last_obstacle_alert_at, now_ms, OBSTACLE_ALERT_COOLDOWN_MS)
        {
            self.timers.record(AlertKind::Obstacle, now_ms);
            speaking = true;
            fired = Some(AlertKind::Obstacle);
        }

        if state.is_overspeed()
            && !speaking
            && cooled_down(self.timers.last_overspeed_alert_at, now_ms, OVERSPEED_ALERT_COOLDOWN_MS)
        {
            self.timers.record(AlertKind::Overspeed, now_ms);
            fired = Some(AlertKind::Overspeed);
        }

        if let Some(kind) = fired {
            crate::alerts_log!(Info, "{:?} alert fired at {}", kind, now_ms);
        }
        fired
    }
}
