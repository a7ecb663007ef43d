use rand::Rng;
use log::Level::{Debug, Info};

use crate::telemetry::alerts::{AlertKind, AlertPolicy};
use crate::telemetry::sampler::PersistenceSampler;
use crate::telemetry::{SystemState, TelemetrySample};

pub const START_SPEED_KPH: f64 = 45.0;
pub const BATTERY_DRAIN_PER_TICK: f64 = 0.01;
pub const OBSTACLE_SPACING_MS: u64 = 8_000;
pub const OBSTACLE_PROBABILITY: f64 = 0.8;
pub const RECENT_OVERSPEED_WINDOW_MS: u64 = 10_000;

/// Source of uniform draws in `[0, 1)`.
pub trait UnitSource {
    fn unit(&mut self) -> f64;
}

impl<R: Rng> UnitSource for R {
    fn unit(&mut self) -> f64 {
        self.gen_range(0.0..1.0)
    }
}

/// Side effects requested by one tick. The caller performs them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub alert: Option<AlertKind>,
    pub sample: Option<TelemetrySample>,
}

/// Speed delta for one tick given the current speed band and whether an
/// overspeed alert fired recently.
pub fn speed_delta<R: UnitSource>(current_speed: f64, recently_overspeed: bool, rng: &mut R) -> f64 {
    let r = rng.unit();
    if current_speed < 50.0 {
        1.0 + r * 4.0
    } else if current_speed < 70.0 {
        if recently_overspeed {
            -(2.0 + r * 6.0)
        } else {
            (r - 0.3) * 8.0
        }
    } else if recently_overspeed {
        -(3.0 + r * 8.0)
    } else {
        (r - 0.5) * 6.0
    }
}

pub struct Engine<R> {
    state: SystemState,
    policy: AlertPolicy,
    sampler: PersistenceSampler,
    last_obstacle_at: Option<u64>,
    rng: R,
}

impl<R: UnitSource> Engine<R> {
    pub fn new(rng: R) -> Self {
        Self::with_state(SystemState::default(), rng)
    }

    pub fn with_state(state: SystemState, rng: R) -> Self {
        Self {
            state,
            policy: AlertPolicy::new(),
            sampler: PersistenceSampler,
            last_obstacle_at: None,
            rng,
        }
    }

    pub fn state(&self) -> &SystemState {
        &self.state
    }

    #[cfg(test)]
    pub fn timers(&self) -> &crate::telemetry::alerts::CooldownTimers {
        self.policy.timers()
    }

    /// Starting seeds the speed so overspeed is reachable quickly; stopping
    /// parks the vehicle. Everything else carries over.
    pub fn set_running(&mut self, running: bool) {
        if running == self.state.is_running {
            return;
        }
        self.state.is_running = running;
        self.state.current_speed = if running { START_SPEED_KPH } else { 0.0 };
        crate::engine_log!(Info, "System {}", if running { "started" } else { "stopped" });
    }

    pub fn toggle(&mut self) -> bool {
        let running = !self.state.is_running;
        self.set_running(running);
        running
    }

    fn obstacle_eligible(&self, now_ms: u64) -> bool {
        match self.last_obstacle_at {
            Some(at) => now_ms.saturating_sub(at) > OBSTACLE_SPACING_MS,
            None => true,
        }
    }

    /// Advance the simulation by one period.
    ///
    /// Draws are taken in a fixed order (speed, obstacle when eligible,
    /// obstacle distance when persisting) so a seeded source replays exactly.
    pub fn tick(&mut self, now_ms: u64, alerts_enabled: bool, speaking: bool) -> TickOutcome {
        if !self.state.is_running {
            return TickOutcome::default();
        }

        let recently_overspeed = self
            .policy
            .timers()
            .overspeed_alert_within(now_ms, RECENT_OVERSPEED_WINDOW_MS);
        let delta = speed_delta(self.state.current_speed, recently_overspeed, &mut self.rng);
        let new_speed = (self.state.current_speed + delta).max(0.0);

        let obstacle = if self.obstacle_eligible(now_ms) {
            self.rng.unit() < OBSTACLE_PROBABILITY
        } else {
            false
        };
        if obstacle {
            self.last_obstacle_at = Some(now_ms);
        }

        self.state.current_speed = new_speed;
        self.state.obstacle_detected = obstacle;
        self.state.battery_level = (self.state.battery_level - BATTERY_DRAIN_PER_TICK).max(0.0);
        self.state.alerts = if obstacle {
            vec![AlertKind::Obstacle.message().to_string()]
        } else if self.state.is_overspeed() {
            vec![AlertKind::Overspeed.message().to_string()]
        } else {
            Vec::new()
        };

        crate::engine_log!(
            Debug,
            "tick {}: speed {:.1} km/h (delta {:+.2}), obstacle {}, battery {:.2}%",
            now_ms,
            new_speed,
            delta,
            obstacle,
            self.state.battery_level
        );

        let alert = self.policy.evaluate(&self.state, now_ms, alerts_enabled, speaking);
        let sample = self.sampler.sample(new_speed, obstacle, now_ms, &mut self.rng);

        TickOutcome { alert, sample }
    }
}
