use crate::telemetry::TelemetrySample;
use crate::telemetry::engine::UnitSource;

pub const PERSIST_PERIOD_MS: u64 = 5_000;
pub const PERSIST_WINDOW_MS: u64 = 1_000;

/// Coarse persistence gate: a one-second window opening every five seconds of
/// wall-clock time. With a 1 s tick roughly one tick in five lands inside it.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersistenceSampler;

impl PersistenceSampler {
    pub fn should_persist(&self, now_ms: u64) -> bool {
        now_ms % PERSIST_PERIOD_MS < PERSIST_WINDOW_MS
    }

    /// Obstacle distance is a synthetic proxy: near when an obstacle was seen.
    pub fn build_sample<R: UnitSource>(
        &self,
        speed: f64,
        obstacle_detected: bool,
        now_ms: u64,
        rng: &mut R,
    ) -> TelemetrySample {
        let obstacle_distance = if obstacle_detected {
            20.0 + rng.unit() * 80.0
        } else {
            100.0 + rng.unit() * 150.0
        };
        TelemetrySample {
            speed,
            obstacle_distance,
            timestamp: now_ms.to_string(),
        }
    }

    pub fn sample<R: UnitSource>(
        &self,
        speed: f64,
        obstacle_detected: bool,
        now_ms: u64,
        rng: &mut R,
    ) -> Option<TelemetrySample> {
        if self.should_persist(now_ms) {
            Some(self.build_sample(speed, obstacle_detected, now_ms, rng))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn gate_opens_for_first_second_of_each_period() {
        let sampler = PersistenceSampler;
        assert!(!sampler.should_persist(12_005));
        assert!(sampler.should_persist(10_500));
        assert!(sampler.should_persist(15_000));
        assert!(sampler.should_persist(15_999));
        assert!(!sampler.should_persist(16_000));
    }

    #[test]
    fn duty_cycle_is_one_in_five_at_one_hz() {
        let sampler = PersistenceSampler;
        let start = 1_700_000_000_123u64;
        let hits = (0..100).filter(|i| sampler.should_persist(start + i * 1_000)).count();
        assert_eq!(hits, 20);
    }

    #[test]
    fn obstacle_distance_ranges() {
        let sampler = PersistenceSampler;
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..500 {
            let near = sampler.build_sample(40.0, true, 10_000, &mut rng);
            assert!((20.0..100.0).contains(&near.obstacle_distance));
            let far = sampler.build_sample(40.0, false, 10_000, &mut rng);
            assert!((100.0..250.0).contains(&far.obstacle_distance));
        }
    }

    #[test]
    fn sample_is_keyed_by_timestamp() {
        let sampler = PersistenceSampler;
        let mut rng = SmallRng::seed_from_u64(1);
        let sample = sampler.sample(61.5, false, 10_500, &mut rng).unwrap();
        assert_eq!(sample.timestamp, "10500");
        assert_eq!(sample.speed, 61.5);
        assert!(sampler.sample(61.5, false, 12_005, &mut rng).is_none());
    }
}
