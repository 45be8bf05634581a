//! C5 — news engine: simulation clock, bucket activation lottery, exponential
//! decay, and per-instrument drift projection.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use parking_lot::RwLock;
use rand::seq::SliceRandom;

use crate::models::NewsEvent;
use crate::registry::Registry;

/// Width of a bucket-activation bin, in simulation milliseconds (§4.4).
const BUCKET_WIDTH_MS: i64 = 100_000;

struct NewsState {
    events: HashMap<i64, NewsEvent>,
    active_ids: HashSet<i64>,
    activated_ids: HashSet<i64>,
    /// Buckets already rolled for the lottery, so a consumed bucket never
    /// activates a second late-arriving candidate.
    consumed_buckets: HashSet<i64>,
}

/// Scheduled news plus ad-hoc injections, with the activation lottery and
/// decay/drift projection from §4.4.
pub struct NewsEngine {
    registry: std::sync::Arc<Registry>,
    sim_start: Instant,
    state: RwLock<NewsState>,
}

/// Point-in-time view of `(event, effect)` for every currently active event.
pub struct NewsStatus {
    pub event: NewsEvent,
    pub effect: f64,
}

impl NewsEngine {
    pub fn new(registry: std::sync::Arc<Registry>, events: Vec<NewsEvent>) -> Self {
        Self {
            registry,
            sim_start: Instant::now(),
            state: RwLock::new(NewsState {
                events: events.into_iter().map(|e| (e.id, e)).collect(),
                active_ids: HashSet::new(),
                activated_ids: HashSet::new(),
                consumed_buckets: HashSet::new(),
            }),
        }
    }

    /// `sim_time_ms = (wall_now - sim_start) * 1000`, i.e. sim time tracks
    /// wall time at 1x (§4.4).
    pub fn sim_time_ms(&self) -> i64 {
        self.sim_start.elapsed().as_millis() as i64
    }

    /// Runs one activation tick: for every not-yet-consumed bucket whose
    /// release time has passed, pick exactly one eligible candidate uniformly
    /// at random and activate it, then consume the bucket.
    pub fn tick(&self) {
        let sim_time_ms = self.sim_time_ms();
        let mut state = self.state.write();

        let mut by_bucket: HashMap<i64, Vec<i64>> = HashMap::new();
        for event in state.events.values() {
            if event.ts_release_ms > sim_time_ms || state.activated_ids.contains(&event.id) {
                continue;
            }
            let bucket = event.bucket();
            if state.consumed_buckets.contains(&bucket) {
                continue;
            }
            by_bucket.entry(bucket).or_default().push(event.id);
        }

        let mut rng = rand::thread_rng();
        for (bucket, mut candidates) in by_bucket {
            candidates.sort_unstable();
            if let Some(&chosen) = candidates.choose(&mut rng) {
                state.active_ids.insert(chosen);
                state.activated_ids.insert(chosen);
            }
            state.consumed_buckets.insert(bucket);
        }
    }

    /// Ad-hoc injection bypassing the bucket lottery (§4.4): immediately
    /// active and activated. A repeat id is a no-op for activation but the
    /// event record is still appended/replaced per §8's boundary case.
    pub fn inject(&self, event: NewsEvent) {
        let mut state = self.state.write();
        let id = event.id;
        state.events.insert(id, event);
        state.active_ids.insert(id);
        state.activated_ids.insert(id);
    }

    fn effect_at(event: &NewsEvent, sim_time_ms: i64) -> f64 {
        let t0 = event.ts_release_ms;
        if sim_time_ms < t0 {
            return 0.0;
        }
        let elapsed_s = (sim_time_ms - t0) as f64 / 1000.0;
        let h = event.halflife_s();
        event.magnitude() * 2f64.powf(-elapsed_s / h)
    }

    /// `drift(i) = sum over active events: effect(n) * sum over factors f touched
    /// by n: beta(i, f)` (§4.4). Snapshot taken under a single read lock.
    pub fn drift_map(&self) -> HashMap<String, f64> {
        let sim_time_ms = self.sim_time_ms();
        let state = self.state.read();

        let mut per_event_effect: Vec<(&NewsEvent, f64)> = state
            .active_ids
            .iter()
            .filter_map(|id| state.events.get(id))
            .map(|event| (event, Self::effect_at(event, sim_time_ms)))
            .collect();
        per_event_effect.retain(|(_, effect)| effect.abs() > f64::EPSILON);

        self.registry
            .symbols()
            .map(|symbol| {
                let drift: f64 = per_event_effect
                    .iter()
                    .map(|(event, effect)| {
                        let beta_sum: f64 = event
                            .factors
                            .iter()
                            .map(|factor| self.registry.beta(symbol, factor))
                            .sum();
                        effect * beta_sum
                    })
                    .sum();
                (symbol.to_string(), drift)
            })
            .collect()
    }

    pub fn status(&self) -> Vec<NewsStatus> {
        let sim_time_ms = self.sim_time_ms();
        let state = self.state.read();
        state
            .active_ids
            .iter()
            .filter_map(|id| state.events.get(id))
            .map(|event| NewsStatus {
                event: event.clone(),
                effect: Self::effect_at(event, sim_time_ms),
            })
            .collect()
    }

    pub fn all(&self) -> Vec<NewsEvent> {
        self.state.read().events.values().cloned().collect()
    }

    /// Events eligible to activate right now but not yet activated.
    pub fn candidates(&self) -> Vec<NewsEvent> {
        let sim_time_ms = self.sim_time_ms();
        let state = self.state.read();
        state
            .events
            .values()
            .filter(|e| e.ts_release_ms <= sim_time_ms && !state.activated_ids.contains(&e.id))
            .cloned()
            .collect()
    }

    pub fn active(&self) -> Vec<NewsEvent> {
        let state = self.state.read();
        state
            .active_ids
            .iter()
            .filter_map(|id| state.events.get(id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Instrument, MacroFactor};

    fn registry() -> std::sync::Arc<Registry> {
        std::sync::Arc::new(Registry::new(
            vec![Instrument {
                id: "AAPL".into(),
                display_name: "Apple".into(),
                s0: 100.0,
                mean: 0.05,
                variance: 0.04,
            }],
            vec![MacroFactor {
                id: "RATES".into(),
                cap_up: 1.0,
                cap_down: -1.0,
            }],
            vec![("AAPL".into(), "RATES".into(), 2.0)],
        ))
    }

    fn event(id: i64, release_ms: i64, magnitude: f64, halflife_s: f64) -> NewsEvent {
        NewsEvent {
            id,
            headline: format!("event {id}"),
            description: String::new(),
            ts_release_ms: release_ms,
            decay_halflife_s: halflife_s,
            magnitude_top: magnitude,
            magnitude_bottom: magnitude,
            factors: vec!["RATES".into()],
        }
    }

    #[test]
    fn drift_projection_matches_scenario_5() {
        let engine = NewsEngine::new(registry(), vec![]);
        engine.inject(event(1, 0, 0.01, 100.0));

        // effect(t=0) = 0.01, drift = 0.01 * 2.0 = 0.02
        let at_zero = NewsEngine::effect_at(&event(1, 0, 0.01, 100.0), 0);
        assert!((at_zero - 0.01).abs() < 1e-9);

        let at_100s = NewsEngine::effect_at(&event(1, 0, 0.01, 100.0), 100_000);
        assert!((at_100s - 0.005).abs() < 1e-9);

        let at_200s = NewsEngine::effect_at(&event(1, 0, 0.01, 100.0), 200_000);
        assert!((at_200s - 0.0025).abs() < 1e-9);
    }

    #[test]
    fn inject_makes_event_immediately_active() {
        let engine = NewsEngine::new(registry(), vec![]);
        engine.inject(event(7, 0, 0.01, 50.0));
        assert_eq!(engine.active().len(), 1);
        let drift = engine.drift_map();
        assert!(drift.get("AAPL").copied().unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn missing_beta_edge_contributes_zero_drift() {
        let engine = NewsEngine::new(registry(), vec![]);
        let mut e = event(1, 0, 0.01, 100.0);
        e.factors = vec!["UNMODELED".into()];
        engine.inject(e);
        let drift = engine.drift_map();
        assert_eq!(drift.get("AAPL").copied().unwrap_or(0.0), 0.0);
    }

    #[test]
    fn decay_is_monotone_nonincreasing_in_time() {
        let e = event(1, 0, 0.02, 30.0);
        let e1 = NewsEngine::effect_at(&e, 10_000);
        let e2 = NewsEngine::effect_at(&e, 20_000);
        assert!(e1 >= e2);
    }

    #[test]
    fn nonpositive_halflife_is_guarded_to_one_second() {
        let mut e = event(1, 0, 0.01, 0.0);
        e.decay_halflife_s = -5.0;
        assert_eq!(e.halflife_s(), 1.0);
    }

    #[test]
    fn bucket_lottery_activates_exactly_one_per_bucket_scenario_6() {
        // Back-date sim_start so both release times (50s/60s) are already in
        // the past without waiting on a real clock.
        let engine = NewsEngine {
            registry: registry(),
            sim_start: Instant::now() - std::time::Duration::from_secs(70),
            state: RwLock::new(NewsState {
                events: HashMap::from([(1, event(1, 50_000, 0.01, 60.0)), (2, event(2, 60_000, 0.01, 60.0))]),
                active_ids: HashSet::new(),
                activated_ids: HashSet::new(),
                consumed_buckets: HashSet::new(),
            }),
        };
        engine.tick();
        assert_eq!(engine.active().len(), 1);
        engine.tick();
        assert_eq!(engine.active().len(), 1, "bucket is consumed, second tick activates nothing new");
    }
}
