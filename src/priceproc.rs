//! C6 — price simulator: one geometric Brownian motion instance per
//! instrument, drift supplied by the news engine each tick.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand_distr::{Distribution, StandardNormal};

use crate::models::Instrument;

/// `delta` in the GBM update: one trading day as a fraction of a year, ticked
/// once per second rather than once per day (§4.5).
const DELTA: f64 = 1.0 / 252.0;

struct GbmState {
    current_price: f64,
    mean: f64,
    variance: f64,
}

/// Per-symbol GBM reference price, driven by a news-supplied drift snapshot.
pub struct PriceSimulator {
    states: RwLock<HashMap<String, GbmState>>,
}

impl PriceSimulator {
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            states: RwLock::new(
                instruments
                    .into_iter()
                    .map(|i| {
                        (
                            i.id,
                            GbmState {
                                current_price: i.s0,
                                mean: i.mean,
                                variance: i.variance,
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Advances every symbol by one GBM step, using `drift` (from the news
    /// engine's drift-map snapshot) as the per-symbol additive drift term.
    /// Missing drift entries are treated as zero.
    pub fn tick(&self, drift: &HashMap<String, f64>) {
        let mut states = self.states.write();
        let mut rng = rand::thread_rng();
        for (symbol, state) in states.iter_mut() {
            let d = drift.get(symbol).copied().unwrap_or(0.0);
            let eps: f64 = StandardNormal.sample(&mut rng);
            let exponent = (state.mean + d - state.variance / 2.0) * DELTA
                + state.variance.sqrt() * eps * DELTA.sqrt();
            state.current_price *= exponent.exp();
        }
    }

    pub fn price(&self, symbol: &str) -> Option<f64> {
        self.states.read().get(symbol).map(|s| s.current_price)
    }

    pub fn prices(&self) -> HashMap<String, f64> {
        self.states
            .read()
            .iter()
            .map(|(s, st)| (s.clone(), st.current_price))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(id: &str, s0: f64) -> Instrument {
        Instrument {
            id: id.to_string(),
            display_name: id.to_string(),
            s0,
            mean: 0.05,
            variance: 0.04,
        }
    }

    #[test]
    fn unknown_symbol_has_no_price() {
        let sim = PriceSimulator::new(vec![inst("AAPL", 100.0)]);
        assert!(sim.price("MSFT").is_none());
    }

    #[test]
    fn price_starts_at_s0_and_stays_positive_after_ticks() {
        let sim = PriceSimulator::new(vec![inst("AAPL", 100.0)]);
        assert_eq!(sim.price("AAPL"), Some(100.0));
        let drift = HashMap::new();
        for _ in 0..50 {
            sim.tick(&drift);
            assert!(sim.price("AAPL").unwrap() > 0.0);
        }
    }

    #[test]
    fn missing_drift_entry_defaults_to_zero() {
        let sim = PriceSimulator::new(vec![inst("AAPL", 100.0)]);
        sim.tick(&HashMap::new());
        assert!(sim.price("AAPL").unwrap() > 0.0);
    }
}
