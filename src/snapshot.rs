//! Startup seed data: instruments, factors, news events, and the edges
//! between them, loaded once and handed to the registry/news engine.

use serde::{Deserialize, Serialize};

use crate::models::{Instrument, MacroFactor, NewsEvent};

/// `(instrument_id, factor_id, beta)` edge.
pub type BetaEdge = (String, String, f64);

/// Everything the engine needs at startup, as read from an external snapshot
/// source (§6 "Startup inputs") or, absent one, a small built-in demo set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedSnapshot {
    pub instruments: Vec<Instrument>,
    pub factors: Vec<MacroFactor>,
    pub news_events: Vec<NewsEvent>,
    pub betas: Vec<BetaEdge>,
}

impl SeedSnapshot {
    /// Loads a snapshot from a JSON file on disk.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading seed snapshot at {path}: {e}"))?;
        let snapshot: SeedSnapshot = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing seed snapshot at {path}: {e}"))?;
        Ok(snapshot)
    }

    /// Small built-in catalog used when no `SEED_SNAPSHOT_PATH` is configured.
    pub fn demo() -> Self {
        let instruments = vec![
            Instrument {
                id: "AAPL".into(),
                display_name: "Apple Inc.".into(),
                s0: 190.0,
                mean: 0.08,
                variance: 0.05,
            },
            Instrument {
                id: "TSLA".into(),
                display_name: "Tesla Inc.".into(),
                s0: 250.0,
                mean: 0.12,
                variance: 0.20,
            },
            Instrument {
                id: "SPY".into(),
                display_name: "S&P 500 ETF".into(),
                s0: 520.0,
                mean: 0.06,
                variance: 0.025,
            },
        ];

        let factors = vec![
            MacroFactor {
                id: "RATES".into(),
                cap_up: 1.0,
                cap_down: -1.0,
            },
            MacroFactor {
                id: "TECH_SENTIMENT".into(),
                cap_up: 1.0,
                cap_down: -1.0,
            },
        ];

        let betas = vec![
            ("AAPL".into(), "TECH_SENTIMENT".into(), 1.5),
            ("AAPL".into(), "RATES".into(), -0.4),
            ("TSLA".into(), "TECH_SENTIMENT".into(), 2.2),
            ("SPY".into(), "RATES".into(), -0.8),
            ("SPY".into(), "TECH_SENTIMENT".into(), 0.5),
        ];

        let news_events = vec![NewsEvent {
            id: 1,
            headline: "Fed signals rate cut".into(),
            description: "Federal Reserve hints at easing cycle.".into(),
            ts_release_ms: 30_000,
            decay_halflife_s: 120.0,
            magnitude_top: 0.015,
            magnitude_bottom: 0.005,
            factors: vec!["RATES".into()],
        }];

        Self {
            instruments,
            factors,
            news_events,
            betas,
        }
    }
}
