//! C1 — instrument registry: an immutable catalog of tradable symbols plus
//! the instrument->factor beta edges news drift projects through.

use std::collections::HashMap;

use crate::models::{Instrument, MacroFactor};

/// Immutable catalog loaded once from a seed snapshot at startup.
#[derive(Debug)]
pub struct Registry {
    instruments: HashMap<String, Instrument>,
    factors: HashMap<String, MacroFactor>,
    /// `beta(instrument_id, factor_id)`; missing edges are treated as 0.0.
    betas: HashMap<(String, String), f64>,
}

impl Registry {
    pub fn new(
        instruments: Vec<Instrument>,
        factors: Vec<MacroFactor>,
        betas: Vec<(String, String, f64)>,
    ) -> Self {
        Self {
            instruments: instruments.into_iter().map(|i| (i.id.clone(), i)).collect(),
            factors: factors.into_iter().map(|f| (f.id.clone(), f)).collect(),
            betas: betas
                .into_iter()
                .map(|(inst, factor, beta)| ((inst, factor), beta))
                .collect(),
        }
    }

    pub fn contains_symbol(&self, symbol: &str) -> bool {
        self.instruments.contains_key(symbol)
    }

    pub fn instrument(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(|s| s.as_str())
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn factors(&self) -> impl Iterator<Item = &MacroFactor> {
        self.factors.values()
    }

    pub fn factor(&self, id: &str) -> Option<&MacroFactor> {
        self.factors.get(id)
    }

    /// `beta(i, f)`, defaulting to 0.0 for an unmodeled edge (§4.4: "Missing
    /// factor edges contribute nothing; they are not errors").
    pub fn beta(&self, instrument_id: &str, factor_id: &str) -> f64 {
        self.betas
            .get(&(instrument_id.to_string(), factor_id.to_string()))
            .copied()
            .unwrap_or(0.0)
    }
}
