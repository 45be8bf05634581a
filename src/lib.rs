//! Equisim core: a continuously running multi-user equity trading simulator.
//!
//! Exposes the simulation core modules (instrument registry, user ledger,
//! order book, risk gate, news engine, price simulator, market-making bots,
//! order generator, and tick orchestrator) plus the HTTP/WebSocket boundary
//! that wires them together.

pub mod api;
pub mod bots;
pub mod config;
pub mod error;
pub mod generator;
pub mod ledger;
pub mod models;
pub mod news;
pub mod orchestrator;
pub mod orderbook;
pub mod priceproc;
pub mod registry;
pub mod risk;
pub mod snapshot;
