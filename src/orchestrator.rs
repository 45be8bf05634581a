//! C9 — tick orchestrator: starts and coordinates the periodic loops that
//! drive C5-C8 plus the price broadcaster, wiring the cyclic news -> price ->
//! generator dependency through snapshots rather than shared references
//! (§9 "Cyclic reference").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::warn;

use crate::bots::BotManager;
use crate::config::Config;
use crate::generator::OrderGenerator;
use crate::news::NewsEngine;
use crate::orderbook::OrderBook;
use crate::priceproc::PriceSimulator;

/// One `{symbol: price}` map, published to external subscribers (§4.8).
pub type PriceMap = HashMap<String, f64>;

/// Owns the `running` flag shared by every spawned loop and the broadcast
/// channel the snapshot loop publishes on.
pub struct TickOrchestrator {
    running: Arc<AtomicBool>,
    broadcast_tx: broadcast::Sender<PriceMap>,
}

impl TickOrchestrator {
    pub fn new() -> Self {
        let (broadcast_tx, _rx) = broadcast::channel(64);
        Self {
            running: Arc::new(AtomicBool::new(true)),
            broadcast_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PriceMap> {
        self.broadcast_tx.subscribe()
    }

    /// Signals every spawned loop to exit at its next suspension point.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Spawns the five periodic loops and returns once they are running.
    /// Each loop swallows transient errors (log + continue) rather than
    /// terminating the process (§4.8, §5 "Cancellation").
    pub fn spawn_all(
        &self,
        config: &Config,
        news: Arc<NewsEngine>,
        prices: Arc<PriceSimulator>,
        bots: Arc<BotManager>,
        generator: Arc<OrderGenerator>,
        book: Arc<OrderBook>,
        symbols: Vec<String>,
    ) {
        self.spawn_news_loop(config.news_tick, news.clone());
        self.spawn_price_loop(config.price_tick, news, prices.clone());
        self.spawn_bot_loop(config.bot_tick, bots);
        self.spawn_generator_loop(config.generator_tick, generator);
        self.spawn_broadcast_loop(config.broadcast_tick, book, symbols);
    }

    fn spawn_news_loop(&self, period: std::time::Duration, news: Arc<NewsEngine>) {
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                news.tick();
            }
        });
    }

    fn spawn_price_loop(
        &self,
        period: std::time::Duration,
        news: Arc<NewsEngine>,
        prices: Arc<PriceSimulator>,
    ) {
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                let drift = news.drift_map();
                prices.tick(&drift);
            }
        });
    }

    fn spawn_bot_loop(&self, period: std::time::Duration, bots: Arc<BotManager>) {
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                bots.refresh_all();
            }
        });
    }

    fn spawn_generator_loop(&self, period: std::time::Duration, generator: Arc<OrderGenerator>) {
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                generator.tick();
            }
        });
    }

    /// Collects `mid(symbol)`, falling back to best bid then best ask when
    /// mid is unavailable; a symbol with none of the three is omitted from
    /// the snapshot entirely (§4.8).
    fn spawn_broadcast_loop(&self, period: std::time::Duration, book: Arc<OrderBook>, symbols: Vec<String>) {
        let running = self.running.clone();
        let tx = self.broadcast_tx.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                let mut snapshot = PriceMap::new();
                for symbol in &symbols {
                    let price = book
                        .mid(symbol)
                        .or_else(|| book.best_bid(symbol))
                        .or_else(|| book.best_ask(symbol));
                    if let Some(price) = price {
                        snapshot.insert(symbol.clone(), price);
                    }
                }
                if tx.send(snapshot).is_err() {
                    // No subscribers yet; not fatal, keep ticking.
                    warn!("price broadcast has no subscribers");
                }
            }
        });
    }
}

impl Default for TickOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UserLedger;
    use crate::models::Instrument;
    use crate::registry::Registry;

    fn inst(id: &str) -> Instrument {
        Instrument {
            id: id.to_string(),
            display_name: id.to_string(),
            s0: 100.0,
            mean: 0.05,
            variance: 0.04,
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn broadcast_loop_publishes_price_maps() {
        let symbols = vec!["AAPL".to_string()];
        let registry = Arc::new(Registry::new(vec![inst("AAPL")], vec![], vec![]));
        let ledger = Arc::new(UserLedger::new());
        let book = Arc::new(OrderBook::new(symbols.clone(), ledger));
        let _ = book.submit(crate::models::Order::new("seed", "AAPL", crate::models::Side::Buy, 99.0, 10, true), true);
        let _ = book.submit(crate::models::Order::new("seed", "AAPL", crate::models::Side::Sell, 101.0, 10, true), true);
        let news = Arc::new(NewsEngine::new(registry, vec![]));
        let prices = Arc::new(PriceSimulator::new(vec![inst("AAPL")]));
        let bots = Arc::new(BotManager::new(book.clone(), vec![inst("AAPL")]));
        let generator = Arc::new(OrderGenerator::new(book.clone(), prices.clone(), symbols.clone()));

        let orchestrator = TickOrchestrator::new();
        let mut rx = orchestrator.subscribe();
        let config = Config {
            port: 0,
            seed_path: None,
            cors_origins: vec![],
            news_tick: std::time::Duration::from_millis(10),
            price_tick: std::time::Duration::from_millis(10),
            bot_tick: std::time::Duration::from_millis(10),
            generator_tick: std::time::Duration::from_millis(10),
            broadcast_tick: std::time::Duration::from_millis(10),
        };
        orchestrator.spawn_all(&config, news, prices, bots, generator, book, symbols);

        tokio::time::advance(std::time::Duration::from_millis(15)).await;
        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.contains_key("AAPL"));
        orchestrator.shutdown();
    }
}
