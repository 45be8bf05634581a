//! C8 — order generator: periodically nudges the book toward the GBM
//! reference price with a paired buy/sell under a reserved user id.

use std::sync::Arc;

use crate::models::{Order, Side, GENERATOR_USER_ID};
use crate::orderbook::OrderBook;
use crate::priceproc::PriceSimulator;

const GENERATOR_QUANTITY: u64 = 1;

pub struct OrderGenerator {
    book: Arc<OrderBook>,
    prices: Arc<PriceSimulator>,
    symbols: Vec<String>,
}

impl OrderGenerator {
    pub fn new(book: Arc<OrderBook>, prices: Arc<PriceSimulator>, symbols: Vec<String>) -> Self {
        Self { book, prices, symbols }
    }

    /// One generator cycle: for every symbol with both a known GBM mid and an
    /// available clamp-restricted spread, submit a paired buy/sell straddling
    /// the mid at `mid ± spread/2` through normal matching (§4.7).
    pub fn tick(&self) {
        for symbol in &self.symbols {
            let Some(mid) = self.prices.price(symbol) else {
                continue;
            };
            let Some(spread) = self.book.clamp_spread(symbol) else {
                continue;
            };
            let half_spread = spread / 2.0;

            let buy = Order::new(
                GENERATOR_USER_ID,
                symbol.clone(),
                Side::Buy,
                (mid - half_spread).max(0.01),
                GENERATOR_QUANTITY,
                false,
            );
            let sell = Order::new(
                GENERATOR_USER_ID,
                symbol.clone(),
                Side::Sell,
                mid + half_spread,
                GENERATOR_QUANTITY,
                false,
            );
            let _ = self.book.submit(buy, false);
            let _ = self.book.submit(sell, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UserLedger;
    use crate::models::Instrument;

    fn seed_quotes(book: &OrderBook, symbol: &str, bid: f64, ask: f64) {
        let _ = book.submit(Order::new("seed", symbol, Side::Buy, bid, 10, true), true);
        let _ = book.submit(Order::new("seed", symbol, Side::Sell, ask, 10, true), true);
    }

    #[test]
    fn tick_skips_symbols_with_no_known_price() {
        let book = Arc::new(OrderBook::new(vec!["AAPL".to_string()], Arc::new(UserLedger::new())));
        let prices = Arc::new(PriceSimulator::new(Vec::<Instrument>::new()));
        seed_quotes(&book, "AAPL", 99.0, 101.0);
        let generator = OrderGenerator::new(book.clone(), prices, vec!["AAPL".to_string()]);
        generator.tick();
        assert_eq!(book.best_bid("AAPL"), Some(99.0));
        assert_eq!(book.best_ask("AAPL"), Some(101.0));
    }

    #[test]
    fn tick_skips_symbols_with_no_clamp_spread() {
        let book = Arc::new(OrderBook::new(vec!["AAPL".to_string()], Arc::new(UserLedger::new())));
        let prices = Arc::new(PriceSimulator::new(vec![Instrument {
            id: "AAPL".into(),
            display_name: "Apple".into(),
            s0: 100.0,
            mean: 0.05,
            variance: 0.04,
        }]));
        let generator = OrderGenerator::new(book.clone(), prices, vec!["AAPL".to_string()]);
        generator.tick();
        assert!(book.best_bid("AAPL").is_none());
        assert!(book.best_ask("AAPL").is_none());
    }

    #[test]
    fn tick_places_paired_buy_and_sell_straddling_mid() {
        let book = Arc::new(OrderBook::new(vec!["AAPL".to_string()], Arc::new(UserLedger::new())));
        let prices = Arc::new(PriceSimulator::new(vec![Instrument {
            id: "AAPL".into(),
            display_name: "Apple".into(),
            s0: 100.0,
            mean: 0.05,
            variance: 0.04,
        }]));
        seed_quotes(&book, "AAPL", 99.0, 101.0);
        let generator = OrderGenerator::new(book.clone(), prices, vec!["AAPL".to_string()]);
        generator.tick();
        let bid = book.best_bid("AAPL").unwrap();
        let ask = book.best_ask("AAPL").unwrap();
        assert!(bid < 100.0);
        assert!(ask > 100.0);
    }
}
