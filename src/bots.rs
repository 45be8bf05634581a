//! C7 — market-making bots: one per symbol, inventory-aware two-sided
//! quoting with a periodic refresh cycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand_distr::{Distribution, Normal};
use uuid::Uuid;

use crate::models::{bot_user_id, Instrument, Order, Side};
use crate::orderbook::OrderBook;

const BASE_SPREAD: f64 = 0.005;
const STRESS_COEF: f64 = 0.02;
const INVENTORY_COEF: f64 = 0.0001;
const SPREAD_NOISE_SIGMA: f64 = 0.0005;
const MID_SHOCK_FACTOR: f64 = 0.0045;
const REVERSION_COEF: f64 = 1.0 - 0.97;
const INVENTORY_PRESSURE_COEF: f64 = 0.0005;
const INVENTORY_CLIP: f64 = 100.0;
const MAX_INVENTORY: i64 = 200;
const LEVELS: usize = 3;

struct BotState {
    s0: f64,
    mid_price: f64,
    inventory: i64,
    resting_order_ids: Vec<Uuid>,
}

/// One quoting bot per symbol, keyed by symbol and addressed through a
/// reserved `bot:<symbol>` user id (§4.6).
pub struct BotManager {
    book: Arc<OrderBook>,
    bots: Mutex<HashMap<String, BotState>>,
}

impl BotManager {
    pub fn new(book: Arc<OrderBook>, instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            book,
            bots: Mutex::new(
                instruments
                    .into_iter()
                    .map(|i| {
                        (
                            i.id,
                            BotState {
                                s0: i.s0,
                                mid_price: i.s0,
                                inventory: 0,
                                resting_order_ids: Vec::new(),
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Runs one refresh cycle for every symbol's bot (§4.6 steps 1-5).
    pub fn refresh_all(&self) {
        let symbols: Vec<String> = self.bots.lock().keys().cloned().collect();
        for symbol in symbols {
            self.refresh_one(&symbol);
        }
    }

    fn refresh_one(&self, symbol: &str) {
        let mut rng = rand::thread_rng();
        let user_id = bot_user_id(symbol);

        let mut bots = self.bots.lock();
        let Some(bot) = bots.get_mut(symbol) else {
            return;
        };

        // Step 5 (part 1): cancel prior quotes and reconcile fills into inventory.
        let prior_ids = std::mem::take(&mut bot.resting_order_ids);
        for order_id in prior_ids {
            let Some(order) = self.book.order(order_id) else {
                continue;
            };
            let filled = order.original_quantity.saturating_sub(order.remaining_quantity);
            if filled > 0 {
                match order.side {
                    Side::Buy => bot.inventory += filled as i64,
                    Side::Sell => bot.inventory -= filled as i64,
                }
            }
            self.book.cancel(order_id);
        }

        // Step 1: random walk on mid.
        let shock_dist = Normal::new(0.0, MID_SHOCK_FACTOR * bot.mid_price).unwrap();
        let shock: f64 = shock_dist.sample(&mut rng);
        let reversion = (bot.s0 - bot.mid_price) * REVERSION_COEF;
        let clipped_inventory = (bot.inventory as f64).clamp(-INVENTORY_CLIP, INVENTORY_CLIP);
        let inventory_pressure = -clipped_inventory * INVENTORY_PRESSURE_COEF * bot.s0;
        bot.mid_price = (0.1 * bot.s0).max(bot.mid_price + shock + reversion + inventory_pressure);

        // Step 2: spread.
        let drift: f64 = 0.0; // bots do not react to news directly (§4.6).
        let noise_dist = Normal::new(0.0, SPREAD_NOISE_SIGMA).unwrap();
        let eta: f64 = noise_dist.sample(&mut rng);
        let spread = BASE_SPREAD
            + STRESS_COEF * drift.abs()
            + INVENTORY_COEF * bot.inventory.unsigned_abs() as f64
            + eta;

        let mid = bot.mid_price;
        let suppress_bid = bot.inventory >= MAX_INVENTORY;
        let suppress_ask = bot.inventory <= -MAX_INVENTORY;

        let mut new_ids = Vec::with_capacity(LEVELS * 2);
        for level in 0..LEVELS {
            let l = level as f64;
            let depth = (50.0 - 10.0 * l).max(10.0) as u64;

            if !suppress_bid {
                let bid_price = mid * (1.0 - spread / 2.0) - l * spread;
                let order = Order::new(user_id.clone(), symbol, Side::Buy, bid_price.max(0.01), depth, true);
                if let Ok(result) = self.book.submit(order, true) {
                    new_ids.push(result.order_id);
                }
            }
            if !suppress_ask {
                let ask_price = mid * (1.0 + spread / 2.0) + l * spread;
                let order = Order::new(user_id.clone(), symbol, Side::Sell, ask_price, depth, true);
                if let Ok(result) = self.book.submit(order, true) {
                    new_ids.push(result.order_id);
                }
            }
        }
        bot.resting_order_ids = new_ids;
    }

    pub fn mid_price(&self, symbol: &str) -> Option<f64> {
        self.bots.lock().get(symbol).map(|b| b.mid_price)
    }

    pub fn inventory(&self, symbol: &str) -> Option<i64> {
        self.bots.lock().get(symbol).map(|b| b.inventory)
    }
}
