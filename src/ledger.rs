//! C2 — user ledger: per-user cash, FIFO lots, realized P&L, and the trade
//! history the risk gate (C4) windows over.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::models::{Fill, Side};

/// Starting cash for every user, created lazily on first observation (§4.2).
pub const STARTING_CASH: f64 = 500_000.0;

/// One contiguous quantity of a symbol acquired at a single price.
/// Positive `quantity` is a long lot, negative is a short lot.
#[derive(Debug, Clone, Copy)]
pub struct Lot {
    pub quantity: i64,
    pub entry_price: f64,
}

/// A single attempted (not necessarily filled) order, used for rate-limiting
/// and the reversal guard. Recorded in real wall-clock time per §4.3.
#[derive(Debug, Clone, Copy)]
pub struct TradeAttempt {
    pub side: Side,
    pub quantity: u64,
    pub at: Instant,
}

#[derive(Debug, Default)]
pub struct UserState {
    pub cash: f64,
    pub portfolio: HashMap<String, VecDeque<Lot>>,
    pub realized_pnl: f64,
    pub trade_history: HashMap<String, Vec<TradeAttempt>>,
    pub open_orders: HashSet<Uuid>,
}

impl UserState {
    fn new() -> Self {
        Self {
            cash: STARTING_CASH,
            ..Default::default()
        }
    }

    fn position(&self, symbol: &str) -> i64 {
        self.portfolio
            .get(symbol)
            .map(|lots| lots.iter().map(|l| l.quantity).sum())
            .unwrap_or(0)
    }

    /// Applies a buy or sell of `qty` at `price` to this user's lots on
    /// `symbol`, closing opposite-signed lots FIFO first (§4.2).
    fn apply(&mut self, symbol: &str, side: Side, qty: u64, price: f64) {
        let lots = self.portfolio.entry(symbol.to_string()).or_default();
        let mut remaining = qty as i64;

        // Opposite-signed lots to close FIFO: a buy closes short lots, a sell closes long lots.
        let closes_short = matches!(side, Side::Buy);
        while remaining > 0 {
            let Some(front) = lots.front_mut() else {
                break;
            };
            let is_short = front.quantity < 0;
            if is_short != closes_short {
                break;
            }
            let available = front.quantity.unsigned_abs() as i64;
            let closing = remaining.min(available);

            let realized = if closes_short {
                (front.entry_price - price) * closing as f64
            } else {
                (price - front.entry_price) * closing as f64
            };
            self.realized_pnl += realized;

            if closes_short {
                front.quantity += closing; // moves toward zero
            } else {
                front.quantity -= closing;
            }
            remaining -= closing;
            if front.quantity == 0 {
                lots.pop_front();
            }
        }

        if remaining > 0 {
            let signed = remaining * side.sign();
            lots.push_back(Lot {
                quantity: signed,
                entry_price: price,
            });
        }

        match side {
            Side::Buy => self.cash -= qty as f64 * price,
            Side::Sell => self.cash += qty as f64 * price,
        }
    }

    fn unrealized_pnl(&self, marks: &HashMap<String, f64>) -> f64 {
        self.portfolio
            .iter()
            .flat_map(|(symbol, lots)| {
                let mark = marks.get(symbol).copied();
                lots.iter().filter_map(move |lot| {
                    let m = mark?;
                    Some(if lot.quantity >= 0 {
                        (m - lot.entry_price) * lot.quantity as f64
                    } else {
                        (lot.entry_price - m) * lot.quantity.unsigned_abs() as f64
                    })
                })
            })
            .sum()
    }

    fn market_value(&self, marks: &HashMap<String, f64>) -> f64 {
        self.portfolio
            .iter()
            .flat_map(|(symbol, lots)| {
                let mark = marks.get(symbol).copied();
                lots.iter().filter_map(move |lot| {
                    let m = mark?;
                    Some(m * lot.quantity as f64)
                })
            })
            .sum()
    }
}

/// Owns every user's ledger behind a single coarse lock. Reads and writes
/// both take the lock so a fill's effect on buyer and seller cash/lots is
/// applied atomically in one critical section (§5 "A fill applied to both
/// sides' UserStates is atomic").
pub struct UserLedger {
    users: parking_lot::RwLock<HashMap<String, UserState>>,
}

impl Default for UserLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLedger {
    pub fn new() -> Self {
        Self {
            users: parking_lot::RwLock::new(HashMap::new()),
        }
    }

    /// Applies one fill to both the buyer's and the seller's state in a
    /// single critical section.
    pub fn apply_fill(&self, fill: &Fill) {
        let mut users = self.users.write();
        users
            .entry(fill.buyer_id.clone())
            .or_insert_with(UserState::new)
            .apply(&fill.symbol, Side::Buy, fill.quantity, fill.price);
        users
            .entry(fill.seller_id.clone())
            .or_insert_with(UserState::new)
            .apply(&fill.symbol, Side::Sell, fill.quantity, fill.price);
    }

    pub fn position(&self, user_id: &str, symbol: &str) -> i64 {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.position(symbol))
            .unwrap_or(0)
    }

    pub fn realized_pnl(&self, user_id: &str) -> f64 {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.realized_pnl)
            .unwrap_or(0.0)
    }

    pub fn unrealized_pnl(&self, user_id: &str, marks: &HashMap<String, f64>) -> f64 {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.unrealized_pnl(marks))
            .unwrap_or(0.0)
    }

    pub fn market_value(&self, user_id: &str, marks: &HashMap<String, f64>) -> f64 {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.market_value(marks))
            .unwrap_or(0.0)
    }

    pub fn cash(&self, user_id: &str) -> f64 {
        self.users
            .read()
            .get(user_id)
            .map(|u| u.cash)
            .unwrap_or(STARTING_CASH)
    }

    pub fn positions(&self, user_id: &str) -> HashMap<String, i64> {
        self.users
            .read()
            .get(user_id)
            .map(|u| {
                u.portfolio
                    .iter()
                    .map(|(s, lots)| (s.clone(), lots.iter().map(|l| l.quantity).sum()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records an *attempted* order (not necessarily filled) for rate-limit
    /// and reversal-guard windowing. Intent: rate-limit attempted flow, not
    /// filled flow (§4.3).
    pub fn record_attempt(&self, user_id: &str, symbol: &str, side: Side, quantity: u64) {
        let mut users = self.users.write();
        let user = users.entry(user_id.to_string()).or_insert_with(UserState::new);
        user.trade_history
            .entry(symbol.to_string())
            .or_default()
            .push(TradeAttempt {
                side,
                quantity,
                at: Instant::now(),
            });
    }

    pub fn open_order_insert(&self, user_id: &str, order_id: Uuid) {
        let mut users = self.users.write();
        users
            .entry(user_id.to_string())
            .or_insert_with(UserState::new)
            .open_orders
            .insert(order_id);
    }

    pub fn open_order_remove(&self, user_id: &str, order_id: Uuid) {
        if let Some(user) = self.users.write().get_mut(user_id) {
            user.open_orders.remove(&order_id);
        }
    }

    /// Sum of attempted quantities on `symbol` within the trailing `window`
    /// of real time.
    pub fn recent_volume(&self, user_id: &str, symbol: &str, window: Duration) -> u64 {
        let now = Instant::now();
        self.users
            .read()
            .get(user_id)
            .and_then(|u| u.trade_history.get(symbol))
            .map(|attempts| {
                attempts
                    .iter()
                    .filter(|a| now.duration_since(a.at) <= window)
                    .map(|a| a.quantity)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Most recent attempt on `symbol` within `window`, for the reversal guard.
    pub fn last_attempt_within(
        &self,
        user_id: &str,
        symbol: &str,
        window: Duration,
    ) -> Option<TradeAttempt> {
        let now = Instant::now();
        self.users
            .read()
            .get(user_id)?
            .trade_history
            .get(symbol)?
            .iter()
            .filter(|a| now.duration_since(a.at) <= window)
            .max_by_key(|a| a.at)
            .copied()
    }

    /// `cash + sum(lot.qty * lot.entry_price) + realized_pnl`, which should
    /// equal `STARTING_CASH` for a user who has only traded against
    /// non-bot/non-generator counterparties (§8 conservation property).
    pub fn accounting_identity(&self, user_id: &str) -> f64 {
        let users = self.users.read();
        let Some(u) = users.get(user_id) else {
            return STARTING_CASH;
        };
        let cost_basis: f64 = u
            .portfolio
            .values()
            .flat_map(|lots| lots.iter())
            .map(|lot| lot.quantity as f64 * lot.entry_price)
            .sum();
        u.cash + cost_basis + u.realized_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_user_starts_with_default_cash() {
        let ledger = UserLedger::new();
        assert_eq!(ledger.cash("alice"), STARTING_CASH);
        assert_eq!(ledger.position("alice", "AAPL"), 0);
    }

    fn fill(buyer: &str, seller: &str, symbol: &str, qty: u64, price: f64) -> Fill {
        Fill {
            symbol: symbol.to_string(),
            price,
            quantity: qty,
            buyer_id: buyer.to_string(),
            seller_id: seller.to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn buy_then_sell_round_trip_preserves_identity() {
        let ledger = UserLedger::new();
        ledger.apply_fill(&fill("alice", "mm", "AAPL", 10, 100.0));
        ledger.apply_fill(&fill("mm", "alice", "AAPL", 10, 110.0));
        assert_eq!(ledger.position("alice", "AAPL"), 0);
        assert_eq!(ledger.realized_pnl("alice"), 100.0);
        assert!((ledger.accounting_identity("alice") - STARTING_CASH).abs() < 1e-9);
    }

    #[test]
    fn fifo_short_close_on_buy_matches_scenario_3() {
        // User holds lots [(-10, 100)] on X; spec §8 scenario 3.
        let ledger = UserLedger::new();
        ledger.apply_fill(&fill("mm", "bob", "X", 10, 100.0)); // bob sells 10 -> short lot (-10, 100)
        assert_eq!(ledger.position("bob", "X"), -10);

        ledger.apply_fill(&fill("bob", "mm", "X", 6, 90.0)); // bob buys 6 @ 90
        assert_eq!(ledger.position("bob", "X"), -4);
        assert_eq!(ledger.realized_pnl("bob"), 60.0);
    }

    #[test]
    fn unrealized_pnl_long_and_short() {
        let ledger = UserLedger::new();
        ledger.apply_fill(&fill("alice", "mm", "X", 10, 100.0)); // alice long 10 @ 100
        ledger.apply_fill(&fill("mm", "bob", "X", 5, 100.0)); // bob short 5 @ 100

        let mut marks = HashMap::new();
        marks.insert("X".to_string(), 110.0);
        assert_eq!(ledger.unrealized_pnl("alice", &marks), 100.0);
        assert_eq!(ledger.unrealized_pnl("bob", &marks), -50.0);
    }

    #[test]
    fn recent_volume_windows_by_real_time() {
        let ledger = UserLedger::new();
        ledger.record_attempt("alice", "X", Side::Buy, 50);
        assert_eq!(ledger.recent_volume("alice", "X", Duration::from_secs(60)), 50);
        assert_eq!(
            ledger.recent_volume("alice", "X", Duration::from_millis(0)),
            0
        );
    }
}
