//! C3 — central limit order book: per-symbol bid/ask priority queues,
//! price-time-priority matching, last-trade tracking, and clamp-based
//! outlier filtering for reported quotes.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::OrderBookError;
use crate::ledger::UserLedger;
use crate::models::{Fill, Order, OrderStatus, Side, SubmitResult, SubmitStatus};

/// Outlier-rejection multiplier applied to `|previous_mid - last_trade|`.
const CLAMP_K: f64 = 2.5;

/// A heap key for the bid side: higher price wins; on a tie, the order that
/// arrived first (lower `seq`) wins.
#[derive(Debug, Clone, Copy)]
struct BidKey {
    price: f64,
    seq: u64,
    order_id: Uuid,
}

impl PartialEq for BidKey {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price && self.seq == other.seq
    }
}
impl Eq for BidKey {}
impl PartialOrd for BidKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.price
            .partial_cmp(&other.price)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A heap key for the ask side: lower price wins; on a tie, earliest arrival wins.
#[derive(Debug, Clone, Copy)]
struct AskKey {
    price: f64,
    seq: u64,
    order_id: Uuid,
}

impl PartialEq for AskKey {
    fn eq(&self, other: &Self) -> bool {
        self.price == other.price && self.seq == other.seq
    }
}
impl Eq for AskKey {}
impl PartialOrd for AskKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for AskKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .price
            .partial_cmp(&self.price)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct SymbolBook {
    bids: BinaryHeap<BidKey>,
    asks: BinaryHeap<AskKey>,
    previous_mid: Option<f64>,
    last_traded_price: Option<f64>,
}

impl SymbolBook {
    fn new() -> Self {
        Self {
            bids: BinaryHeap::new(),
            asks: BinaryHeap::new(),
            previous_mid: None,
            last_traded_price: None,
        }
    }

    fn clamp_radius(&self) -> Option<f64> {
        let prev = self.previous_mid?;
        let last = self.last_traded_price?;
        Some((prev - last).abs() * CLAMP_K)
    }
}

/// Price-time-priority CLOB over a fixed set of symbols.
pub struct OrderBook {
    books: HashMap<String, Mutex<SymbolBook>>,
    orders: RwLock<HashMap<Uuid, Order>>,
    seq: AtomicU64,
    ledger: std::sync::Arc<UserLedger>,
}

impl OrderBook {
    pub fn new(symbols: impl IntoIterator<Item = String>, ledger: std::sync::Arc<UserLedger>) -> Self {
        Self {
            books: symbols
                .into_iter()
                .map(|s| (s, Mutex::new(SymbolBook::new())))
                .collect(),
            orders: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            ledger,
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Submits `order` to its symbol's book. `bypass_matching` is the
    /// "passive-bot order" flag from §4.1: such orders skip matching and
    /// rest unconditionally, even if crossing.
    pub fn submit(&self, mut order: Order, bypass_matching: bool) -> Result<SubmitResult, OrderBookError> {
        let Some(book_lock) = self.books.get(&order.symbol) else {
            return Err(OrderBookError::UnknownSymbol(order.symbol.clone()));
        };

        if order.remaining_quantity == 0 {
            order.status = OrderStatus::Open;
            return Ok(SubmitResult {
                order_id: order.id,
                status: SubmitStatus::Open,
                unfilled_qty: 0,
                avg_fill_price: 0.0,
                fills: Vec::new(),
            });
        }

        let mut book = book_lock.lock();

        if bypass_matching {
            self.rest(&mut book, order.clone());
            return Ok(SubmitResult {
                order_id: order.id,
                status: SubmitStatus::Open,
                unfilled_qty: order.remaining_quantity,
                avg_fill_price: 0.0,
                fills: Vec::new(),
            });
        }

        let mut fills = Vec::new();
        let mut filled_notional = 0.0;
        let mut filled_qty = 0u64;

        loop {
            if order.remaining_quantity == 0 {
                break;
            }
            let Some((resting_id, resting_price)) = self.peek_opposite(&mut book, order.side) else {
                break;
            };
            let compatible = match order.side {
                Side::Buy => resting_price <= order.price,
                Side::Sell => resting_price >= order.price,
            };
            if !compatible {
                break;
            }

            let mut orders = self.orders.write();
            let resting = orders.get_mut(&resting_id).expect("resting order must exist");
            let trade_qty = order.remaining_quantity.min(resting.remaining_quantity);
            let trade_price = resting.price; // passive-priced

            resting.remaining_quantity -= trade_qty;
            let resting_exhausted = resting.remaining_quantity == 0;
            resting.status = if resting_exhausted {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            let resting_user = resting.user_id.clone();
            drop(orders);

            order.remaining_quantity -= trade_qty;
            filled_qty += trade_qty;
            filled_notional += trade_qty as f64 * trade_price;

            let (buyer_id, seller_id) = match order.side {
                Side::Buy => (order.user_id.clone(), resting_user.clone()),
                Side::Sell => (resting_user.clone(), order.user_id.clone()),
            };
            let fill = Fill {
                symbol: order.symbol.clone(),
                price: trade_price,
                quantity: trade_qty,
                buyer_id,
                seller_id,
                timestamp: chrono::Utc::now(),
            };
            self.ledger.apply_fill(&fill);
            book.last_traded_price = Some(trade_price);
            fills.push(fill);

            // The resting order's heap entry is left untouched either way: it
            // was only peeked, never popped. A fully-filled resting order is
            // skipped and discarded by `peek_opposite`'s lazy eviction the
            // next time it is encountered.
            if resting_exhausted {
                self.ledger.open_order_remove(&resting_user, resting_id);
            }
        }

        let unfilled = order.remaining_quantity;
        order.status = if unfilled == 0 {
            OrderStatus::Filled
        } else if filled_qty > 0 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };

        if unfilled > 0 {
            self.rest(&mut book, order.clone());
        } else {
            self.orders.write().insert(order.id, order.clone());
        }

        let avg_fill_price = if filled_qty > 0 {
            filled_notional / filled_qty as f64
        } else {
            0.0
        };

        Ok(SubmitResult {
            order_id: order.id,
            status: match order.status {
                OrderStatus::Filled => SubmitStatus::Filled,
                OrderStatus::PartiallyFilled => SubmitStatus::PartiallyFilled,
                _ => SubmitStatus::Open,
            },
            unfilled_qty: unfilled,
            avg_fill_price,
            fills,
        })
    }

    fn rest(&self, book: &mut SymbolBook, order: Order) {
        self.push_key(book, order.side, order.price, order.id);
        self.ledger.open_order_insert(&order.user_id, order.id);
        self.orders.write().insert(order.id, order);
    }

    fn push_key(&self, book: &mut SymbolBook, side: Side, price: f64, order_id: Uuid) {
        let seq = self.next_seq();
        match side {
            Side::Buy => book.bids.push(BidKey { price, seq, order_id }),
            Side::Sell => book.asks.push(AskKey { price, seq, order_id }),
        }
    }

    /// Pops and discards stale heap entries (cancelled/filled orders) until
    /// a live one is found, re-pushing it so the heap is unchanged other
    /// than evicting the stale entries (lazy eviction, §4.1).
    fn peek_opposite(&self, book: &mut SymbolBook, taker_side: Side) -> Option<(Uuid, f64)> {
        let orders = self.orders.read();
        match taker_side {
            Side::Buy => loop {
                let top = book.asks.peek().copied()?;
                match orders.get(&top.order_id) {
                    Some(o) if o.status.is_active() && o.remaining_quantity > 0 => {
                        return Some((top.order_id, top.price));
                    }
                    _ => {
                        book.asks.pop();
                    }
                }
            },
            Side::Sell => loop {
                let top = book.bids.peek().copied()?;
                match orders.get(&top.order_id) {
                    Some(o) if o.status.is_active() && o.remaining_quantity > 0 => {
                        return Some((top.order_id, top.price));
                    }
                    _ => {
                        book.bids.pop();
                    }
                }
            },
        }
    }

    /// Cancels an order. Returns `false` if the id is unknown, already
    /// cancelled, or already fully filled.
    pub fn cancel(&self, order_id: Uuid) -> bool {
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(&order_id) else {
            return false;
        };
        if !order.status.is_active() {
            return false;
        }
        order.status = OrderStatus::Cancelled;
        let user_id = order.user_id.clone();
        drop(orders);
        self.ledger.open_order_remove(&user_id, order_id);
        true
    }

    /// True best bid/ask used for matching — never clamp-restricted.
    fn true_top(&self, heap_side: Side, symbol: &str) -> Option<f64> {
        let book_lock = self.books.get(symbol)?;
        let mut book = book_lock.lock();
        match heap_side {
            Side::Buy => {
                // live top of bids
                loop {
                    let top = book.bids.peek().copied()?;
                    let orders = self.orders.read();
                    match orders.get(&top.order_id) {
                        Some(o) if o.status.is_active() && o.remaining_quantity > 0 => {
                            return Some(top.price);
                        }
                        _ => {
                            drop(orders);
                            book.bids.pop();
                        }
                    }
                }
            }
            Side::Sell => loop {
                let top = book.asks.peek().copied()?;
                let orders = self.orders.read();
                match orders.get(&top.order_id) {
                    Some(o) if o.status.is_active() && o.remaining_quantity > 0 => {
                        return Some(top.price);
                    }
                    _ => {
                        drop(orders);
                        book.asks.pop();
                    }
                }
            },
        }
    }

    pub fn best_bid(&self, symbol: &str) -> Option<f64> {
        self.true_top(Side::Buy, symbol)
    }

    pub fn best_ask(&self, symbol: &str) -> Option<f64> {
        self.true_top(Side::Sell, symbol)
    }

    /// Every live `(price, remaining_quantity)` on `side`, in priority order
    /// (best first). Used for clamp filtering and depth snapshots; does not
    /// mutate the real heap beyond the lazy eviction `true_top` already
    /// performs.
    fn live_levels(&self, symbol: &str, side: Side) -> Vec<(f64, u64)> {
        let Some(book_lock) = self.books.get(symbol) else {
            return Vec::new();
        };
        let book = book_lock.lock();
        let orders = self.orders.read();
        let mut out = Vec::new();
        match side {
            Side::Buy => {
                let mut heap = book.bids.clone();
                while let Some(top) = heap.pop() {
                    if let Some(o) = orders.get(&top.order_id) {
                        if o.status.is_active() && o.remaining_quantity > 0 {
                            out.push((top.price, o.remaining_quantity));
                        }
                    }
                }
            }
            Side::Sell => {
                let mut heap = book.asks.clone();
                while let Some(top) = heap.pop() {
                    if let Some(o) = orders.get(&top.order_id) {
                        if o.status.is_active() && o.remaining_quantity > 0 {
                            out.push((top.price, o.remaining_quantity));
                        }
                    }
                }
            }
        }
        out
    }

    fn live_prices(&self, symbol: &str, side: Side) -> Vec<f64> {
        self.live_levels(symbol, side).into_iter().map(|(p, _)| p).collect()
    }

    /// Clamp-restricted best bid/ask: "the highest bid whose price <=
    /// previous_mid + clamp_radius" / "the lowest ask whose price >=
    /// previous_mid - clamp_radius" (§4.1). A no-op (returns the true best)
    /// when the clamp references are unset.
    fn clamp_restricted_best(&self, symbol: &str) -> (Option<f64>, Option<f64>) {
        let Some(book_lock) = self.books.get(symbol) else {
            return (None, None);
        };
        let (previous_mid, radius) = {
            let book = book_lock.lock();
            (book.previous_mid, book.clamp_radius())
        };
        let Some(radius) = radius else {
            return (self.best_bid(symbol), self.best_ask(symbol));
        };
        let prev = previous_mid.expect("radius implies previous_mid is set");

        let bid = self
            .live_prices(symbol, Side::Buy)
            .into_iter()
            .find(|p| *p <= prev + radius);
        let ask = self
            .live_prices(symbol, Side::Sell)
            .into_iter()
            .find(|p| *p >= prev - radius);
        (bid, ask)
    }

    /// Clamp-restricted spread: `best_ask_within_clamp - best_bid_within_clamp`
    /// (§4.7), or `None` when either side is unavailable. Read-only — unlike
    /// `mid`, does not advance `previous_mid`.
    pub fn clamp_spread(&self, symbol: &str) -> Option<f64> {
        let (bid, ask) = self.clamp_restricted_best(symbol);
        match (bid, ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        }
    }

    /// Midpoint of the clamp-restricted best bid/ask; updates
    /// `previous_mid` for the next tick's clamp reference (§4.1).
    pub fn mid(&self, symbol: &str) -> Option<f64> {
        let (bid, ask) = self.clamp_restricted_best(symbol);
        let mid = match (bid, ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        };
        if let Some(book_lock) = self.books.get(symbol) {
            if let Some(m) = mid {
                book_lock.lock().previous_mid = Some(m);
            }
        }
        mid
    }

    pub fn last_traded_price(&self, symbol: &str) -> Option<f64> {
        self.books.get(symbol).and_then(|b| b.lock().last_traded_price)
    }

    /// Clamp-restricted top-of-book ladders, aggregated by price level, up
    /// to `depth` levels per side (HTTP boundary caps `depth` at 20, §6).
    pub fn snapshot(&self, symbol: &str, depth: usize) -> (Vec<(f64, u64)>, Vec<(f64, u64)>) {
        let (clamp_bid, clamp_ask) = self.clamp_restricted_best(symbol);

        let aggregate = |entries: Vec<(f64, u64)>, bound: Option<f64>, keep: fn(f64, f64) -> bool| {
            let mut levels: Vec<(f64, u64)> = Vec::new();
            for (price, qty) in entries {
                if let Some(bound) = bound {
                    if !keep(price, bound) {
                        continue;
                    }
                }
                match levels.last_mut() {
                    Some(last) if (last.0 - price).abs() < f64::EPSILON => last.1 += qty,
                    _ => {
                        if levels.len() >= depth {
                            break;
                        }
                        levels.push((price, qty));
                    }
                }
            }
            levels
        };

        let bids = aggregate(self.live_levels(symbol, Side::Buy), clamp_bid, |p, bound| p <= bound);
        let asks = aggregate(self.live_levels(symbol, Side::Sell), clamp_ask, |p, bound| p >= bound);
        (bids, asks)
    }

    pub fn open_orders_for(&self, user_id: &str) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn order(&self, order_id: Uuid) -> Option<Order> {
        self.orders.read().get(&order_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn book() -> OrderBook {
        OrderBook::new(vec!["AAPL".to_string()], Arc::new(UserLedger::new()))
    }

    #[test]
    fn crossing_resting_order_partially_fills_scenario_1() {
        let b = book();
        b.submit(Order::new("mm", "AAPL", Side::Sell, 102.0, 8, false), false)
            .unwrap();
        let res = b
            .submit(Order::new("alice", "AAPL", Side::Buy, 103.0, 15, false), false)
            .unwrap();
        assert_eq!(res.status, SubmitStatus::PartiallyFilled);
        assert_eq!(res.unfilled_qty, 7);
        assert_eq!(res.avg_fill_price, 102.0);
        assert!(b.best_ask("AAPL").is_none());
        assert_eq!(b.best_bid("AAPL"), Some(103.0));
    }

    #[test]
    fn full_fill_at_resting_limit_scenario_2() {
        let b = book();
        b.submit(Order::new("mm", "AAPL", Side::Sell, 102.0, 8, false), false)
            .unwrap();
        let res = b
            .submit(Order::new("alice", "AAPL", Side::Buy, 103.0, 5, false), false)
            .unwrap();
        assert_eq!(res.status, SubmitStatus::Filled);
        assert_eq!(res.unfilled_qty, 0);
        assert_eq!(res.avg_fill_price, 102.0);
        assert_eq!(b.best_ask("AAPL"), Some(102.0));
    }

    #[test]
    fn zero_quantity_submit_is_a_noop() {
        let b = book();
        let res = b
            .submit(Order::new("alice", "AAPL", Side::Buy, 100.0, 0, false), false)
            .unwrap();
        assert_eq!(res.status, SubmitStatus::Open);
        assert_eq!(res.unfilled_qty, 0);
        assert_eq!(res.avg_fill_price, 0.0);
        assert!(b.best_bid("AAPL").is_none());
    }

    #[test]
    fn submit_then_cancel_then_cancel_again() {
        let b = book();
        let res = b
            .submit(Order::new("alice", "AAPL", Side::Buy, 100.0, 10, false), false)
            .unwrap();
        assert!(b.cancel(res.order_id));
        assert!(!b.cancel(res.order_id));
        assert!(b.best_bid("AAPL").is_none());
    }

    #[test]
    fn cancel_unknown_id_returns_false() {
        let b = book();
        assert!(!b.cancel(Uuid::new_v4()));
    }

    #[test]
    fn bot_quote_bypasses_matching_even_when_crossing() {
        let b = book();
        b.submit(Order::new("bot:AAPL", "AAPL", Side::Sell, 100.0, 10, false), false)
            .unwrap();
        // A bypassing bid above the ask would normally cross and fill.
        let res = b
            .submit(Order::new("bot:AAPL", "AAPL", Side::Buy, 105.0, 5, true), true)
            .unwrap();
        assert_eq!(res.status, SubmitStatus::Open);
        assert_eq!(b.best_ask("AAPL"), Some(100.0));
        assert_eq!(b.best_bid("AAPL"), Some(105.0));
    }

    #[test]
    fn clamp_is_noop_until_both_references_set() {
        let b = book();
        assert!(b.mid("AAPL").is_none());
        b.submit(Order::new("mm", "AAPL", Side::Buy, 99.0, 5, false), false)
            .unwrap();
        b.submit(Order::new("mm", "AAPL", Side::Sell, 101.0, 5, false), false)
            .unwrap();
        // Both sides present but no trade yet -> last_traded_price unset -> clamp no-op.
        assert_eq!(b.mid("AAPL"), Some(100.0));
    }

    #[test]
    fn price_time_priority_is_fifo_on_ties() {
        let b = book();
        let first = b
            .submit(Order::new("a", "AAPL", Side::Buy, 100.0, 5, false), false)
            .unwrap();
        let _second = b
            .submit(Order::new("b", "AAPL", Side::Buy, 100.0, 5, false), false)
            .unwrap();
        // A matching sell for 5 should fill the earliest bid in full.
        let sell = b
            .submit(Order::new("c", "AAPL", Side::Sell, 100.0, 5, false), false)
            .unwrap();
        assert_eq!(sell.fills.len(), 1);
        assert_eq!(sell.fills[0].buyer_id, "a");
        let first_order = b.order(first.order_id).unwrap();
        assert_eq!(first_order.status, OrderStatus::Filled);
    }
}
