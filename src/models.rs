//! Shared wire/domain types used across the simulation core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Buy or sell, used on both resting and incoming orders and on fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign applied to a quantity to get a signed position delta.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order type accepted at the HTTP boundary; the core order book only ever
/// sees limit orders (`POST /orders` translates market orders per §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Lifecycle status of an order, tracked in the central order map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Whether an order with this status can still rest in / match against the book.
    pub fn is_active(self) -> bool {
        matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
    }
}

/// Reserved user id used by the order generator (C8) for its reference-price orders.
pub const GENERATOR_USER_ID: &str = "generator";

/// Reserved user id prefix used by market-making bots (C7), one per symbol.
pub fn bot_user_id(symbol: &str) -> String {
    format!("bot:{symbol}")
}

/// A resting or historical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub remaining_quantity: u64,
    pub original_quantity: u64,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    /// Set for market-making quotes: skips matching and rests unconditionally (§4.1).
    pub is_bot_quote: bool,
}

impl Order {
    pub fn new(
        user_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        price: f64,
        quantity: u64,
        is_bot_quote: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            symbol: symbol.into(),
            side,
            price,
            remaining_quantity: quantity,
            original_quantity: quantity,
            created_at: Utc::now(),
            status: OrderStatus::Open,
            is_bot_quote,
        }
    }
}

/// A single match between a taker and a resting order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub price: f64,
    pub quantity: u64,
    pub buyer_id: String,
    pub seller_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Status returned from `OrderBook::submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    Filled,
    PartiallyFilled,
    Open,
}

/// Result of submitting an order to the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    pub order_id: Uuid,
    pub status: SubmitStatus,
    pub unfilled_qty: u64,
    pub avg_fill_price: f64,
    pub fills: Vec<Fill>,
}

/// Immutable catalog entry for a tradable synthetic instrument (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: String,
    pub display_name: String,
    pub s0: f64,
    pub mean: f64,
    pub variance: f64,
}

/// A macroeconomic factor news events project onto instruments through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroFactor {
    pub id: String,
    pub cap_up: f64,
    pub cap_down: f64,
}

/// A scheduled or ad-hoc macro news event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsEvent {
    pub id: i64,
    pub headline: String,
    pub description: String,
    pub ts_release_ms: i64,
    pub decay_halflife_s: f64,
    pub magnitude_top: f64,
    pub magnitude_bottom: f64,
    /// Factors this event touches (normalizes the news<->factor many-to-many
    /// edge onto the event itself; see DESIGN.md).
    pub factors: Vec<String>,
}

impl NewsEvent {
    /// `M` in the decay formula: the mean of the magnitude range.
    pub fn magnitude(&self) -> f64 {
        (self.magnitude_top + self.magnitude_bottom) / 2.0
    }

    /// `h` in the decay formula, with the `h <= 0` guard from §4.4.
    pub fn halflife_s(&self) -> f64 {
        if self.decay_halflife_s <= 0.0 {
            1.0
        } else {
            self.decay_halflife_s
        }
    }

    pub fn bucket(&self) -> i64 {
        self.ts_release_ms.div_euclid(100_000)
    }
}
