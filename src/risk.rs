//! C4 — risk gate: ordered pre-trade checks run against an incoming order
//! before it reaches the order book.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RiskRejection;
use crate::ledger::UserLedger;
use crate::models::Side;
use crate::registry::Registry;

const MAX_ORDER_SIZE: u64 = 500;
const MAX_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MAX_RATE_LIMIT_VOLUME: u64 = 1_000;
const REVERSAL_WINDOW: Duration = Duration::from_secs(30);
const REVERSAL_MIN_QUANTITY: u64 = 100;
const MAX_POSITION: i64 = 5_000;

/// Runs the five ordered pre-trade checks from §4.3. The first failing check
/// short-circuits the rest.
pub struct RiskGate {
    registry: Arc<Registry>,
    ledger: Arc<UserLedger>,
}

impl RiskGate {
    pub fn new(registry: Arc<Registry>, ledger: Arc<UserLedger>) -> Self {
        Self { registry, ledger }
    }

    /// Evaluates whether `user_id` may submit `side quantity` of `symbol`.
    /// Does not record the attempt; callers record it regardless of outcome
    /// (§4.3: rate-limiting and the reversal guard both window over attempts,
    /// not just approvals).
    pub fn check(&self, user_id: &str, symbol: &str, side: Side, quantity: u64) -> Result<(), RiskRejection> {
        if !self.registry.contains_symbol(symbol) {
            return Err(RiskRejection::InvalidInstrument);
        }

        if quantity > MAX_ORDER_SIZE {
            return Err(RiskRejection::OrderSizeExceeded);
        }

        let recent = self.ledger.recent_volume(user_id, symbol, MAX_RATE_LIMIT_WINDOW);
        if recent + quantity > MAX_RATE_LIMIT_VOLUME {
            return Err(RiskRejection::RateLimitExceeded);
        }

        if let Some(last) = self.ledger.last_attempt_within(user_id, symbol, REVERSAL_WINDOW) {
            if last.side == side.opposite() && last.quantity >= REVERSAL_MIN_QUANTITY {
                return Err(RiskRejection::ReversalBlocked);
            }
        }

        let current = self.ledger.position(user_id, symbol);
        let resulting = current + side.sign() * quantity as i64;
        if resulting.abs() > MAX_POSITION {
            return Err(RiskRejection::PositionLimitExceeded);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Instrument;

    fn gate() -> RiskGate {
        let registry = Arc::new(Registry::new(
            vec![Instrument {
                id: "AAPL".into(),
                display_name: "Apple".into(),
                s0: 100.0,
                mean: 0.05,
                variance: 0.04,
            }],
            vec![],
            vec![],
        ));
        RiskGate::new(registry, Arc::new(UserLedger::new()))
    }

    #[test]
    fn unknown_symbol_is_invalid_instrument() {
        let g = gate();
        assert_eq!(
            g.check("alice", "MSFT", Side::Buy, 10).unwrap_err(),
            RiskRejection::InvalidInstrument
        );
    }

    #[test]
    fn oversized_order_is_rejected_scenario_4() {
        let g = gate();
        assert_eq!(
            g.check("alice", "AAPL", Side::Buy, 501).unwrap_err(),
            RiskRejection::OrderSizeExceeded
        );
    }

    #[test]
    fn at_cap_order_size_is_allowed() {
        let g = gate();
        assert!(g.check("alice", "AAPL", Side::Buy, 500).is_ok());
    }

    #[test]
    fn rate_limit_trips_when_trailing_volume_would_exceed_cap() {
        let g = gate();
        g.ledger.record_attempt("alice", "AAPL", Side::Buy, 500);
        g.ledger.record_attempt("alice", "AAPL", Side::Buy, 500);
        assert_eq!(
            g.check("alice", "AAPL", Side::Buy, 1).unwrap_err(),
            RiskRejection::RateLimitExceeded
        );
        assert!(g.check("alice", "AAPL", Side::Buy, 0).is_ok());
    }

    #[test]
    fn reversal_guard_blocks_opposite_side_within_window() {
        let g = gate();
        g.ledger.record_attempt("alice", "AAPL", Side::Buy, 200);
        assert_eq!(
            g.check("alice", "AAPL", Side::Sell, 150).unwrap_err(),
            RiskRejection::ReversalBlocked
        );
    }

    #[test]
    fn reversal_guard_ignores_small_prior_attempts() {
        let g = gate();
        g.ledger.record_attempt("alice", "AAPL", Side::Buy, 50);
        assert!(g.check("alice", "AAPL", Side::Sell, 50).is_ok());
    }

    #[test]
    fn reversal_guard_ignores_same_side_attempts() {
        let g = gate();
        g.ledger.record_attempt("alice", "AAPL", Side::Buy, 200);
        assert!(g.check("alice", "AAPL", Side::Buy, 50).is_ok());
    }

    #[test]
    fn position_limit_blocks_resulting_position_beyond_cap() {
        let g = gate();
        let fill = crate::models::Fill {
            symbol: "AAPL".into(),
            price: 100.0,
            quantity: 4_900,
            buyer_id: "alice".into(),
            seller_id: "mm".into(),
            timestamp: chrono::Utc::now(),
        };
        g.ledger.apply_fill(&fill);
        assert_eq!(
            g.check("alice", "AAPL", Side::Buy, 200).unwrap_err(),
            RiskRejection::PositionLimitExceeded
        );
        assert!(g.check("alice", "AAPL", Side::Buy, 100).is_ok());
    }
}
