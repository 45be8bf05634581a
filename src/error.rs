//! Typed rejection/error surfaces for the simulation core.
//!
//! Each component boundary converts its internal failures into one of these
//! enums rather than letting a bare string or exception cross the boundary
//! (see the "tagged variants" redesign note).

use serde::Serialize;
use thiserror::Error;

/// Pre-trade rejection reasons produced by the risk gate (C4).
///
/// The ordering of the variants mirrors the order the checks run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RiskRejection {
    #[error("unknown instrument")]
    InvalidInstrument,
    #[error("order quantity exceeds the per-order cap")]
    OrderSizeExceeded,
    #[error("trailing one-minute volume for this symbol would exceed the cap")]
    RateLimitExceeded,
    #[error("opposite-side reversal within the guard window")]
    ReversalBlocked,
    #[error("resulting position would exceed the per-symbol cap")]
    PositionLimitExceeded,
}

impl RiskRejection {
    /// Machine-readable status string, as surfaced over HTTP.
    pub fn status(&self) -> &'static str {
        match self {
            RiskRejection::InvalidInstrument => "invalid_instrument",
            RiskRejection::OrderSizeExceeded => "order_size_exceeded",
            RiskRejection::RateLimitExceeded => "rate_limit_exceeded",
            RiskRejection::ReversalBlocked => "reversal_blocked",
            RiskRejection::PositionLimitExceeded => "position_limit_exceeded",
        }
    }
}

/// Errors the order book can report back to a caller.
///
/// Matching itself never fails on valid input; this only covers the
/// defensive case of a symbol the book has no side-queues for.
#[derive(Debug, Clone, Error)]
pub enum OrderBookError {
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

/// Top-level error taxonomy surfaced by the HTTP boundary (see SPEC_FULL.md's
/// `src/api.rs` glue and the original spec's error-handling section).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Risk(#[from] RiskRejection),
    #[error(transparent)]
    Book(#[from] OrderBookError),
    #[error("no resting liquidity on the opposite side")]
    NoLiquidity,
    #[error("order id not found among open orders")]
    CancelNotFound,
    #[error("missing or invalid user identity")]
    MissingUser,
    #[error("limit orders require price > 0")]
    InvalidPrice,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> &'static str {
        match self {
            ApiError::Risk(r) => r.status(),
            ApiError::Book(OrderBookError::UnknownSymbol(_)) => "invalid_instrument",
            ApiError::NoLiquidity => "no_liquidity",
            ApiError::CancelNotFound => "cancel_not_found",
            ApiError::MissingUser => "missing_user",
            ApiError::InvalidPrice => "invalid_price",
            ApiError::Internal(_) => "internal_error",
        }
    }
}
