//! HTTP + WebSocket boundary around the simulation core (§6). Authentication
//! is out of scope for the core; the caller's identity arrives as an
//! `X-User-Id` header, standing in for the external identity service.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bots::BotManager;
use crate::error::ApiError;
use crate::ledger::UserLedger;
use crate::models::{Instrument, NewsEvent, Order, OrderType, Side};
use crate::news::NewsEngine;
use crate::orchestrator::TickOrchestrator;
use crate::orderbook::OrderBook;
use crate::risk::RiskGate;

const MAX_SNAPSHOT_DEPTH: usize = 20;
const MARKET_ORDER_BUY_MULTIPLIER: f64 = 10.0;
const MARKET_ORDER_SELL_MULTIPLIER: f64 = 0.1;
const DEFAULT_USER_ID: &str = "demo-user";

#[derive(Clone)]
pub struct AppState {
    pub book: Arc<OrderBook>,
    pub ledger: Arc<UserLedger>,
    pub risk: Arc<RiskGate>,
    pub news: Arc<NewsEngine>,
    pub bots: Arc<BotManager>,
    pub instruments: Arc<Vec<Instrument>>,
    pub orchestrator: Arc<TickOrchestrator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(submit_order).get(list_orders))
        .route("/orders/:order_id", axum::routing::delete(cancel_order))
        .route("/orderbook/:symbol", get(get_orderbook))
        .route("/portfolio", get(get_portfolio))
        .route("/admin/news", post(inject_news))
        .route("/news/status", get(news_status))
        .route("/news/all", get(news_all))
        .route("/news/candidates", get(news_candidates))
        .route("/news/active", get(news_active))
        .route("/ws/market", get(websocket_handler))
        .with_state(state)
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    match headers.get("x-user-id").and_then(|v| v.to_str().ok()) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        Some(_) => Err(ApiError::MissingUser),
        None => Ok(DEFAULT_USER_ID.to_string()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = Json(serde_json::json!({
            "status": self.status(),
            "message": self.to_string(),
        }));
        (code, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct SubmitOrderRequest {
    symbol: String,
    quantity: u64,
    side: Side,
    order_type: OrderType,
    price: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SubmitOrderResponse {
    order_id: uuid::Uuid,
    status: crate::models::SubmitStatus,
    execution_price: f64,
    unprocessed_quantity: u64,
}

/// `POST /orders`. Market orders are translated into a very aggressive limit
/// before reaching the risk gate (§6, flagged as a rewrite candidate in §9).
async fn submit_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, ApiError> {
    let user_id = user_id(&headers)?;

    let price = match req.order_type {
        OrderType::Limit => {
            let price = req.price.ok_or(ApiError::InvalidPrice)?;
            if price <= 0.0 {
                return Err(ApiError::InvalidPrice);
            }
            price
        }
        OrderType::Market => match req.side {
            Side::Buy => {
                let ask = state.book.best_ask(&req.symbol).ok_or(ApiError::NoLiquidity)?;
                ask * MARKET_ORDER_BUY_MULTIPLIER
            }
            Side::Sell => {
                let bid = state.book.best_bid(&req.symbol).ok_or(ApiError::NoLiquidity)?;
                bid * MARKET_ORDER_SELL_MULTIPLIER
            }
        },
    };

    state.risk.check(&user_id, &req.symbol, req.side, req.quantity)?;

    let order = Order::new(user_id.clone(), req.symbol.clone(), req.side, price, req.quantity, false);
    let result = state.book.submit(order, false)?;

    state.ledger.record_attempt(&user_id, &req.symbol, req.side, req.quantity);

    Ok(Json(SubmitOrderResponse {
        order_id: result.order_id,
        status: result.status,
        execution_price: result.avg_fill_price,
        unprocessed_quantity: result.unfilled_qty,
    }))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<uuid::Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.book.cancel(order_id) {
        Ok(Json(serde_json::json!({"cancelled": true})))
    } else {
        Err(ApiError::CancelNotFound)
    }
}

async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = user_id(&headers)?;
    Ok(Json(state.book.open_orders_for(&user_id)))
}

#[derive(Debug, Deserialize)]
struct DepthQuery {
    depth: Option<usize>,
}

#[derive(Debug, Serialize)]
struct OrderbookResponse {
    symbol: String,
    bids: Vec<(f64, u64)>,
    asks: Vec<(f64, u64)>,
}

/// `GET /orderbook/{symbol}?depth=`, capped at `MAX_SNAPSHOT_DEPTH` (§6).
async fn get_orderbook(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Json<OrderbookResponse> {
    let depth = query.depth.unwrap_or(MAX_SNAPSHOT_DEPTH).min(MAX_SNAPSHOT_DEPTH);
    let (bids, asks) = state.book.snapshot(&symbol, depth);
    Json(OrderbookResponse { symbol, bids, asks })
}

#[derive(Debug, Serialize)]
struct PortfolioResponse {
    cash: f64,
    positions: std::collections::HashMap<String, i64>,
    realized_pnl: f64,
    unrealized_pnl: f64,
}

async fn get_portfolio(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PortfolioResponse>, ApiError> {
    let user_id = user_id(&headers)?;
    let marks: std::collections::HashMap<String, f64> = state
        .instruments
        .iter()
        .filter_map(|i| state.book.mid(&i.id).map(|m| (i.id.clone(), m)))
        .collect();

    Ok(Json(PortfolioResponse {
        cash: state.ledger.cash(&user_id),
        positions: state.ledger.positions(&user_id),
        realized_pnl: state.ledger.realized_pnl(&user_id),
        unrealized_pnl: state.ledger.unrealized_pnl(&user_id, &marks),
    }))
}

#[derive(Debug, Deserialize)]
struct InjectNewsRequest {
    id: i64,
    headline: String,
    #[serde(default)]
    description: String,
    ts_release_ms: i64,
    decay_halflife_s: f64,
    magnitude_top: f64,
    magnitude_bottom: f64,
    #[serde(default)]
    factors: Vec<String>,
}

async fn inject_news(
    State(state): State<AppState>,
    Json(req): Json<InjectNewsRequest>,
) -> Json<serde_json::Value> {
    state.news.inject(NewsEvent {
        id: req.id,
        headline: req.headline,
        description: req.description,
        ts_release_ms: req.ts_release_ms,
        decay_halflife_s: req.decay_halflife_s,
        magnitude_top: req.magnitude_top,
        magnitude_bottom: req.magnitude_bottom,
        factors: req.factors,
    });
    Json(serde_json::json!({"message": "news injected"}))
}

#[derive(Debug, Serialize)]
struct NewsStatusEntry {
    event: NewsEvent,
    effect: f64,
}

async fn news_status(State(state): State<AppState>) -> Json<Vec<NewsStatusEntry>> {
    Json(
        state
            .news
            .status()
            .into_iter()
            .map(|s| NewsStatusEntry {
                event: s.event,
                effect: s.effect,
            })
            .collect(),
    )
}

async fn news_all(State(state): State<AppState>) -> Json<Vec<NewsEvent>> {
    Json(state.news.all())
}

async fn news_candidates(State(state): State<AppState>) -> Json<Vec<NewsEvent>> {
    Json(state.news.candidates())
}

async fn news_active(State(state): State<AppState>) -> Json<Vec<NewsEvent>> {
    Json(state.news.active())
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.orchestrator.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                let Ok(prices) = result else { break };
                let msg = serde_json::to_string(&prices).unwrap_or_else(|_| "{}".to_string());
                if socket.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                match msg {
                    Message::Text(text) if text == "ping" => {
                        let pong = serde_json::json!({"type": "pong", "timestamp": chrono::Utc::now().timestamp_millis()});
                        if socket.send(Message::Text(pong.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }
    warn!("market websocket connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_user_header_value_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "".parse().unwrap());
        assert!(matches!(user_id(&headers), Err(ApiError::MissingUser)));
    }

    #[test]
    fn absent_user_header_defaults_to_demo_user() {
        let headers = HeaderMap::new();
        assert_eq!(user_id(&headers).unwrap(), DEFAULT_USER_ID);
    }

    #[test]
    fn present_user_header_is_used_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "alice".parse().unwrap());
        assert_eq!(user_id(&headers).unwrap(), "alice");
    }
}
