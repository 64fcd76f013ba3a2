//! Axum REST API handlers.
//!
//! The handlers are a thin shell: extract the caller identity and the
//! request shape, hand everything to the core, and map typed failures to
//! transport status codes.  Authentication itself lives outside this
//! service; the already-authenticated caller id arrives in the `X-User-Id`
//! header.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::bidding::{self, BidPlacement};
use crate::closer::{self, AuctionOutcome};
use crate::errors::MarketError;
use crate::gateway::{CardDetails, CardProcessor};
use crate::history::{self, MyBidsPage};
use crate::ledger::{self, AuctionDetail, CreateAuction};
use crate::models::{Auction, Bid, Cents, Order, Receipt, Shipment, ShippingMethod};
use crate::search::{self, SearchRequest, SearchResponse};
use crate::settlement::{self, OrderDetail, PayOutcome};

pub struct ApiState {
    pub pool: SqlitePool,
    pub gateway: Arc<dyn CardProcessor>,
}

// ─────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(MarketError);

impl From<MarketError> for ApiError {
    fn from(e: MarketError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::InvalidState(_) | MarketError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
            MarketError::Database(_) | MarketError::Migrate(_) | MarketError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Pull the authenticated caller id from the `X-User-Id` header.
fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApiError(MarketError::Forbidden(
                "Missing caller identity".to_string(),
            ))
        })
}

fn now() -> i64 {
    Utc::now().timestamp()
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateAuctionRequest {
    pub item_id: String,
    pub starting_price: Cents,
    pub min_increment: Option<Cents>,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Deserialize)]
pub struct BidRequest {
    pub amount: Cents,
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub auction_id: String,
    pub shipping_method: ShippingMethod,
    pub shipping_address_id: String,
}

#[derive(Deserialize)]
pub struct ShippingMethodUpdate {
    pub shipping_method: ShippingMethod,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Handlers — auctions & bidding
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /auctions`
pub async fn create_auction(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<CreateAuctionRequest>,
) -> ApiResult<Auction> {
    let actor = caller(&headers)?;
    let auction = ledger::create_auction(
        &state.pool,
        &actor,
        CreateAuction {
            item_id: req.item_id,
            starting_price: req.starting_price,
            min_increment: req.min_increment,
            start_time: req.start_time,
            end_time: req.end_time,
        },
        now(),
    )
    .await?;
    Ok(Json(auction))
}

/// `POST /auctions/search`
pub async fn search_auctions(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResponse> {
    Ok(Json(search::search_auctions(&state.pool, &req, now()).await?))
}

/// `GET /auctions/:id`
pub async fn get_auction(
    State(state): State<Arc<ApiState>>,
    Path(auction_id): Path<String>,
) -> ApiResult<AuctionDetail> {
    Ok(Json(ledger::get_auction(&state.pool, &auction_id, now()).await?))
}

/// `GET /auctions/:id/bids`
pub async fn get_auction_bids(
    State(state): State<Arc<ApiState>>,
    Path(auction_id): Path<String>,
) -> ApiResult<Vec<Bid>> {
    Ok(Json(
        ledger::get_auction_bids(&state.pool, &auction_id, now()).await?,
    ))
}

/// `POST /auctions/:id/bids`
pub async fn place_bid(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(auction_id): Path<String>,
    Json(req): Json<BidRequest>,
) -> ApiResult<BidPlacement> {
    let actor = caller(&headers)?;
    Ok(Json(
        bidding::place_bid(&state.pool, &auction_id, &actor, req.amount, now()).await?,
    ))
}

/// `POST /auctions/:id/end`
pub async fn end_auction(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(auction_id): Path<String>,
) -> ApiResult<AuctionOutcome> {
    let actor = caller(&headers)?;
    Ok(Json(
        closer::end_auction(&state.pool, &auction_id, &actor, now()).await?,
    ))
}

/// `GET /auctions/:id/status`
pub async fn get_auction_status(
    State(state): State<Arc<ApiState>>,
    Path(auction_id): Path<String>,
) -> ApiResult<AuctionOutcome> {
    Ok(Json(
        closer::get_auction_status(&state.pool, &auction_id, now()).await?,
    ))
}

// ─────────────────────────────────────────────────────────
// Handlers — orders & settlement
// ─────────────────────────────────────────────────────────

/// `POST /orders`
pub async fn create_order(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Order> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::create_order(
            &state.pool,
            &req.auction_id,
            &actor,
            req.shipping_method,
            &req.shipping_address_id,
            now(),
        )
        .await?,
    ))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<OrderDetail> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::get_order(&state.pool, &order_id, &actor).await?,
    ))
}

/// `PUT /orders/:id/shipping-method`
pub async fn update_shipping_method(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(req): Json<ShippingMethodUpdate>,
) -> ApiResult<Order> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::update_shipping_method(
            &state.pool,
            &order_id,
            &actor,
            req.shipping_method,
            now(),
        )
        .await?,
    ))
}

/// `POST /orders/:id/pay`
pub async fn pay_order(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    Json(card): Json<CardDetails>,
) -> ApiResult<PayOutcome> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::pay(
            &state.pool,
            &order_id,
            &actor,
            &card,
            state.gateway.as_ref(),
            now(),
        )
        .await?,
    ))
}

/// `GET /orders/:id/receipt`
pub async fn get_receipt(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Receipt> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::get_receipt(&state.pool, &order_id, &actor).await?,
    ))
}

/// `GET /orders/:id/shipment`
pub async fn get_shipment(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> ApiResult<Shipment> {
    let actor = caller(&headers)?;
    Ok(Json(
        settlement::get_shipment(&state.pool, &order_id, &actor).await?,
    ))
}

// ─────────────────────────────────────────────────────────
// Handlers — bid history
// ─────────────────────────────────────────────────────────

/// `GET /users/me/bids`
pub async fn get_my_bids(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> ApiResult<MyBidsPage> {
    let actor = caller(&headers)?;
    Ok(Json(
        history::my_bids(&state.pool, &actor, page.page, page.page_size, now()).await?,
    ))
}
