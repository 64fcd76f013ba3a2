//! Domain row types and status enums.
//!
//! Status fields are closed enums (stored as TEXT, constrained by CHECK
//! clauses in the schema) so illegal states are unrepresentable in Rust.
//! Money columns are integer minor units (cents); timestamps are unix
//! seconds (UTC).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Money in minor units (cents).
pub type Cents = i64;

/// Default minimum bid increment when the seller does not specify one: $1.00.
pub const DEFAULT_MIN_INCREMENT: Cents = 100;

/// Render cents as a dollar string for human-facing messages, e.g. `$1050.00`.
pub fn fmt_cents(amount: Cents) -> String {
    format!("${}.{:02}", amount / 100, (amount % 100).abs())
}

// ─────────────────────────────────────────────────────────
// Status enums
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionType {
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingMethod {
    Normal,
    Expedited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Initiated,
    Authorized,
    Captured,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

/// Per-user bid standing shown in the bid-history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BidStanding {
    /// The user's bid is the auction's current leader.
    Leading,
    /// Another bid leads the still-active auction.
    Outbid,
    /// The auction is over (or cancelled) and the user did not win.
    Ended,
    /// The auction ended with this user as the winning bidder.
    Won,
}

// ─────────────────────────────────────────────────────────
// Row types
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Auction {
    pub auction_id: String,
    pub item_id: String,
    pub auction_type: AuctionType,
    pub starting_price: Cents,
    pub min_increment: Cents,
    pub start_time: i64,
    pub end_time: i64,
    pub status: AuctionStatus,
    pub winning_bid_id: Option<String>,
    pub winning_bidder_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bid {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: Cents,
    pub placed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub order_id: String,
    pub auction_id: String,
    pub buyer_id: String,
    pub item_id: String,
    pub winning_bid_amount: Cents,
    pub shipping_method: ShippingMethod,
    pub shipping_cost: Cents,
    pub total_amount: Cents,
    pub shipping_address_id: String,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub amount: Cents,
    pub currency: String,
    pub status: PaymentStatus,
    pub processor: String,
    pub processor_txn_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Receipt {
    pub receipt_id: String,
    pub order_id: String,
    pub receipt_number: String,
    pub total_paid: Cents,
    pub notes: Option<String>,
    pub issued_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Shipment {
    pub shipment_id: String,
    pub order_id: String,
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_days: i64,
    pub status: ShipmentStatus,
    pub shipped_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The slice of a catalogue item the auction core consumes (seller identity,
/// shipping terms).  Catalogue CRUD itself lives outside this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CatalogueItem {
    pub item_id: String,
    pub seller_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub keywords: Option<String>,
    pub base_price: Cents,
    pub shipping_price_normal: Cents,
    pub shipping_price_expedited: Cents,
    pub shipping_time_days: i64,
    pub is_active: bool,
}
