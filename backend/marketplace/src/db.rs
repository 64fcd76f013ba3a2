//! Database layer — pool setup, migrations, and shared queries.
//!
//! Query helpers are generic over the executor so the same helper runs
//! against the pool for plain reads and inside a transaction for
//! read-modify-write sequences.  Per-aggregate serialization relies on
//! SQLite's single-writer locking: every mutation happens inside one
//! transaction, so two concurrent writers never act on the same stale
//! snapshot.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::models::{Auction, Bid, CatalogueItem, Order, Payment, Receipt, Shipment};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Auctions & bids
// ─────────────────────────────────────────────────────────

pub async fn fetch_auction<'e, E>(exec: E, auction_id: &str) -> Result<Option<Auction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Auction>(
        r#"
        SELECT auction_id, item_id, auction_type, starting_price, min_increment,
               start_time, end_time, status, winning_bid_id, winning_bidder_id,
               created_at, updated_at
        FROM   auctions
        WHERE  auction_id = ?1
        "#,
    )
    .bind(auction_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn fetch_auction_by_item<'e, E>(exec: E, item_id: &str) -> Result<Option<Auction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Auction>(
        r#"
        SELECT auction_id, item_id, auction_type, starting_price, min_increment,
               start_time, end_time, status, winning_bid_id, winning_bidder_id,
               created_at, updated_at
        FROM   auctions
        WHERE  item_id = ?1
        "#,
    )
    .bind(item_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// All bids for an auction, highest amount first; equal amounts break by
/// earliest `placed_at` then insertion order, which makes winner selection
/// deterministic.
pub async fn list_bids<'e, E>(exec: E, auction_id: &str) -> Result<Vec<Bid>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, Bid>(
        r#"
        SELECT bid_id, auction_id, bidder_id, amount, placed_at
        FROM   bids
        WHERE  auction_id = ?1
        ORDER  BY amount DESC, placed_at ASC, rowid ASC
        "#,
    )
    .bind(auction_id)
    .fetch_all(exec)
    .await?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────
// Catalogue & addresses (consumed collaborators)
// ─────────────────────────────────────────────────────────

pub async fn fetch_item<'e, E>(exec: E, item_id: &str) -> Result<Option<CatalogueItem>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, CatalogueItem>(
        r#"
        SELECT item_id, seller_id, title, description, category_id, keywords,
               base_price, shipping_price_normal, shipping_price_expedited,
               shipping_time_days, is_active
        FROM   catalogue_items
        WHERE  item_id = ?1
        "#,
    )
    .bind(item_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

/// Whether `address_id` exists and belongs to `user_id`.  Ownership is part
/// of the lookup so callers cannot distinguish "absent" from "not yours".
pub async fn address_belongs_to<'e, E>(exec: E, address_id: &str, user_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM addresses WHERE address_id = ?1 AND user_id = ?2")
            .bind(address_id)
            .bind(user_id)
            .fetch_optional(exec)
            .await?;
    Ok(row.is_some())
}

// ─────────────────────────────────────────────────────────
// Orders & settlement records
// ─────────────────────────────────────────────────────────

pub async fn fetch_order<'e, E>(exec: E, order_id: &str) -> Result<Option<Order>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Order>(
        r#"
        SELECT order_id, auction_id, buyer_id, item_id, winning_bid_amount,
               shipping_method, shipping_cost, total_amount, shipping_address_id,
               status, created_at, updated_at
        FROM   orders
        WHERE  order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn fetch_order_by_auction<'e, E>(exec: E, auction_id: &str) -> Result<Option<Order>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Order>(
        r#"
        SELECT order_id, auction_id, buyer_id, item_id, winning_bid_amount,
               shipping_method, shipping_cost, total_amount, shipping_address_id,
               status, created_at, updated_at
        FROM   orders
        WHERE  auction_id = ?1
        "#,
    )
    .bind(auction_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn fetch_payment_by_order<'e, E>(exec: E, order_id: &str) -> Result<Option<Payment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Payment>(
        r#"
        SELECT payment_id, order_id, amount, currency, status, processor,
               processor_txn_id, failure_reason, created_at, updated_at
        FROM   payments
        WHERE  order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn fetch_receipt_by_order<'e, E>(exec: E, order_id: &str) -> Result<Option<Receipt>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Receipt>(
        r#"
        SELECT receipt_id, order_id, receipt_number, total_paid, notes, issued_at
        FROM   receipts
        WHERE  order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

pub async fn fetch_shipment_by_order<'e, E>(exec: E, order_id: &str) -> Result<Option<Shipment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, Shipment>(
        r#"
        SELECT shipment_id, order_id, carrier, tracking_number, estimated_days,
               status, shipped_at, delivered_at, created_at, updated_at
        FROM   shipments
        WHERE  order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(exec)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Test fixtures
// ─────────────────────────────────────────────────────────
