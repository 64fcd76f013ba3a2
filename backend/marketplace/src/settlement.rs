//! Settlement engine — order creation and the payment capture protocol.
//!
//! A closed auction settles into exactly one order for the winning bidder.
//! Payment runs through an idempotent capture protocol: a CAPTURED payment
//! is terminal and replaying the request returns the stored record; the
//! capture, receipt, and shipment writes commit as one transaction so a
//! partially settled order can never be observed.

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::errors::{MarketError, Result};
use crate::gateway::{CardDetails, CardProcessor, ChargeOutcome};
use crate::models::{
    AuctionStatus, Cents, Order, OrderStatus, Payment, PaymentStatus, Receipt, Shipment,
    ShipmentStatus, ShippingMethod,
};

/// Shipping cost and grand total for a winning bid under the given method.
pub fn calculate_total(
    winning_bid_amount: Cents,
    method: ShippingMethod,
    shipping_price_normal: Cents,
    shipping_price_expedited: Cents,
) -> (Cents, Cents) {
    let shipping_cost = match method {
        ShippingMethod::Normal => shipping_price_normal,
        ShippingMethod::Expedited => shipping_price_expedited,
    };
    (shipping_cost, winning_bid_amount + shipping_cost)
}

// ─────────────────────────────────────────────────────────
// Order creation & mutation
// ─────────────────────────────────────────────────────────

/// Create the order for a closed auction.  Only the winning bidder may do
/// this; the buyer reference is taken from the auction's frozen winner, not
/// from caller input.
pub async fn create_order(
    pool: &SqlitePool,
    auction_id: &str,
    actor_id: &str,
    shipping_method: ShippingMethod,
    shipping_address_id: &str,
    now: i64,
) -> Result<Order> {
    let mut tx = pool.begin().await?;

    let auction = db::fetch_auction(&mut *tx, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    if auction.status != AuctionStatus::Ended {
        return Err(MarketError::InvalidState(
            "Cannot create an order for an auction that has not ended".to_string(),
        ));
    }
    let (winning_bid_id, winning_bidder_id) =
        match (&auction.winning_bid_id, &auction.winning_bidder_id) {
            (Some(bid), Some(bidder)) => (bid.clone(), bidder.clone()),
            _ => {
                return Err(MarketError::InvalidState(
                    "Auction ended without a winning bid".to_string(),
                ))
            }
        };
    if winning_bidder_id != actor_id {
        return Err(MarketError::Forbidden(
            "Only the winning bidder can create an order".to_string(),
        ));
    }
    if db::fetch_order_by_auction(&mut *tx, auction_id).await?.is_some() {
        return Err(MarketError::Conflict(
            "Order already exists for this auction".to_string(),
        ));
    }
    // Ownership is part of the lookup — an address that exists but belongs
    // to someone else is indistinguishable from one that does not exist.
    if !db::address_belongs_to(&mut *tx, shipping_address_id, &winning_bidder_id).await? {
        return Err(MarketError::NotFound("Shipping address"));
    }

    let winning_bid_amount: Cents = {
        let row: Option<(Cents,)> = sqlx::query_as("SELECT amount FROM bids WHERE bid_id = ?1")
            .bind(&winning_bid_id)
            .fetch_optional(&mut *tx)
            .await?;
        row.map(|(a,)| a)
            .ok_or(MarketError::NotFound("Winning bid"))?
    };

    let item = db::fetch_item(&mut *tx, &auction.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    let (shipping_cost, total_amount) = calculate_total(
        winning_bid_amount,
        shipping_method,
        item.shipping_price_normal,
        item.shipping_price_expedited,
    );

    let order = Order {
        order_id: Uuid::new_v4().to_string(),
        auction_id: auction_id.to_string(),
        buyer_id: winning_bidder_id,
        item_id: auction.item_id.clone(),
        winning_bid_amount,
        shipping_method,
        shipping_cost,
        total_amount,
        shipping_address_id: shipping_address_id.to_string(),
        status: OrderStatus::PendingPayment,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO orders
            (order_id, auction_id, buyer_id, item_id, winning_bid_amount,
             shipping_method, shipping_cost, total_amount, shipping_address_id,
             status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.auction_id)
    .bind(&order.buyer_id)
    .bind(&order.item_id)
    .bind(order.winning_bid_amount)
    .bind(order.shipping_method)
    .bind(order.shipping_cost)
    .bind(order.total_amount)
    .bind(&order.shipping_address_id)
    .bind(order.status)
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(order_id = %order.order_id, auction_id, "order created");
    Ok(order)
}

/// Switch the shipping method and recompute cost/total.  Only allowed while
/// the order still awaits payment.
pub async fn update_shipping_method(
    pool: &SqlitePool,
    order_id: &str,
    actor_id: &str,
    method: ShippingMethod,
    now: i64,
) -> Result<Order> {
    let mut tx = pool.begin().await?;

    let order = db::fetch_order(&mut *tx, order_id)
        .await?
        .ok_or(MarketError::NotFound("Order"))?;
    if order.buyer_id != actor_id {
        return Err(MarketError::Forbidden(
            "You can only update your own orders".to_string(),
        ));
    }
    if order.status != OrderStatus::PendingPayment {
        return Err(MarketError::InvalidState(format!(
            "Cannot update shipping method for order with status {}",
            order.status.as_str()
        )));
    }

    let item = db::fetch_item(&mut *tx, &order.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    let (shipping_cost, total_amount) = calculate_total(
        order.winning_bid_amount,
        method,
        item.shipping_price_normal,
        item.shipping_price_expedited,
    );

    sqlx::query(
        r#"
        UPDATE orders
        SET    shipping_method = ?1, shipping_cost = ?2, total_amount = ?3, updated_at = ?4
        WHERE  order_id = ?5
        "#,
    )
    .bind(method)
    .bind(shipping_cost)
    .bind(total_amount)
    .bind(now)
    .bind(order_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Order {
        shipping_method: method,
        shipping_cost,
        total_amount,
        updated_at: now,
        ..order
    })
}

// ─────────────────────────────────────────────────────────
// Payment capture
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct PayOutcome {
    pub order_id: String,
    pub payment_id: String,
    pub status: PaymentStatus,
    pub total_amount: Cents,
    pub message: String,
}

/// Drive one payment attempt for an order.
///
/// Idempotent on success: re-presenting a request for an already-CAPTURED
/// order returns the stored payment without touching receipt or shipment.
/// A declined attempt leaves the order FAILED and retryable.
pub async fn pay(
    pool: &SqlitePool,
    order_id: &str,
    actor_id: &str,
    card: &CardDetails,
    processor: &dyn CardProcessor,
    now: i64,
) -> Result<PayOutcome> {
    let mut tx = pool.begin().await?;

    let order = db::fetch_order(&mut *tx, order_id)
        .await?
        .ok_or(MarketError::NotFound("Order"))?;
    if order.buyer_id != actor_id {
        return Err(MarketError::Forbidden(
            "Only the winning bidder can pay for this order".to_string(),
        ));
    }

    let auction = db::fetch_auction(&mut *tx, &order.auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    if auction.status != AuctionStatus::Ended {
        return Err(MarketError::InvalidState(
            "Cannot pay for an order from an auction that has not ended".to_string(),
        ));
    }
    // Guards against stale or forged order state.
    if auction.winning_bidder_id.as_deref() != Some(actor_id) {
        return Err(MarketError::Conflict(
            "You are not the winning bidder for this auction".to_string(),
        ));
    }

    if order.status == OrderStatus::Paid {
        if let Some(payment) = db::fetch_payment_by_order(&mut *tx, order_id).await? {
            if payment.status == PaymentStatus::Captured {
                return Ok(PayOutcome {
                    order_id: order.order_id,
                    payment_id: payment.payment_id,
                    status: payment.status,
                    total_amount: order.total_amount,
                    message: "Payment already processed successfully".to_string(),
                });
            }
        }
    }
    if !matches!(order.status, OrderStatus::PendingPayment | OrderStatus::Failed) {
        return Err(MarketError::InvalidState(format!(
            "Cannot pay for order with status {}",
            order.status.as_str()
        )));
    }

    card.validate()?;

    match processor.charge(card, order.total_amount) {
        ChargeOutcome::Declined { reason } => {
            record_payment(
                &mut tx,
                &order,
                processor.name(),
                PaymentStatus::Failed,
                None,
                Some(&reason),
                now,
            )
            .await?;
            sqlx::query("UPDATE orders SET status = ?1, updated_at = ?2 WHERE order_id = ?3")
                .bind(OrderStatus::Failed)
                .bind(now)
                .bind(order_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            info!(order_id, reason, "payment declined");
            Err(MarketError::PaymentDeclined(reason))
        }
        ChargeOutcome::Approved { txn_id } => {
            let payment = record_payment(
                &mut tx,
                &order,
                processor.name(),
                PaymentStatus::Captured,
                Some(&txn_id),
                None,
                now,
            )
            .await?;
            sqlx::query("UPDATE orders SET status = ?1, updated_at = ?2 WHERE order_id = ?3")
                .bind(OrderStatus::Paid)
                .bind(now)
                .bind(order_id)
                .execute(&mut *tx)
                .await?;

            if db::fetch_receipt_by_order(&mut *tx, order_id).await?.is_none() {
                issue_receipt(&mut tx, &order, now).await?;
            }
            if db::fetch_shipment_by_order(&mut *tx, order_id).await?.is_none() {
                open_shipment(&mut tx, &order, now).await?;
            }

            // Payment, receipt, and shipment land atomically.
            tx.commit().await?;
            info!(order_id, payment_id = %payment.payment_id, "payment captured");
            Ok(PayOutcome {
                order_id: order.order_id,
                payment_id: payment.payment_id,
                status: PaymentStatus::Captured,
                total_amount: order.total_amount,
                message: "Payment processed successfully".to_string(),
            })
        }
    }
}

/// Write the current attempt's state into the order's single payment row.
/// A retry after a failed attempt reuses the row (and its payment id).
async fn record_payment(
    tx: &mut Transaction<'_, Sqlite>,
    order: &Order,
    processor: &str,
    status: PaymentStatus,
    txn_id: Option<&str>,
    failure_reason: Option<&str>,
    now: i64,
) -> Result<Payment> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (payment_id, order_id, amount, currency, status, processor,
             processor_txn_id, failure_reason, created_at, updated_at)
        VALUES (?1, ?2, ?3, 'USD', ?4, ?5, ?6, ?7, ?8, ?8)
        ON CONFLICT(order_id) DO UPDATE SET
            amount = excluded.amount,
            status = excluded.status,
            processor = excluded.processor,
            processor_txn_id = excluded.processor_txn_id,
            failure_reason = excluded.failure_reason,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&order.order_id)
    .bind(order.total_amount)
    .bind(status)
    .bind(processor)
    .bind(txn_id)
    .bind(failure_reason)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    db::fetch_payment_by_order(&mut **tx, &order.order_id)
        .await?
        .ok_or(MarketError::NotFound("Payment"))
}

async fn issue_receipt(
    tx: &mut Transaction<'_, Sqlite>,
    order: &Order,
    now: i64,
) -> Result<Receipt> {
    let day = DateTime::<Utc>::from_timestamp(now, 0)
        .ok_or_else(|| MarketError::Validation("Timestamp out of range".to_string()))?
        .format("%Y%m%d");
    let id_prefix: String = order.order_id.chars().take(8).collect();
    let receipt = Receipt {
        receipt_id: Uuid::new_v4().to_string(),
        order_id: order.order_id.clone(),
        receipt_number: format!("RCP-{day}-{}", id_prefix.to_uppercase()),
        total_paid: order.total_amount,
        notes: Some(format!("Payment for order {}", order.order_id)),
        issued_at: now,
    };
    sqlx::query(
        r#"
        INSERT INTO receipts (receipt_id, order_id, receipt_number, total_paid, notes, issued_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&receipt.receipt_id)
    .bind(&receipt.order_id)
    .bind(&receipt.receipt_number)
    .bind(receipt.total_paid)
    .bind(&receipt.notes)
    .bind(receipt.issued_at)
    .execute(&mut **tx)
    .await?;
    Ok(receipt)
}

async fn open_shipment(
    tx: &mut Transaction<'_, Sqlite>,
    order: &Order,
    now: i64,
) -> Result<Shipment> {
    let item = db::fetch_item(&mut **tx, &order.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    let shipment = Shipment {
        shipment_id: Uuid::new_v4().to_string(),
        order_id: order.order_id.clone(),
        carrier: None,
        tracking_number: None,
        estimated_days: item.shipping_time_days,
        status: ShipmentStatus::Pending,
        shipped_at: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    };
    sqlx::query(
        r#"
        INSERT INTO shipments
            (shipment_id, order_id, estimated_days, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(&shipment.shipment_id)
    .bind(&shipment.order_id)
    .bind(shipment.estimated_days)
    .bind(shipment.status)
    .bind(shipment.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(shipment)
}

// ─────────────────────────────────────────────────────────
// Buyer-scoped reads
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub payment: Option<Payment>,
    pub receipt: Option<Receipt>,
    pub shipment: Option<Shipment>,
}

pub async fn get_order(pool: &SqlitePool, order_id: &str, actor_id: &str) -> Result<OrderDetail> {
    let order = fetch_owned_order(pool, order_id, actor_id).await?;
    let payment = db::fetch_payment_by_order(pool, order_id).await?;
    let receipt = db::fetch_receipt_by_order(pool, order_id).await?;
    let shipment = db::fetch_shipment_by_order(pool, order_id).await?;
    Ok(OrderDetail {
        order,
        payment,
        receipt,
        shipment,
    })
}

pub async fn get_receipt(pool: &SqlitePool, order_id: &str, actor_id: &str) -> Result<Receipt> {
    fetch_owned_order(pool, order_id, actor_id).await?;
    db::fetch_receipt_by_order(pool, order_id)
        .await?
        .ok_or(MarketError::NotFound("Receipt"))
}

pub async fn get_shipment(pool: &SqlitePool, order_id: &str, actor_id: &str) -> Result<Shipment> {
    fetch_owned_order(pool, order_id, actor_id).await?;
    db::fetch_shipment_by_order(pool, order_id)
        .await?
        .ok_or(MarketError::NotFound("Shipment"))
}

async fn fetch_owned_order(pool: &SqlitePool, order_id: &str, actor_id: &str) -> Result<Order> {
    let order = db::fetch_order(pool, order_id)
        .await?
        .ok_or(MarketError::NotFound("Order"))?;
    if order.buyer_id != actor_id {
        return Err(MarketError::Forbidden(
            "You can only view your own orders".to_string(),
        ));
    }
    Ok(order)
}
