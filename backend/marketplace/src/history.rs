//! Bid history view — a read-only projection of a user's bids.
//!
//! For every bid the user placed, the view joins its auction and reports
//! where that bid stands now: LEADING, OUTBID, ENDED, or WON.  Leadership is
//! decided by bid identity, not amount, so a user who re-raised their own
//! bid sees the older bid as OUTBID.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::closer;
use crate::db;
use crate::errors::{MarketError, Result};
use crate::ledger;
use crate::models::{AuctionStatus, BidStanding, Cents};

#[derive(Debug, Clone, Serialize)]
pub struct BidRecord {
    pub bid_id: String,
    pub auction_id: String,
    pub item_id: String,
    pub item_title: String,
    pub last_bid_amount: Cents,
    pub current_highest_bid: Cents,
    pub placed_at: i64,
    pub time_left_seconds: Option<i64>,
    pub status: BidStanding,
    pub auction_status: AuctionStatus,
    pub auction_end_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyBidsPage {
    pub bids: Vec<BidRecord>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

/// Paginated bid history for a user, most recent bid first.  Pages are
/// 1-indexed; `total_pages` is never below 1.
pub async fn my_bids(
    pool: &SqlitePool,
    user_id: &str,
    page: i64,
    page_size: i64,
    now: i64,
) -> Result<MyBidsPage> {
    if page < 1 {
        return Err(MarketError::Validation("Page must be at least 1".to_string()));
    }
    if !(1..=100).contains(&page_size) {
        return Err(MarketError::Validation(
            "Page size must be between 1 and 100".to_string(),
        ));
    }

    // This is a read path: expired auctions close before we project them.
    closer::close_due_auctions(pool, now).await?;

    let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bids WHERE bidder_id = ?1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    let rows: Vec<SqliteRow> = sqlx::query(
        r#"
        SELECT b.bid_id, b.amount, b.placed_at,
               a.auction_id, a.status AS auction_status, a.starting_price,
               a.end_time, a.winning_bidder_id,
               i.item_id, i.title
        FROM   bids b
        JOIN   auctions a ON a.auction_id = b.auction_id
        JOIN   catalogue_items i ON i.item_id = a.item_id
        WHERE  b.bidder_id = ?1
        ORDER  BY b.placed_at DESC, b.rowid DESC
        LIMIT  ?2 OFFSET ?3
        "#,
    )
    .bind(user_id)
    .bind(page_size)
    .bind((page - 1) * page_size)
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let bid_id: String = row.try_get("bid_id")?;
        let amount: Cents = row.try_get("amount")?;
        let placed_at: i64 = row.try_get("placed_at")?;
        let auction_id: String = row.try_get("auction_id")?;
        let auction_status: AuctionStatus = row.try_get("auction_status")?;
        let starting_price: Cents = row.try_get("starting_price")?;
        let end_time: i64 = row.try_get("end_time")?;
        let winning_bidder_id: Option<String> = row.try_get("winning_bidder_id")?;

        let bids = db::list_bids(pool, &auction_id).await?;
        let current_highest_bid = ledger::current_price(starting_price, &bids);

        let status = match auction_status {
            AuctionStatus::Ended => {
                if winning_bidder_id.as_deref() == Some(user_id) {
                    BidStanding::Won
                } else {
                    BidStanding::Ended
                }
            }
            AuctionStatus::Active => match ledger::leader(&bids) {
                Some(lead) if lead.bid_id == bid_id => BidStanding::Leading,
                _ => BidStanding::Outbid,
            },
            // Scheduled should be impossible (a bid implies activation) and
            // cancelled auctions read as over.
            _ => BidStanding::Ended,
        };

        records.push(BidRecord {
            bid_id,
            auction_id,
            item_id: row.try_get("item_id")?,
            item_title: row.try_get("title")?,
            last_bid_amount: amount,
            current_highest_bid,
            placed_at,
            time_left_seconds: ledger::remaining_seconds(auction_status, end_time, now),
            status,
            auction_status,
            auction_end_time: end_time,
        });
    }

    let total_pages = ((total + page_size - 1) / page_size).max(1);
    Ok(MyBidsPage {
        bids: records,
        total,
        page,
        page_size,
        total_pages,
    })
}
