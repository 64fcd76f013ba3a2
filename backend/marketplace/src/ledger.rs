//! Auction ledger — auction lifecycle and the derived price/leader views.
//!
//! The ledger owns auction records and the append-only bid sequence.  The
//! price helpers are pure functions over a bid slice so the bidding engine,
//! the closer, and the read projections all agree on one definition of
//! "current price" and "leader".

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::closer;
use crate::db;
use crate::errors::{MarketError, Result};
use crate::models::{
    Auction, AuctionStatus, AuctionType, Bid, Cents, DEFAULT_MIN_INCREMENT,
};

/// Current bidding price: the highest admitted bid, or the starting price
/// when no bids exist.
pub fn current_price(starting_price: Cents, bids: &[Bid]) -> Cents {
    bids.iter()
        .map(|b| b.amount)
        .max()
        .unwrap_or(starting_price)
}

/// The leading bid: highest amount, ties broken by earliest `placed_at`.
/// Ties should not occur under strict-increment admission, but winner
/// selection stays deterministic if they ever do.
pub fn leader(bids: &[Bid]) -> Option<&Bid> {
    bids.iter()
        .min_by(|a, b| b.amount.cmp(&a.amount).then(a.placed_at.cmp(&b.placed_at)))
}

/// Whole seconds until the auction ends.  `None` unless the auction is
/// ACTIVE; never negative.
pub fn remaining_seconds(status: AuctionStatus, end_time: i64, now: i64) -> Option<i64> {
    match status {
        AuctionStatus::Active => Some((end_time - now).max(0)),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────
// Auction lifecycle
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreateAuction {
    pub item_id: String,
    pub starting_price: Cents,
    /// Defaults to [`DEFAULT_MIN_INCREMENT`] when absent.
    pub min_increment: Option<Cents>,
    pub start_time: i64,
    pub end_time: i64,
}

/// Create the auction for a catalogue item.  Only the item's seller may do
/// this, and each item carries at most one auction for its lifetime.
pub async fn create_auction(
    pool: &SqlitePool,
    actor_id: &str,
    req: CreateAuction,
    now: i64,
) -> Result<Auction> {
    if req.end_time <= req.start_time {
        return Err(MarketError::Validation(
            "Auction end time must be after its start time".to_string(),
        ));
    }
    if req.starting_price < 0 {
        return Err(MarketError::Validation(
            "Starting price must not be negative".to_string(),
        ));
    }
    let min_increment = req.min_increment.unwrap_or(DEFAULT_MIN_INCREMENT);
    if min_increment < 0 {
        return Err(MarketError::Validation(
            "Minimum increment must not be negative".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let item = db::fetch_item(&mut *tx, &req.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    if item.seller_id != actor_id {
        return Err(MarketError::Forbidden(
            "Only the seller can create an auction for their item".to_string(),
        ));
    }
    if db::fetch_auction_by_item(&mut *tx, &req.item_id).await?.is_some() {
        return Err(MarketError::Conflict(
            "An auction already exists for this item".to_string(),
        ));
    }

    // Status is derived from the configured window at creation time.
    let status = if req.end_time <= now {
        AuctionStatus::Ended
    } else if req.start_time <= now {
        AuctionStatus::Active
    } else {
        AuctionStatus::Scheduled
    };

    let auction = Auction {
        auction_id: Uuid::new_v4().to_string(),
        item_id: req.item_id,
        auction_type: AuctionType::Forward,
        starting_price: req.starting_price,
        min_increment,
        start_time: req.start_time,
        end_time: req.end_time,
        status,
        winning_bid_id: None,
        winning_bidder_id: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO auctions
            (auction_id, item_id, auction_type, starting_price, min_increment,
             start_time, end_time, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&auction.auction_id)
    .bind(&auction.item_id)
    .bind(auction.auction_type)
    .bind(auction.starting_price)
    .bind(auction.min_increment)
    .bind(auction.start_time)
    .bind(auction.end_time)
    .bind(auction.status)
    .bind(auction.created_at)
    .bind(auction.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(auction)
}

// ─────────────────────────────────────────────────────────
// Read views
// ─────────────────────────────────────────────────────────

/// Full auction detail: the record, its bid sequence, and the derived
/// price/leader/time-left fields.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuctionDetail {
    #[serde(flatten)]
    pub auction: Auction,
    pub bids: Vec<Bid>,
    pub current_highest_bid: Cents,
    pub current_highest_bidder_id: Option<String>,
    pub remaining_time_seconds: Option<i64>,
}

/// Fetch an auction and its derived fields.  Lazy expiry applies first, so
/// an auction past its end time is never observed as ACTIVE.
pub async fn get_auction(pool: &SqlitePool, auction_id: &str, now: i64) -> Result<AuctionDetail> {
    let auction = db::fetch_auction(pool, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    let auction = closer::expire_if_due(pool, auction, now).await?;

    let bids = db::list_bids(pool, &auction.auction_id).await?;
    let current_highest_bid = current_price(auction.starting_price, &bids);
    let current_highest_bidder_id = leader(&bids).map(|b| b.bidder_id.clone());
    let remaining_time_seconds = remaining_seconds(auction.status, auction.end_time, now);

    Ok(AuctionDetail {
        auction,
        bids,
        current_highest_bid,
        current_highest_bidder_id,
        remaining_time_seconds,
    })
}

/// All bids for an auction, highest first.  Lazy expiry applies here as on
/// every other read path.
pub async fn get_auction_bids(pool: &SqlitePool, auction_id: &str, now: i64) -> Result<Vec<Bid>> {
    let auction = db::fetch_auction(pool, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    closer::expire_if_due(pool, auction, now).await?;
    db::list_bids(pool, auction_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    fn bid(amount: Cents, placed_at: i64) -> Bid {
        Bid {
            bid_id: format!("bid-{amount}-{placed_at}"),
            auction_id: "a".to_string(),
            bidder_id: "u".to_string(),
            amount,
            placed_at,
        }
    }

    #[test]
    fn current_price_is_starting_price_without_bids() {
        assert_eq!(current_price(100_000, &[]), 100_000);
    }

    #[test]
    fn current_price_is_max_bid() {
        let bids = vec![bid(105_000, 1), bid(110_000, 2)];
        assert_eq!(current_price(100_000, &bids), 110_000);
    }

    #[test]
    fn leader_breaks_amount_ties_by_earliest_placement() {
        let bids = vec![bid(110_000, 5), bid(110_000, 3), bid(105_000, 1)];
        let lead = leader(&bids).unwrap();
        assert_eq!(lead.amount, 110_000);
        assert_eq!(lead.placed_at, 3);
    }

    #[test]
    fn remaining_seconds_only_for_active() {
        assert_eq!(remaining_seconds(AuctionStatus::Active, 100, 40), Some(60));
        assert_eq!(remaining_seconds(AuctionStatus::Active, 100, 150), Some(0));
        assert_eq!(remaining_seconds(AuctionStatus::Scheduled, 100, 40), None);
        assert_eq!(remaining_seconds(AuctionStatus::Ended, 100, 40), None);
    }

    #[tokio::test]
    async fn create_auction_rejects_non_seller_and_duplicates() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let other = testutil::seed_user(&pool, "other").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;

        let req = CreateAuction {
            item_id: item.clone(),
            starting_price: 100_000,
            min_increment: Some(5_000),
            start_time: 100,
            end_time: 200,
        };

        let err = create_auction(&pool, &other, req.clone(), 50).await.unwrap_err();
        assert!(matches!(err, MarketError::Forbidden(_)));

        let created = create_auction(&pool, &seller, req.clone(), 50).await.unwrap();
        assert_eq!(created.status, AuctionStatus::Scheduled);
        assert_eq!(created.min_increment, 5_000);

        let err = create_auction(&pool, &seller, req, 50).await.unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_auction_derives_status_from_window() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;

        let created = create_auction(
            &pool,
            &seller,
            CreateAuction {
                item_id: item,
                starting_price: 100_000,
                min_increment: None,
                start_time: 100,
                end_time: 200,
            },
            150,
        )
        .await
        .unwrap();
        assert_eq!(created.status, AuctionStatus::Active);
        assert_eq!(created.min_increment, DEFAULT_MIN_INCREMENT);
    }

    #[tokio::test]
    async fn create_auction_rejects_inverted_window() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;

        let err = create_auction(
            &pool,
            &seller,
            CreateAuction {
                item_id: item,
                starting_price: 100_000,
                min_increment: None,
                start_time: 200,
                end_time: 200,
            },
            50,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }
}
