//! Bidding engine — validates and admits bids under the monotonic-increment
//! rule.
//!
//! Status auto-transitions triggered by a bid attempt (activation at start
//! time, closing at end time) commit in their own transactions before the
//! admission check, so they stay visible even when the bid itself is
//! rejected.  The admission check and the bid insert share one transaction:
//! SQLite's single-writer locking serializes concurrent admissions per
//! auction, so two bids can never both clear against the same stale price.

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::closer;
use crate::db;
use crate::errors::{MarketError, Result};
use crate::ledger;
use crate::models::{fmt_cents, AuctionStatus, Bid, Cents};

/// An admitted bid plus the resulting leader snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BidPlacement {
    pub bid: Bid,
    pub current_highest_bid: Cents,
    pub current_highest_bidder_id: String,
}

pub async fn place_bid(
    pool: &SqlitePool,
    auction_id: &str,
    bidder_id: &str,
    amount: Cents,
    now: i64,
) -> Result<BidPlacement> {
    let auction = db::fetch_auction(pool, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;

    // Past end time: close first (committed side effect), then reject.
    if now >= auction.end_time {
        closer::expire_if_due(pool, auction, now).await?;
        return Err(MarketError::InvalidState("Auction has ended".to_string()));
    }

    // Auto-activate a scheduled auction whose start time has passed.  This
    // commits on its own so the transition sticks even if the bid fails a
    // later check.
    if auction.status == AuctionStatus::Scheduled && now >= auction.start_time {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "UPDATE auctions SET status = ?1, updated_at = ?2
             WHERE auction_id = ?3 AND status = ?4",
        )
        .bind(AuctionStatus::Active)
        .bind(now)
        .bind(auction_id)
        .bind(AuctionStatus::Scheduled)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!(auction_id, "auction auto-activated");
    }

    if now < auction.start_time {
        return Err(MarketError::InvalidState(
            "Auction has not started yet".to_string(),
        ));
    }

    // Admission: re-read state under the transaction so the increment check
    // and the insert are serialized with other writers.
    let mut tx = pool.begin().await?;

    let auction = db::fetch_auction(&mut *tx, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    if auction.status != AuctionStatus::Active {
        return Err(MarketError::InvalidState(format!(
            "Cannot bid on {} auction",
            auction.status.as_str().to_lowercase()
        )));
    }

    let bids = db::list_bids(&mut *tx, auction_id).await?;
    let current = ledger::current_price(auction.starting_price, &bids);
    let min_bid = current + auction.min_increment;
    if amount < min_bid {
        return Err(MarketError::Validation(format!(
            "Bid must be at least {} (current: {}, increment: {})",
            fmt_cents(min_bid),
            fmt_cents(current),
            fmt_cents(auction.min_increment)
        )));
    }

    let item = db::fetch_item(&mut *tx, &auction.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    if item.seller_id == bidder_id {
        return Err(MarketError::Validation(
            "Cannot bid on your own item".to_string(),
        ));
    }

    let bid = Bid {
        bid_id: Uuid::new_v4().to_string(),
        auction_id: auction_id.to_string(),
        bidder_id: bidder_id.to_string(),
        amount,
        placed_at: now,
    };
    sqlx::query(
        "INSERT INTO bids (bid_id, auction_id, bidder_id, amount, placed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&bid.bid_id)
    .bind(&bid.auction_id)
    .bind(&bid.bidder_id)
    .bind(bid.amount)
    .bind(bid.placed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE auctions SET updated_at = ?1 WHERE auction_id = ?2")
        .bind(now)
        .bind(auction_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(auction_id, bidder_id, amount, "bid admitted");

    // A freshly admitted bid is by construction the new leader.
    Ok(BidPlacement {
        current_highest_bid: bid.amount,
        current_highest_bidder_id: bid.bidder_id.clone(),
        bid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil;

    struct Fixture {
        pool: SqlitePool,
        auction_id: String,
        seller: String,
        bidder: String,
    }

    /// ACTIVE auction: starting price $1000.00, increment $50.00, window 0..1000.
    async fn fixture() -> Fixture {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let bidder = testutil::seed_user(&pool, "bidder").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;
        let auction_id = testutil::seed_auction(
            &pool,
            &item,
            AuctionStatus::Active,
            100_000,
            5_000,
            0,
            1_000,
        )
        .await;
        Fixture {
            pool,
            auction_id,
            seller,
            bidder,
        }
    }

    #[tokio::test]
    async fn first_bid_at_minimum_is_admitted() {
        let f = fixture().await;
        let placed = place_bid(&f.pool, &f.auction_id, &f.bidder, 105_000, 10)
            .await
            .unwrap();
        assert_eq!(placed.bid.amount, 105_000);
        assert_eq!(placed.current_highest_bid, 105_000);
        assert_eq!(placed.current_highest_bidder_id, f.bidder);
    }

    #[tokio::test]
    async fn bid_below_minimum_is_rejected_with_amounts_in_message() {
        let f = fixture().await;
        place_bid(&f.pool, &f.auction_id, &f.bidder, 105_000, 10)
            .await
            .unwrap();

        let rival = testutil::seed_user(&f.pool, "rival").await;
        let err = place_bid(&f.pool, &f.auction_id, &rival, 106_000, 20)
            .await
            .unwrap_err();
        match err {
            MarketError::Validation(msg) => {
                assert!(msg.contains("$1100.00"), "minimum missing: {msg}");
                assert!(msg.contains("$1050.00"), "current missing: {msg}");
                assert!(msg.contains("$50.00"), "increment missing: {msg}");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn admitted_amounts_are_strictly_increasing_by_increment() {
        let f = fixture().await;
        let rival = testutil::seed_user(&f.pool, "rival").await;

        place_bid(&f.pool, &f.auction_id, &f.bidder, 105_000, 10)
            .await
            .unwrap();
        place_bid(&f.pool, &f.auction_id, &rival, 110_000, 20)
            .await
            .unwrap();
        // Same bidder raising again is allowed.
        place_bid(&f.pool, &f.auction_id, &f.bidder, 115_000, 30)
            .await
            .unwrap();

        let bids = db::list_bids(&f.pool, &f.auction_id).await.unwrap();
        let mut by_time: Vec<_> = bids.iter().map(|b| (b.placed_at, b.amount)).collect();
        by_time.sort();
        let amounts: Vec<_> = by_time.iter().map(|(_, a)| *a).collect();
        assert_eq!(amounts, vec![105_000, 110_000, 115_000]);
        for pair in amounts.windows(2) {
            assert!(pair[1] >= pair[0] + 5_000);
        }
    }

    #[tokio::test]
    async fn seller_cannot_bid_on_own_item() {
        let f = fixture().await;
        let err = place_bid(&f.pool, &f.auction_id, &f.seller, 200_000, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[tokio::test]
    async fn bid_before_start_is_rejected() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let bidder = testutil::seed_user(&pool, "bidder").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;
        let auction_id = testutil::seed_auction(
            &pool,
            &item,
            AuctionStatus::Scheduled,
            100_000,
            5_000,
            100,
            1_000,
        )
        .await;

        let err = place_bid(&pool, &auction_id, &bidder, 105_000, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));
    }

    #[tokio::test]
    async fn scheduled_auction_auto_activates_at_start_time() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let bidder = testutil::seed_user(&pool, "bidder").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;
        let auction_id = testutil::seed_auction(
            &pool,
            &item,
            AuctionStatus::Scheduled,
            100_000,
            5_000,
            100,
            1_000,
        )
        .await;

        place_bid(&pool, &auction_id, &bidder, 105_000, 100)
            .await
            .unwrap();
        let auction = db::fetch_auction(&pool, &auction_id).await.unwrap().unwrap();
        assert_eq!(auction.status, AuctionStatus::Active);
    }

    #[tokio::test]
    async fn bid_after_end_closes_the_auction_and_is_rejected() {
        let f = fixture().await;
        place_bid(&f.pool, &f.auction_id, &f.bidder, 105_000, 10)
            .await
            .unwrap();

        let rival = testutil::seed_user(&f.pool, "rival").await;
        let err = place_bid(&f.pool, &f.auction_id, &rival, 110_000, 2_000)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::InvalidState(_)));

        // The triggered close committed even though the bid was rejected.
        let auction = db::fetch_auction(&f.pool, &f.auction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auction.status, AuctionStatus::Ended);
        assert_eq!(auction.winning_bidder_id, Some(f.bidder.clone()));
    }

    #[tokio::test]
    async fn cancelled_auction_rejects_bids() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let bidder = testutil::seed_user(&pool, "bidder").await;
        let item = testutil::seed_item(&pool, &seller, 1_000, 2_500).await;
        let auction_id = testutil::seed_auction(
            &pool,
            &item,
            AuctionStatus::Cancelled,
            100_000,
            5_000,
            0,
            1_000,
        )
        .await;

        let err = place_bid(&pool, &auction_id, &bidder, 105_000, 10)
            .await
            .unwrap_err();
        match err {
            MarketError::InvalidState(msg) => assert!(msg.contains("cancelled")),
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }
}
