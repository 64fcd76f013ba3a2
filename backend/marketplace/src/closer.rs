//! Auction closer — the SCHEDULED → ACTIVE → ENDED state machine.
//!
//! An auction closes either explicitly (the seller calls `end_auction`) or
//! lazily, when any read or write observes that its end time has passed.
//! There is additionally a periodic sweep (see `sweeper`) so auctions close
//! promptly even without traffic; each path funnels through the same
//! transactional [`finalize`] so the winner is determined exactly once.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

use crate::db;
use crate::errors::{MarketError, Result};
use crate::ledger;
use crate::models::{Auction, AuctionStatus, Cents};

/// The frozen result of a closed auction.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuctionOutcome {
    pub auction_id: String,
    pub status: AuctionStatus,
    pub winning_bid_id: Option<String>,
    pub winning_bidder_id: Option<String>,
    pub final_price: Option<Cents>,
    pub can_pay: bool,
    pub message: String,
}

/// Transition an auction to ENDED and freeze the winner references.
///
/// Must run inside the caller's transaction so the winner determination and
/// the status write commit as one unit.  The winning bid is the highest
/// amount, ties broken by earliest placement.
pub(crate) async fn finalize(
    tx: &mut Transaction<'_, Sqlite>,
    auction: &Auction,
    now: i64,
) -> Result<AuctionOutcome> {
    let bids = db::list_bids(&mut **tx, &auction.auction_id).await?;
    let winner = ledger::leader(&bids);

    let (winning_bid_id, winning_bidder_id, final_price, message) = match winner {
        Some(bid) => (
            Some(bid.bid_id.clone()),
            Some(bid.bidder_id.clone()),
            bid.amount,
            "Auction ended".to_string(),
        ),
        None => (
            None,
            None,
            auction.starting_price,
            "Auction ended with no bids".to_string(),
        ),
    };

    sqlx::query(
        r#"
        UPDATE auctions
        SET    status = ?1, winning_bid_id = ?2, winning_bidder_id = ?3, updated_at = ?4
        WHERE  auction_id = ?5
        "#,
    )
    .bind(AuctionStatus::Ended)
    .bind(&winning_bid_id)
    .bind(&winning_bidder_id)
    .bind(now)
    .bind(&auction.auction_id)
    .execute(&mut **tx)
    .await?;

    let can_pay = winning_bid_id.is_some();
    Ok(AuctionOutcome {
        auction_id: auction.auction_id.clone(),
        status: AuctionStatus::Ended,
        winning_bid_id,
        winning_bidder_id,
        final_price: Some(final_price),
        can_pay,
        message,
    })
}

/// Re-read the stored result of an already-ENDED auction without re-scanning
/// bids to pick a different winner.
async fn stored_outcome(
    pool: &SqlitePool,
    auction: &Auction,
    message: &str,
) -> Result<AuctionOutcome> {
    let final_price = match &auction.winning_bid_id {
        Some(bid_id) => {
            let row: Option<(Cents,)> =
                sqlx::query_as("SELECT amount FROM bids WHERE bid_id = ?1")
                    .bind(bid_id)
                    .fetch_optional(pool)
                    .await?;
            row.map(|(a,)| a).unwrap_or(auction.starting_price)
        }
        None => auction.starting_price,
    };
    Ok(AuctionOutcome {
        auction_id: auction.auction_id.clone(),
        status: auction.status,
        winning_bid_id: auction.winning_bid_id.clone(),
        winning_bidder_id: auction.winning_bidder_id.clone(),
        final_price: Some(final_price),
        can_pay: auction.winning_bid_id.is_some(),
        message: message.to_string(),
    })
}

/// Apply lazy expiry: if the auction is ACTIVE and its end time has passed,
/// close it and return the refreshed record.  Called on every read path so
/// no auction is ever observed as ACTIVE past its end time.
pub(crate) async fn expire_if_due(
    pool: &SqlitePool,
    auction: Auction,
    now: i64,
) -> Result<Auction> {
    if auction.status != AuctionStatus::Active || now < auction.end_time {
        return Ok(auction);
    }

    let mut tx = pool.begin().await?;
    // Re-check under the transaction; another request may have closed it.
    let current = db::fetch_auction(&mut *tx, &auction.auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    if current.status == AuctionStatus::Active && now >= current.end_time {
        finalize(&mut tx, &current, now).await?;
    }
    tx.commit().await?;

    db::fetch_auction(pool, &auction.auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))
}

/// Explicitly end an auction.  Seller-only; idempotent — a second call
/// returns the stored winner unchanged.
pub async fn end_auction(
    pool: &SqlitePool,
    auction_id: &str,
    actor_id: &str,
    now: i64,
) -> Result<AuctionOutcome> {
    let mut tx = pool.begin().await?;

    let auction = db::fetch_auction(&mut *tx, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    let item = db::fetch_item(&mut *tx, &auction.item_id)
        .await?
        .ok_or(MarketError::NotFound("Catalogue item"))?;
    if item.seller_id != actor_id {
        return Err(MarketError::Forbidden(
            "Only the seller can end the auction".to_string(),
        ));
    }

    if auction.status == AuctionStatus::Ended {
        drop(tx);
        return stored_outcome(pool, &auction, "Auction has already ended").await;
    }
    if auction.status == AuctionStatus::Cancelled {
        return Err(MarketError::InvalidState(
            "Cannot end a cancelled auction".to_string(),
        ));
    }

    let outcome = finalize(&mut tx, &auction, now).await?;
    tx.commit().await?;
    info!(
        auction_id,
        winner = outcome.winning_bidder_id.as_deref().unwrap_or("none"),
        "auction ended by seller"
    );
    Ok(outcome)
}

/// Current end-state view of an auction, applying lazy expiry first.
pub async fn get_auction_status(
    pool: &SqlitePool,
    auction_id: &str,
    now: i64,
) -> Result<AuctionOutcome> {
    let auction = db::fetch_auction(pool, auction_id)
        .await?
        .ok_or(MarketError::NotFound("Auction"))?;
    let auction = expire_if_due(pool, auction, now).await?;

    match auction.status {
        AuctionStatus::Ended => stored_outcome(pool, &auction, "Auction has ended").await,
        status => {
            let bids = db::list_bids(pool, auction_id).await?;
            let final_price = if bids.is_empty() {
                None
            } else {
                Some(ledger::current_price(auction.starting_price, &bids))
            };
            Ok(AuctionOutcome {
                auction_id: auction.auction_id.clone(),
                status,
                winning_bid_id: None,
                winning_bidder_id: None,
                final_price,
                can_pay: false,
                message: match status {
                    AuctionStatus::Active => "Auction is active".to_string(),
                    AuctionStatus::Scheduled => "Auction has not started yet".to_string(),
                    _ => "Auction is cancelled".to_string(),
                },
            })
        }
    }
}

/// Close every ACTIVE auction whose end time has passed.  Used by the
/// periodic sweeper and by list-shaped read paths before they project
/// auction state.  Returns the number of auctions closed.
pub async fn close_due_auctions(pool: &SqlitePool, now: i64) -> Result<usize> {
    let due: Vec<(String,)> = sqlx::query_as(
        "SELECT auction_id FROM auctions WHERE status = 'ACTIVE' AND end_time <= ?1",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    let mut closed = 0usize;
    for (auction_id,) in due {
        let mut tx = pool.begin().await?;
        let Some(auction) = db::fetch_auction(&mut *tx, &auction_id).await? else {
            continue;
        };
        if auction.status == AuctionStatus::Active && now >= auction.end_time {
            finalize(&mut tx, &auction, now).await?;
            closed += 1;
        }
        tx.commit().await?;
    }
    Ok(closed)
}
