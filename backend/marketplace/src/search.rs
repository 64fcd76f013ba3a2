//! Catalogue-facing auction search.
//!
//! Keyword, category, and status filters run in SQL; the price-range filter
//! applies to the *current* bidding price, which is derived from bids, so it
//! filters in Rust after the rows come back.  Pagination happens on the
//! filtered set.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::closer;
use crate::db;
use crate::errors::Result;
use crate::ledger;
use crate::models::{AuctionStatus, AuctionType, Cents};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub keyword: Option<String>,
    pub category_id: Option<String>,
    pub status: Option<AuctionStatus>,
    pub min_price: Option<Cents>,
    pub max_price: Option<Cents>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            keyword: None,
            category_id: None,
            status: None,
            min_price: None,
            max_price: None,
            skip: 0,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct AuctionSummary {
    pub auction_id: String,
    pub item_id: String,
    pub title: String,
    pub description: Option<String>,
    pub current_bidding_price: Cents,
    pub auction_type: AuctionType,
    pub remaining_time_seconds: Option<i64>,
    pub status: AuctionStatus,
    pub seller_id: String,
    pub category_id: Option<String>,
    pub current_highest_bidder_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub items: Vec<AuctionSummary>,
    pub total_count: usize,
    pub has_more: bool,
}

pub async fn search_auctions(
    pool: &SqlitePool,
    req: &SearchRequest,
    now: i64,
) -> Result<SearchResponse> {
    // Read path: auctions past their end time must not surface as ACTIVE.
    closer::close_due_auctions(pool, now).await?;

    let mut sql = String::from(
        r#"
        SELECT a.auction_id, a.auction_type, a.starting_price, a.end_time, a.status,
               i.item_id, i.title, i.description, i.seller_id, i.category_id
        FROM   auctions a
        JOIN   catalogue_items i ON i.item_id = a.item_id
        WHERE  1 = 1
        "#,
    );
    if req.keyword.is_some() {
        sql.push_str(" AND (i.title LIKE ? OR i.description LIKE ? OR i.keywords LIKE ?)");
    }
    if req.category_id.is_some() {
        sql.push_str(" AND i.category_id = ?");
    }
    if req.status.is_some() {
        sql.push_str(" AND a.status = ?");
    }
    sql.push_str(" ORDER BY a.end_time ASC, a.auction_id ASC");

    let pattern = req.keyword.as_ref().map(|k| format!("%{k}%"));
    let mut query = sqlx::query(&sql);
    if let Some(pattern) = &pattern {
        query = query.bind(pattern).bind(pattern).bind(pattern);
    }
    if let Some(category_id) = &req.category_id {
        query = query.bind(category_id);
    }
    if let Some(status) = req.status {
        query = query.bind(status);
    }
    let rows: Vec<SqliteRow> = query.fetch_all(pool).await?;

    // Derive the current price per auction, then apply the price window.
    let mut matches = Vec::with_capacity(rows.len());
    for row in rows {
        let auction_id: String = row.try_get("auction_id")?;
        let starting_price: Cents = row.try_get("starting_price")?;
        let status: AuctionStatus = row.try_get("status")?;
        let end_time: i64 = row.try_get("end_time")?;

        let bids = db::list_bids(pool, &auction_id).await?;
        let current_price = ledger::current_price(starting_price, &bids);
        if let Some(min) = req.min_price {
            if current_price < min {
                continue;
            }
        }
        if let Some(max) = req.max_price {
            if current_price > max {
                continue;
            }
        }

        matches.push(AuctionSummary {
            auction_id,
            item_id: row.try_get("item_id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            current_bidding_price: current_price,
            auction_type: row.try_get("auction_type")?,
            remaining_time_seconds: ledger::remaining_seconds(status, end_time, now),
            status,
            seller_id: row.try_get("seller_id")?,
            category_id: row.try_get("category_id")?,
            current_highest_bidder_id: ledger::leader(&bids).map(|b| b.bidder_id.clone()),
        });
    }

    let total_count = matches.len();
    let skip = req.skip.max(0) as usize;
    let limit = req.limit.clamp(1, 100) as usize;
    let items: Vec<AuctionSummary> = matches.into_iter().skip(skip).take(limit).collect();
    let has_more = skip + limit < total_count;

    Ok(SearchResponse {
        items,
        total_count,
        has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidding;
    use crate::db::testutil;

    async fn seed_titled_item(
        pool: &SqlitePool,
        seller: &str,
        title: &str,
        keywords: &str,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO catalogue_items
                (item_id, seller_id, title, description, keywords, base_price,
                 shipping_price_normal, shipping_price_expedited, shipping_time_days,
                 is_active, created_at)
             VALUES (?1, ?2, ?3, 'desc', ?4, 10000, 1000, 2500, 5, 1, 0)",
        )
        .bind(&id)
        .bind(seller)
        .bind(title)
        .bind(keywords)
        .execute(pool)
        .await
        .expect("seed item");
        id
    }

    #[tokio::test]
    async fn keyword_filter_matches_title_and_keywords() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let camera = seed_titled_item(&pool, &seller, "Vintage camera", "photo").await;
        let guitar = seed_titled_item(&pool, &seller, "Bass guitar", "music,strings").await;
        testutil::seed_auction(&pool, &camera, AuctionStatus::Active, 10_000, 100, 0, 10_000)
            .await;
        testutil::seed_auction(&pool, &guitar, AuctionStatus::Active, 20_000, 100, 0, 10_000)
            .await;

        let by_title = search_auctions(
            &pool,
            &SearchRequest {
                keyword: Some("camera".to_string()),
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(by_title.total_count, 1);
        assert_eq!(by_title.items[0].title, "Vintage camera");

        let by_keyword = search_auctions(
            &pool,
            &SearchRequest {
                keyword: Some("strings".to_string()),
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(by_keyword.total_count, 1);
        assert_eq!(by_keyword.items[0].title, "Bass guitar");
    }

    #[tokio::test]
    async fn price_window_uses_current_bidding_price() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let bidder = testutil::seed_user(&pool, "bidder").await;
        let item = seed_titled_item(&pool, &seller, "Vintage camera", "photo").await;
        let auction = testutil::seed_auction(
            &pool, &item, AuctionStatus::Active, 10_000, 100, 0, 10_000,
        )
        .await;
        bidding::place_bid(&pool, &auction, &bidder, 15_000, 10)
            .await
            .unwrap();

        // Window above the starting price but covering the latest bid.
        let hit = search_auctions(
            &pool,
            &SearchRequest {
                min_price: Some(12_000),
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(hit.total_count, 1);
        assert_eq!(hit.items[0].current_bidding_price, 15_000);
        assert_eq!(
            hit.items[0].current_highest_bidder_id,
            Some(bidder.clone())
        );

        let miss = search_auctions(
            &pool,
            &SearchRequest {
                max_price: Some(12_000),
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(miss.total_count, 0);
    }

    #[tokio::test]
    async fn status_filter_and_lazy_expiry_interact() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        let item = seed_titled_item(&pool, &seller, "Vintage camera", "photo").await;
        testutil::seed_auction(&pool, &item, AuctionStatus::Active, 10_000, 100, 0, 1_000)
            .await;

        // The auction expired at 1_000; searching for ACTIVE at 2_000 must
        // not surface it, and searching ENDED must.
        let active = search_auctions(
            &pool,
            &SearchRequest {
                status: Some(AuctionStatus::Active),
                ..Default::default()
            },
            2_000,
        )
        .await
        .unwrap();
        assert_eq!(active.total_count, 0);

        let ended = search_auctions(
            &pool,
            &SearchRequest {
                status: Some(AuctionStatus::Ended),
                ..Default::default()
            },
            2_000,
        )
        .await
        .unwrap();
        assert_eq!(ended.total_count, 1);
        assert_eq!(ended.items[0].remaining_time_seconds, None);
    }

    #[tokio::test]
    async fn pagination_reports_has_more() {
        let pool = testutil::pool().await;
        let seller = testutil::seed_user(&pool, "seller").await;
        for i in 0..3 {
            let item =
                seed_titled_item(&pool, &seller, &format!("Lot {i}"), "lot").await;
            testutil::seed_auction(&pool, &item, AuctionStatus::Active, 10_000, 100, 0, 10_000)
                .await;
        }

        let first = search_auctions(
            &pool,
            &SearchRequest {
                limit: 2,
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(first.total_count, 3);
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);

        let second = search_auctions(
            &pool,
            &SearchRequest {
                skip: 2,
                limit: 2,
                ..Default::default()
            },
            100,
        )
        .await
        .unwrap();
        assert_eq!(second.items.len(), 1);
        assert!(!second.has_more);
    }
}
