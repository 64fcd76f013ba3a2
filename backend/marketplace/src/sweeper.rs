//! Background task that closes expired auctions.
//!
//! Lazy expiry on the read paths already guarantees no auction is observed
//! as ACTIVE past its end time; the sweep closes idle auctions promptly so
//! sellers and bidders see results without waiting for the next request.

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{error, info};

use crate::closer;

/// Run the sweep loop.  Returns immediately when `interval_secs` is zero.
pub async fn run(pool: SqlitePool, interval_secs: u64) {
    if interval_secs == 0 {
        info!("Sweeper disabled; relying on lazy expiry only");
        return;
    }
    info!("Sweeper starting with a {interval_secs}s interval");

    loop {
        let now = Utc::now().timestamp();
        match closer::close_due_auctions(&pool, now).await {
            Ok(0) => {}
            Ok(closed) => info!("Sweep closed {closed} expired auctions"),
            Err(e) => error!("Sweep error: {e}"),
        }
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
}
