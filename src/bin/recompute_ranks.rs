//! Rank recompute binary
//!
//! Re-rates every stored snapshot and caches the global rank of each of its
//! score rows. Run after catalog constants change.

use maimai_stats_rs::service::{MySqlStore, SnapshotService};
use maimai_stats_rs::Database;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    log::info!("Connecting to database...");
    let pool = match Database::connect().await {
        Ok(pool) => {
            log::info!("Database connection established");
            pool
        }
        Err(e) => {
            log::error!("Failed to connect to database: {e}");
            process::exit(1);
        }
    };

    let snapshots = SnapshotService::new(Arc::new(MySqlStore::new(pool)));
    match snapshots.recompute_all().await {
        Ok((ranked, 0)) => log::info!("Ranked {ranked} snapshots"),
        Ok((ranked, failed)) => {
            log::warn!("Ranked {ranked} snapshots, {failed} failed");
            process::exit(1);
        }
        Err(e) => {
            log::error!("Rank recompute failed: {e}");
            process::exit(1);
        }
    }
}
