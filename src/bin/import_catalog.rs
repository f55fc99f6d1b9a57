//! Song catalog import binary
//!
//! Loads a JSON array of charts into the catalog of one region and game
//! version:
//!
//! ```text
//! import_catalog <intl|jp> <game_version> <catalog.json>
//! ```

use maimai_stats_rs::model::{CatalogEntry, CatalogSong, Region};
use maimai_stats_rs::service::{MySqlStore, SongCatalog};
use maimai_stats_rs::Database;
use std::{env, fs, process};

fn usage() -> ! {
    eprintln!("Usage: import_catalog <intl|jp> <game_version> <catalog.json>");
    process::exit(2);
}

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let [region, game_version, path] = args.as_slice() else {
        usage();
    };
    let Ok(region) = region.parse::<Region>() else {
        usage();
    };
    let Ok(game_version) = game_version.parse::<i32>() else {
        usage();
    };

    let songs: Vec<CatalogSong> = match fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| {
            serde_json::from_str::<Vec<CatalogEntry>>(&raw).map_err(|e| e.to_string())
        }) {
        Ok(entries) => entries.into_iter().map(CatalogEntry::into_song).collect(),
        Err(e) => {
            log::error!("Failed to read catalog {path}: {e}");
            process::exit(1);
        }
    };
    log::info!("Read {} charts from {path}", songs.len());

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

    let store = MySqlStore::new(pool);
    match store.insert_catalog_songs(region, game_version, &songs).await {
        Ok(()) => log::info!(
            "Imported {} charts into the {region} catalog of version {game_version}",
            songs.len()
        ),
        Err(e) => {
            log::error!("Catalog import failed: {e}");
            process::exit(1);
        }
    }
}
