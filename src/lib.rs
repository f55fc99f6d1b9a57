//! maimai DX player statistics server
//!
//! Logs into the official score site on a player's behalf, scrapes their
//! profile and every played chart, stores the result as immutable
//! snapshots, and ranks those snapshots into a Best 50.

pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod route;
pub mod service;

// Re-export commonly used types for convenience
pub use config::{Constants, CONFIG, MAIMAI_STATS_VERSION};
pub use error::{MaiError, MaiResult};

use sqlx::{MySql, Pool};

/// Database connection pool type alias
pub type DbPool = Pool<MySql>;

/// Database connection manager
pub struct Database;

impl Database {
    /// Create a new database connection pool and apply pending migrations
    pub async fn new(database_url: &str) -> Result<DbPool, sqlx::Error> {
        let pool = sqlx::MySqlPool::connect(database_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Connect using the configured `DATABASE_URL`
    pub async fn connect() -> Result<DbPool, sqlx::Error> {
        Self::new(&CONFIG.database_url).await
    }

    /// Check if the database connection is healthy
    pub async fn check_health(pool: &DbPool) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }
}

/// Prelude module for commonly used imports
pub mod prelude {
    pub use crate::config::{Config, Constants, CONFIG};
    pub use crate::error::{MaiError, MaiResult};
    pub use crate::model::{
        CatalogScore, CatalogSong, Credential, Difficulty, FetchState, Job, JobStatus, JobView,
        Region, Snapshot,
    };
    pub use crate::route::{success_return, ApiResponse, RouteResult};
    pub use crate::service::{JobOrchestrator, SnapshotService, Store};
    pub use crate::DbPool;
}
