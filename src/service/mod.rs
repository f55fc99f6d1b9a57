pub mod auth;
pub mod client;
pub mod fetch_state;
pub mod locks;
#[cfg(test)]
pub(crate) mod mock_site;
pub mod mysql_store;
pub mod orchestrator;
pub mod parser;
pub mod rating;
pub mod scraper;
pub mod snapshots;
pub mod store;

// Re-export commonly used service types for convenience
pub use auth::{AuthResolver, ExternalSession};
pub use client::{RegionProfile, RegionProfiles};
pub use fetch_state::FetchStateTracker;
pub use mysql_store::MySqlStore;
pub use orchestrator::{JobOrchestrator, LiveSite, RemoteSite, StartedJob};
pub use scraper::{ScrapeResult, Scraper};
pub use snapshots::{Best50, SnapshotService};
pub use store::{CredentialStore, JobStore, MemoryStore, SnapshotStore, SongCatalog, Store};
