pub mod credential;
pub mod job;
pub mod player;
pub mod score;

// Re-export commonly used types for convenience
pub use credential::{is_valid_cookie, Credential, Region};

pub use job::{FetchState, FetchSummary, Job, JobStatus, JobView};

pub use player::{RawPlayerRecord, Snapshot};

pub use score::{
    CatalogEntry, CatalogScore, CatalogSong, Difficulty, FullCombo, FullSync, MusicType,
    RankedSong, RawScoreRecord, ScoreRow, ScoredSong,
};
