use crate::model::credential::Region;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Player profile as scraped from the player data page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlayerRecord {
    pub icon_url: String,
    pub display_name: String,
    pub rating: u32,
    pub title: String,
    pub stars: u32,
    pub version_play_count: u32,
    pub total_play_count: u32,
    pub class_rank_url: String,
    pub course_rank_url: String,
}

/// Immutable capture of a player's profile at fetch time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    pub user_id: String,
    pub region: Region,
    pub fetched_at: DateTime<Utc>,
    pub game_version: i32,
    #[serde(flatten)]
    pub player: RawPlayerRecord,
}
