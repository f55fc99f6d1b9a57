use crate::error::MaiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chart difficulty tier scraped from the record pages (utage excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Advanced,
    Expert,
    Master,
    Remaster,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Basic,
        Difficulty::Advanced,
        Difficulty::Expert,
        Difficulty::Master,
        Difficulty::Remaster,
    ];

    /// Tier index as used by the record listing pages (0..=4)
    pub fn index(&self) -> u8 {
        match self {
            Difficulty::Basic => 0,
            Difficulty::Advanced => 1,
            Difficulty::Expert => 2,
            Difficulty::Master => 3,
            Difficulty::Remaster => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Basic => "basic",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
            Difficulty::Master => "master",
            Difficulty::Remaster => "remaster",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| MaiError::input(format!("Unknown difficulty: {s}")))
    }
}

/// Chart type: standard or deluxe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicType {
    #[serde(rename = "std")]
    Standard,
    #[serde(rename = "dx")]
    Dx,
}

impl MusicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MusicType::Standard => "std",
            MusicType::Dx => "dx",
        }
    }
}

impl FromStr for MusicType {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "std" => Ok(MusicType::Standard),
            "dx" => Ok(MusicType::Dx),
            other => Err(MaiError::input(format!("Unknown music type: {other}"))),
        }
    }
}

/// Full combo badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullCombo {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "fc")]
    Fc,
    #[serde(rename = "fc+")]
    FcPlus,
    #[serde(rename = "ap")]
    Ap,
    #[serde(rename = "ap+")]
    ApPlus,
}

impl FullCombo {
    pub fn as_str(&self) -> &'static str {
        match self {
            FullCombo::None => "none",
            FullCombo::Fc => "fc",
            FullCombo::FcPlus => "fc+",
            FullCombo::Ap => "ap",
            FullCombo::ApPlus => "ap+",
        }
    }

    /// Badge from a record page icon file stem, e.g. `music_icon_fcp`
    pub fn from_icon(stem: &str) -> Option<Self> {
        match stem.strip_prefix("music_icon_")? {
            "fc" => Some(FullCombo::Fc),
            "fcp" => Some(FullCombo::FcPlus),
            "ap" => Some(FullCombo::Ap),
            "app" => Some(FullCombo::ApPlus),
            _ => None,
        }
    }
}

impl FromStr for FullCombo {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FullCombo::None),
            "fc" => Ok(FullCombo::Fc),
            "fc+" => Ok(FullCombo::FcPlus),
            "ap" => Ok(FullCombo::Ap),
            "ap+" => Ok(FullCombo::ApPlus),
            other => Err(MaiError::input(format!("Unknown full combo: {other}"))),
        }
    }
}

/// Full sync badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullSync {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "sync")]
    Sync,
    #[serde(rename = "fs")]
    Fs,
    #[serde(rename = "fs+")]
    FsPlus,
    #[serde(rename = "fdx")]
    Fdx,
    #[serde(rename = "fdx+")]
    FdxPlus,
}

impl FullSync {
    pub fn as_str(&self) -> &'static str {
        match self {
            FullSync::None => "none",
            FullSync::Sync => "sync",
            FullSync::Fs => "fs",
            FullSync::FsPlus => "fs+",
            FullSync::Fdx => "fdx",
            FullSync::FdxPlus => "fdx+",
        }
    }

    /// Badge from a record page icon file stem, e.g. `music_icon_fsdp`
    pub fn from_icon(stem: &str) -> Option<Self> {
        match stem.strip_prefix("music_icon_")? {
            "sync" => Some(FullSync::Sync),
            "fs" => Some(FullSync::Fs),
            "fsp" => Some(FullSync::FsPlus),
            "fsd" | "fdx" => Some(FullSync::Fdx),
            "fsdp" | "fdxp" => Some(FullSync::FdxPlus),
            _ => None,
        }
    }
}

impl FromStr for FullSync {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(FullSync::None),
            "sync" => Ok(FullSync::Sync),
            "fs" => Ok(FullSync::Fs),
            "fs+" => Ok(FullSync::FsPlus),
            "fdx" => Ok(FullSync::Fdx),
            "fdx+" => Ok(FullSync::FdxPlus),
            other => Err(MaiError::input(format!("Unknown full sync: {other}"))),
        }
    }
}

/// One played chart as scraped from a record listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawScoreRecord {
    pub song_name: String,
    pub level_label: String,
    pub music_type: MusicType,
    pub difficulty: Difficulty,
    /// Percent with four implied decimals: 991234 = 99.1234%
    pub achievement: u32,
    pub dx_score: u32,
    pub full_combo: FullCombo,
    pub full_sync: FullSync,
}

impl RawScoreRecord {
    /// Label used when reporting a chart missing from the catalog
    pub fn chart_label(&self) -> String {
        format!(
            "{} [{}] {}",
            self.song_name,
            self.music_type.as_str(),
            self.difficulty
        )
    }
}

/// Chart entry of the local song catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSong {
    pub id: String,
    pub song_name: String,
    pub difficulty: Difficulty,
    pub music_type: MusicType,
    pub level_label: String,
    /// Chart constant times ten: 14.7 = 147
    pub level_precise: i32,
    /// Game version epoch the chart was added in
    pub added_version: i32,
}

/// Chart entry of an importable catalog file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub song_name: String,
    pub difficulty: Difficulty,
    #[serde(rename = "type")]
    pub music_type: MusicType,
    pub level: String,
    /// Chart constant as printed, e.g. 14.7
    pub level_precise: f64,
    pub added_version: i32,
}

impl CatalogEntry {
    pub fn into_song(self) -> CatalogSong {
        CatalogSong {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            song_name: self.song_name,
            difficulty: self.difficulty,
            music_type: self.music_type,
            level_label: self.level,
            level_precise: (self.level_precise * 10.0).round() as i32,
            added_version: self.added_version,
        }
    }
}

/// Persisted per-song row of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub id: String,
    pub snapshot_id: String,
    pub song_id: String,
    pub achievement: u32,
    pub dx_score: u32,
    pub full_combo: FullCombo,
    pub full_sync: FullSync,
}

/// A score row joined with its catalog chart; the input of the rating engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogScore {
    pub song_id: String,
    pub song_name: String,
    pub difficulty: Difficulty,
    pub music_type: MusicType,
    pub level_label: String,
    pub level_precise: i32,
    pub added_version: i32,
    pub achievement: u32,
    pub dx_score: u32,
    pub full_combo: FullCombo,
    pub full_sync: FullSync,
}

impl CatalogScore {
    pub fn new(song: &CatalogSong, row: &ScoreRow) -> Self {
        Self {
            song_id: song.id.clone(),
            song_name: song.song_name.clone(),
            difficulty: song.difficulty,
            music_type: song.music_type,
            level_label: song.level_label.clone(),
            level_precise: song.level_precise,
            added_version: song.added_version,
            achievement: row.achievement,
            dx_score: row.dx_score,
            full_combo: row.full_combo,
            full_sync: row.full_sync,
        }
    }
}

/// Catalog score with its derived rating. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSong {
    #[serde(flatten)]
    pub score: CatalogScore,
    pub rating: u32,
}

/// Scored song with its position in the global ranking.
/// 0..15 current-era best, 15..50 legacy-era best, 50.. remainder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSong {
    #[serde(flatten)]
    pub song: ScoredSong,
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_index_roundtrip() {
        for d in Difficulty::ALL {
            assert_eq!(Difficulty::from_index(d.index()), Some(d));
        }
        assert_eq!(Difficulty::from_index(5), None);
    }

    #[test]
    fn test_badges_from_icon_stems() {
        assert_eq!(FullCombo::from_icon("music_icon_app"), Some(FullCombo::ApPlus));
        assert_eq!(FullCombo::from_icon("music_icon_fc"), Some(FullCombo::Fc));
        assert_eq!(FullCombo::from_icon("music_icon_back"), None);
        assert_eq!(FullSync::from_icon("music_icon_fsdp"), Some(FullSync::FdxPlus));
        assert_eq!(FullSync::from_icon("music_icon_sync"), Some(FullSync::Sync));
        assert_eq!(FullSync::from_icon("music_icon_fc"), None);
    }

    #[test]
    fn test_catalog_entry() {
        let entry: CatalogEntry = serde_json::from_str(
            r#"{"song_name": "Oshama Scramble!", "difficulty": "master", "type": "std",
                "level": "12+", "level_precise": 12.7, "added_version": 0}"#,
        )
        .unwrap();
        let song = entry.into_song();
        assert_eq!(song.level_precise, 127);
        assert_eq!(song.music_type, MusicType::Standard);
        assert_eq!(song.level_label, "12+");
        assert!(!song.id.is_empty());
    }

    #[test]
    fn test_badge_serde_names() {
        assert_eq!(serde_json::to_string(&FullCombo::FcPlus).unwrap(), "\"fc+\"");
        assert_eq!(serde_json::to_string(&FullSync::FdxPlus).unwrap(), "\"fdx+\"");
        assert_eq!(serde_json::to_string(&MusicType::Dx).unwrap(), "\"dx\"");
        assert_eq!("ap+".parse::<FullCombo>().unwrap(), FullCombo::ApPlus);
    }
}
