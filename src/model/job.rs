use crate::config::Constants;
use crate::error::MaiError;
use crate::model::credential::Region;
use crate::model::score::Difficulty;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a fetch job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

impl FromStr for JobStatus {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(MaiError::input(format!("Unknown job status: {other}"))),
        }
    }
}

/// Completion marker of one sub-task of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchState {
    Login,
    PlayerData,
    SongData(Difficulty),
}

impl FetchState {
    /// All markers a finished job carries
    pub fn all() -> Vec<FetchState> {
        let mut states = vec![FetchState::Login, FetchState::PlayerData];
        states.extend(Difficulty::ALL.into_iter().map(FetchState::SongData));
        states
    }
}

impl fmt::Display for FetchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchState::Login => f.write_str("login"),
            FetchState::PlayerData => f.write_str("player_data"),
            FetchState::SongData(difficulty) => {
                let name = match difficulty {
                    Difficulty::Basic => "easy",
                    other => other.as_str(),
                };
                write!(f, "song_data:{name}")
            }
        }
    }
}

impl FromStr for FetchState {
    type Err = MaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "login" => Ok(FetchState::Login),
            "player_data" => Ok(FetchState::PlayerData),
            "song_data:easy" => Ok(FetchState::SongData(Difficulty::Basic)),
            other => other
                .strip_prefix("song_data:")
                .and_then(|name| name.parse::<Difficulty>().ok())
                .map(FetchState::SongData)
                .ok_or_else(|| MaiError::input(format!("Unknown fetch state: {other}"))),
        }
    }
}

/// Parse the comma-separated persisted form, skipping unknown tokens
pub fn parse_states(raw: Option<&str>) -> BTreeSet<FetchState> {
    raw.unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| match s.parse() {
            Ok(state) => Some(state),
            Err(_) => {
                log::warn!("Skipping unknown fetch state '{}'", s.trim());
                None
            }
        })
        .collect()
}

pub fn serialize_states(states: &BTreeSet<FetchState>) -> String {
    states
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Percentage of the seven markers that are done, rounded
pub fn progress_percent(states: &BTreeSet<FetchState>) -> u8 {
    let total = Constants::FETCH_STATE_COUNT as f64;
    (100.0 * states.len() as f64 / total).round().min(100.0) as u8
}

pub fn is_complete(states: &BTreeSet<FetchState>) -> bool {
    FetchState::all().iter().all(|s| states.contains(s))
}

/// One run of the acquisition pipeline for a (user, region) pair
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub region: Region,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub states: BTreeSet<FetchState>,
    pub summary: Option<FetchSummary>,
}

impl Job {
    pub fn new_pending(id: String, user_id: &str, region: Region, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            region,
            status: JobStatus::Pending,
            started_at,
            completed_at: None,
            error_message: None,
            states: BTreeSet::new(),
            summary: None,
        }
    }

    pub fn progress(&self) -> u8 {
        progress_percent(&self.states)
    }
}

/// Result of a completed job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub snapshot_id: String,
    pub scores_saved: u32,
    /// Scraped charts with no catalog entry, as `name [type] difficulty`
    pub not_found: Vec<String>,
}

/// Poll-friendly view of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub region: Region,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub states: Vec<String>,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<FetchSummary>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            region: job.region,
            status: job.status,
            started_at: job.started_at,
            completed_at: job.completed_at,
            error_message: job.error_message.clone(),
            states: job.states.iter().map(ToString::to_string).collect(),
            progress: job.progress(),
            summary: job.summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(FetchState::Login.to_string(), "login");
        assert_eq!(FetchState::PlayerData.to_string(), "player_data");
        assert_eq!(
            FetchState::SongData(Difficulty::Basic).to_string(),
            "song_data:easy"
        );
        assert_eq!(
            FetchState::SongData(Difficulty::Remaster).to_string(),
            "song_data:remaster"
        );
        for state in FetchState::all() {
            assert_eq!(state.to_string().parse::<FetchState>().unwrap(), state);
        }
    }

    #[test]
    fn test_parse_states_is_lenient() {
        let states = parse_states(Some("login, bogus ,song_data:master,login"));
        assert_eq!(states.len(), 2);
        assert!(states.contains(&FetchState::Login));
        assert!(states.contains(&FetchState::SongData(Difficulty::Master)));
        assert!(parse_states(None).is_empty());
        assert!(parse_states(Some("")).is_empty());
    }

    #[test]
    fn test_progress_percent() {
        let mut states = BTreeSet::new();
        assert_eq!(progress_percent(&states), 0);
        states.insert(FetchState::Login);
        assert_eq!(progress_percent(&states), 14);
        states.insert(FetchState::PlayerData);
        assert_eq!(progress_percent(&states), 29);
        states.extend(FetchState::all());
        assert_eq!(progress_percent(&states), 100);
        assert!(is_complete(&states));
    }

    #[test]
    fn test_serialize_states() {
        let states: BTreeSet<_> = [FetchState::PlayerData, FetchState::Login].into();
        assert_eq!(serialize_states(&states), "login,player_data");
    }
}
