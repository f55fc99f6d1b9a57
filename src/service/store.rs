//! Persistence boundary
//!
//! The acquisition pipeline only needs a handful of operations from its
//! storage; they are grouped into the traits below so the orchestrator can
//! run against MySQL in production and against [`MemoryStore`] in tests.

use crate::error::MaiResult;
use crate::model::{
    CatalogScore, CatalogSong, FetchState, FetchSummary, Job, JobStatus, Region, ScoreRow,
    Snapshot,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Fetch job records
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> MaiResult<()>;

    async fn get_job(&self, job_id: &str) -> MaiResult<Option<Job>>;

    /// Replace the completed-state set of a job
    async fn update_job_states(&self, job_id: &str, states: &BTreeSet<FetchState>)
        -> MaiResult<()>;

    /// Move a job to a terminal status
    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<&str>,
        summary: Option<&FetchSummary>,
    ) -> MaiResult<()>;

    /// Most recently started jobs first
    async fn recent_jobs(&self, user_id: &str, region: Region, limit: usize)
        -> MaiResult<Vec<Job>>;

    async fn has_pending_job(&self, user_id: &str, region: Region) -> MaiResult<bool>;
}

/// Opaque credential strings keyed by (user, region)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_credential(&self, user_id: &str, region: Region) -> MaiResult<Option<String>>;

    async fn put_credential(&self, user_id: &str, region: Region, credential: &str)
        -> MaiResult<()>;

    async fn delete_credential(&self, user_id: &str, region: Region) -> MaiResult<()>;
}

/// Chart catalog per (region, game version)
#[async_trait]
pub trait SongCatalog: Send + Sync {
    async fn catalog_songs(&self, region: Region, game_version: i32)
        -> MaiResult<Vec<CatalogSong>>;

    async fn insert_catalog_songs(
        &self,
        region: Region,
        game_version: i32,
        songs: &[CatalogSong],
    ) -> MaiResult<()>;
}

/// Snapshots and their score rows
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert a snapshot together with its rows, atomically
    async fn insert_snapshot(&self, snapshot: &Snapshot, scores: &[ScoreRow]) -> MaiResult<()>;

    async fn get_snapshot(&self, snapshot_id: &str) -> MaiResult<Option<Snapshot>>;

    /// Snapshots of a user in a region, newest first
    async fn list_snapshots(&self, user_id: &str, region: Region) -> MaiResult<Vec<Snapshot>>;

    async fn all_snapshot_ids(&self) -> MaiResult<Vec<String>>;

    /// Score rows of a snapshot joined with their catalog charts
    async fn snapshot_scores(&self, snapshot_id: &str) -> MaiResult<Vec<CatalogScore>>;

    /// Cache global ranks (song id, rank) on the score rows of a snapshot
    async fn store_ranks(&self, snapshot_id: &str, ranks: &[(String, usize)]) -> MaiResult<()>;
}

/// Everything the acquisition pipeline persists through
pub trait Store: JobStore + CredentialStore + SongCatalog + SnapshotStore {}

impl<T: JobStore + CredentialStore + SongCatalog + SnapshotStore> Store for T {}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<String, Job>,
    credentials: HashMap<(String, Region), String>,
    catalog: Vec<(Region, i32, CatalogSong)>,
    snapshots: Vec<Snapshot>,
    scores: Vec<ScoreRow>,
    ranks: HashMap<(String, String), usize>,
}

/// In-process store
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached rank of one score row, if ranks were stored
    pub async fn cached_rank(&self, snapshot_id: &str, song_id: &str) -> Option<usize> {
        self.state
            .read()
            .await
            .ranks
            .get(&(snapshot_id.to_string(), song_id.to_string()))
            .copied()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> MaiResult<()> {
        self.state
            .write()
            .await
            .jobs
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> MaiResult<Option<Job>> {
        Ok(self.state.read().await.jobs.get(job_id).cloned())
    }

    async fn update_job_states(
        &self,
        job_id: &str,
        states: &BTreeSet<FetchState>,
    ) -> MaiResult<()> {
        if let Some(job) = self.state.write().await.jobs.get_mut(job_id) {
            job.states = states.clone();
        }
        Ok(())
    }

    async fn finish_job(
        &self,
        job_id: &str,
        status: JobStatus,
        completed_at: DateTime<Utc>,
        error_message: Option<&str>,
        summary: Option<&FetchSummary>,
    ) -> MaiResult<()> {
        if let Some(job) = self.state.write().await.jobs.get_mut(job_id) {
            job.status = status;
            job.completed_at = Some(completed_at);
            job.error_message = error_message.map(str::to_string);
            job.summary = summary.cloned();
        }
        Ok(())
    }

    async fn recent_jobs(
        &self,
        user_id: &str,
        region: Region,
        limit: usize,
    ) -> MaiResult<Vec<Job>> {
        let state = self.state.read().await;
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.user_id == user_id && job.region == region)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn has_pending_job(&self, user_id: &str, region: Region) -> MaiResult<bool> {
        Ok(self.state.read().await.jobs.values().any(|job| {
            job.user_id == user_id && job.region == region && job.status == JobStatus::Pending
        }))
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_credential(&self, user_id: &str, region: Region) -> MaiResult<Option<String>> {
        Ok(self
            .state
            .read()
            .await
            .credentials
            .get(&(user_id.to_string(), region))
            .cloned())
    }

    async fn put_credential(
        &self,
        user_id: &str,
        region: Region,
        credential: &str,
    ) -> MaiResult<()> {
        self.state
            .write()
            .await
            .credentials
            .insert((user_id.to_string(), region), credential.to_string());
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, region: Region) -> MaiResult<()> {
        self.state
            .write()
            .await
            .credentials
            .remove(&(user_id.to_string(), region));
        Ok(())
    }
}

#[async_trait]
impl SongCatalog for MemoryStore {
    async fn catalog_songs(&self, region: Region, game_version: i32) -> MaiResult<Vec<CatalogSong>> {
        Ok(self
            .state
            .read()
            .await
            .catalog
            .iter()
            .filter(|(r, v, _)| *r == region && *v == game_version)
            .map(|(_, _, song)| song.clone())
            .collect())
    }

    async fn insert_catalog_songs(
        &self,
        region: Region,
        game_version: i32,
        songs: &[CatalogSong],
    ) -> MaiResult<()> {
        let mut state = self.state.write().await;
        state
            .catalog
            .extend(songs.iter().map(|song| (region, game_version, song.clone())));
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn insert_snapshot(&self, snapshot: &Snapshot, scores: &[ScoreRow]) -> MaiResult<()> {
        let mut state = self.state.write().await;
        state.snapshots.push(snapshot.clone());
        state.scores.extend_from_slice(scores);
        Ok(())
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> MaiResult<Option<Snapshot>> {
        Ok(self
            .state
            .read()
            .await
            .snapshots
            .iter()
            .find(|s| s.id == snapshot_id)
            .cloned())
    }

    async fn list_snapshots(&self, user_id: &str, region: Region) -> MaiResult<Vec<Snapshot>> {
        let state = self.state.read().await;
        let mut snapshots: Vec<Snapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.user_id == user_id && s.region == region)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        Ok(snapshots)
    }

    async fn all_snapshot_ids(&self) -> MaiResult<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .snapshots
            .iter()
            .map(|s| s.id.clone())
            .collect())
    }

    async fn snapshot_scores(&self, snapshot_id: &str) -> MaiResult<Vec<CatalogScore>> {
        let state = self.state.read().await;
        Ok(state
            .scores
            .iter()
            .filter(|row| row.snapshot_id == snapshot_id)
            .filter_map(|row| {
                state
                    .catalog
                    .iter()
                    .find(|(_, _, song)| song.id == row.song_id)
                    .map(|(_, _, song)| CatalogScore::new(song, row))
            })
            .collect())
    }

    async fn store_ranks(&self, snapshot_id: &str, ranks: &[(String, usize)]) -> MaiResult<()> {
        let mut state = self.state.write().await;
        for (song_id, rank) in ranks {
            state
                .ranks
                .insert((snapshot_id.to_string(), song_id.clone()), *rank);
        }
        Ok(())
    }
}
