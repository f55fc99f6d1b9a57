//! Fetch job orchestration
//!
//! [`JobOrchestrator::start_job`] validates the request and records a pending
//! job under a per-(user, region) lock, then hands the job to a supervised
//! background task: authenticate, scrape, match against the song catalog and
//! persist a snapshot. Whatever happens inside that task ends with the job in
//! a terminal state.

use crate::config::{Config, Constants};
use crate::error::{MaiError, MaiResult};
use crate::model::{
    CatalogSong, Credential, Difficulty, FetchState, FetchSummary, Job, JobStatus, MusicType,
    RawScoreRecord, Region, ScoreRow, Snapshot,
};
use crate::service::auth::{check_supported, AuthResolver, ExternalSession};
use crate::service::fetch_state::FetchStateTracker;
use crate::service::locks::KeyedLocks;
use crate::service::scraper::{ScrapeResult, Scraper};
use crate::service::store::{CredentialStore, JobStore, SnapshotStore, SongCatalog, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// The game data site as seen by a job
#[async_trait]
pub trait RemoteSite: Send + Sync {
    async fn authenticate(
        &self,
        user_id: &str,
        region: Region,
        credential: &Credential,
    ) -> MaiResult<ExternalSession>;

    async fn scrape(
        &self,
        job_id: &str,
        region: Region,
        session: &ExternalSession,
    ) -> MaiResult<ScrapeResult>;
}

/// Live site access through the auth resolver and the scraper
pub struct LiveSite {
    resolver: AuthResolver,
    scraper: Scraper,
}

impl LiveSite {
    pub fn new(resolver: AuthResolver, scraper: Scraper) -> Self {
        Self { resolver, scraper }
    }
}

#[async_trait]
impl RemoteSite for LiveSite {
    async fn authenticate(
        &self,
        user_id: &str,
        region: Region,
        credential: &Credential,
    ) -> MaiResult<ExternalSession> {
        self.resolver.resolve(user_id, region, credential).await
    }

    async fn scrape(
        &self,
        job_id: &str,
        region: Region,
        session: &ExternalSession,
    ) -> MaiResult<ScrapeResult> {
        self.scraper.scrape(job_id, region, session).await
    }
}

/// A job that was accepted and is running in the background
pub struct StartedJob {
    pub job_id: String,
    /// Resolves to the terminal status once the job has been finalized
    pub task: JoinHandle<JobStatus>,
}

#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn Store>,
    site: Arc<dyn RemoteSite>,
    tracker: FetchStateTracker,
    keys: KeyedLocks<(String, Region)>,
    config: Config,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        site: Arc<dyn RemoteSite>,
        tracker: FetchStateTracker,
        config: Config,
    ) -> Self {
        Self {
            store,
            site,
            tracker,
            keys: KeyedLocks::new(),
            config,
        }
    }

    /// Accept a fetch request for (user, region) and start it in the background.
    ///
    /// The credential, pending-job and rate-limit checks and the job insert
    /// happen under one per-key lock, so concurrent calls for the same key
    /// cannot both pass.
    pub async fn start_job(
        &self,
        user_id: &str,
        region: Region,
        credential: Option<&str>,
    ) -> MaiResult<StartedJob> {
        let supplied = credential
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(Credential::parse)
            .transpose()?;
        if let Some(credential) = &supplied {
            check_supported(region, credential)?;
        }

        let _guard = self.keys.lock((user_id.to_string(), region)).await;

        let credential = match &supplied {
            Some(credential) => credential.clone(),
            None => {
                let stored = self
                    .store
                    .get_credential(user_id, region)
                    .await?
                    .ok_or_else(MaiError::credential_required)?;
                match Credential::parse(&stored) {
                    Ok(credential) => credential,
                    Err(e) => {
                        log::warn!("Dropping unreadable credential of user {user_id} in {region}");
                        if let Err(del) = self.store.delete_credential(user_id, region).await {
                            log::error!(
                                "Failed to delete credential of user {user_id} in {region}: {del}"
                            );
                        }
                        return Err(e);
                    }
                }
            }
        };

        if self.store.has_pending_job(user_id, region).await? {
            return Err(MaiError::job_running());
        }

        let now = Utc::now();
        self.check_rate_limit(user_id, region, now).await?;

        if let Some(credential) = &supplied {
            self.store
                .put_credential(user_id, region, &credential.to_stored())
                .await?;
            log::info!(
                "Stored new {} credential of user {user_id} in {region}",
                credential.kind()
            );
        }

        let job = Job::new_pending(Uuid::new_v4().to_string(), user_id, region, now);
        self.store.insert_job(&job).await?;
        log::info!("Started fetch job {} for user {user_id} in {region}", job.id);

        let job_id = job.id.clone();
        let task = self.spawn_supervised(job, credential);
        Ok(StartedJob { job_id, task })
    }

    /// Latest job of (user, region), whatever its status
    pub async fn get_status(&self, user_id: &str, region: Region) -> MaiResult<Option<Job>> {
        Ok(self
            .store
            .recent_jobs(user_id, region, 1)
            .await?
            .into_iter()
            .next())
    }

    /// Poll [`Self::get_status`] until the latest job is terminal, giving up
    /// after the standard client window.
    pub async fn poll_until_finished(&self, user_id: &str, region: Region) -> MaiResult<Job> {
        self.poll_with(
            user_id,
            region,
            Constants::POLL_ATTEMPTS,
            Duration::from_millis(Constants::POLL_INTERVAL_MS),
        )
        .await
    }

    pub async fn poll_with(
        &self,
        user_id: &str,
        region: Region,
        attempts: u32,
        interval: Duration,
    ) -> MaiResult<Job> {
        for attempt in 0..attempts {
            match self.get_status(user_id, region).await? {
                Some(job) if job.status.is_terminal() => return Ok(job),
                Some(_) => {}
                None => return Err(MaiError::no_data("No fetch job found for this region")),
            }
            if attempt + 1 < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(MaiError::timeout(
            "Fetch is taking too long. Check back later for the result.",
        ))
    }

    /// Sliding window over the most recent job starts of the key
    async fn check_rate_limit(
        &self,
        user_id: &str,
        region: Region,
        now: DateTime<Utc>,
    ) -> MaiResult<()> {
        let limit = Constants::FETCH_RATE_LIMIT_COUNT;
        let recent = self.store.recent_jobs(user_id, region, limit).await?;
        let Some(oldest) = recent.get(limit - 1) else {
            return Ok(());
        };

        let window_ms = Constants::FETCH_RATE_LIMIT_WINDOW_SECS * 1000;
        let elapsed_ms = (now - oldest.started_at).num_milliseconds().max(0);
        if elapsed_ms >= window_ms {
            return Ok(());
        }

        let retry_after = (window_ms - elapsed_ms + 999) / 1000;
        log::info!("Rate limited user {user_id} in {region} for {retry_after}s");
        Err(MaiError::rate_limit(
            retry_after as u64,
            limit,
            Constants::FETCH_RATE_LIMIT_WINDOW_SECS as u64,
        ))
    }

    /// Run the job in its own task and finalize it as failed if that task dies
    fn spawn_supervised(&self, job: Job, credential: Credential) -> JoinHandle<JobStatus> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let job_id = job.id.clone();
            let span = tracing::info_span!("fetch_job", job_id = %job.id, region = %job.region);
            let worker = tokio::spawn(orchestrator.clone().run(job, credential).instrument(span));
            match worker.await {
                Ok(status) => status,
                Err(e) => {
                    log::error!("Fetch job {job_id} task aborted: {e}");
                    orchestrator
                        .finish(
                            &job_id,
                            JobStatus::Failed,
                            Some("Fetch task aborted unexpectedly"),
                            None,
                        )
                        .await;
                    JobStatus::Failed
                }
            }
        })
    }

    async fn run(self, job: Job, credential: Credential) -> JobStatus {
        match self.acquire(&job, &credential).await {
            Ok(summary) => {
                log::info!(
                    "Fetch job {} completed: {} scores saved, {} not in catalog",
                    job.id,
                    summary.scores_saved,
                    summary.not_found.len()
                );
                self.finish(&job.id, JobStatus::Completed, None, Some(&summary))
                    .await;
                JobStatus::Completed
            }
            Err(e) => {
                log::error!("Fetch job {} failed: {e}", job.id);
                let message = e.to_string();
                self.finish(&job.id, JobStatus::Failed, Some(&message), None)
                    .await;
                JobStatus::Failed
            }
        }
    }

    async fn acquire(&self, job: &Job, credential: &Credential) -> MaiResult<FetchSummary> {
        let session = self
            .site
            .authenticate(&job.user_id, job.region, credential)
            .await?;
        self.tracker.append_state(&job.id, FetchState::Login).await;

        let scraped = self.site.scrape(&job.id, job.region, &session).await?;

        let game_version = self.config.game_version(job.region);
        let catalog = self.store.catalog_songs(job.region, game_version).await?;
        let snapshot = Snapshot {
            id: Uuid::new_v4().to_string(),
            user_id: job.user_id.clone(),
            region: job.region,
            fetched_at: Utc::now(),
            game_version,
            player: scraped.player,
        };
        let (rows, not_found) = match_catalog(&snapshot.id, &catalog, &scraped.scores);
        if !not_found.is_empty() {
            log::warn!(
                "{} scraped charts of job {} are missing from the {} v{game_version} catalog",
                not_found.len(),
                job.id,
                job.region
            );
        }

        self.store.insert_snapshot(&snapshot, &rows).await?;

        Ok(FetchSummary {
            snapshot_id: snapshot.id,
            scores_saved: rows.len() as u32,
            not_found,
        })
    }

    async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
        summary: Option<&FetchSummary>,
    ) {
        if let Err(e) = self
            .store
            .finish_job(job_id, status, Utc::now(), error_message, summary)
            .await
        {
            log::error!("Failed to mark job {job_id} as {}: {e}", status.as_str());
        }
    }
}

/// Pair scraped records with catalog charts by (name, difficulty, type).
/// Records without a chart are reported by label; repeated charts keep the first row.
pub fn match_catalog(
    snapshot_id: &str,
    catalog: &[CatalogSong],
    records: &[RawScoreRecord],
) -> (Vec<ScoreRow>, Vec<String>) {
    let index: HashMap<(&str, Difficulty, MusicType), &CatalogSong> = catalog
        .iter()
        .map(|song| ((song.song_name.as_str(), song.difficulty, song.music_type), song))
        .collect();

    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut not_found = Vec::new();
    for record in records {
        let key = (record.song_name.as_str(), record.difficulty, record.music_type);
        let Some(song) = index.get(&key) else {
            not_found.push(record.chart_label());
            continue;
        };
        if !seen.insert(song.id.as_str()) {
            continue;
        }
        rows.push(ScoreRow {
            id: Uuid::new_v4().to_string(),
            snapshot_id: snapshot_id.to_string(),
            song_id: song.id.clone(),
            achievement: record.achievement,
            dx_score: record.dx_score,
            full_combo: record.full_combo,
            full_sync: record.full_sync,
        });
    }
    (rows, not_found)
}
