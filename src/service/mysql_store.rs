//! MySQL implementation of the storage traits

use crate::error::{MaiError, MaiResult};
use crate::model::job::{parse_states, serialize_states};
use crate::model::{
    CatalogScore, CatalogSong, FetchState, FetchSummary, Job, JobStatus, RawPlayerRecord, Region,
    ScoreRow, Snapshot,
};
use crate::service::store::{CredentialStore, JobStore, SnapshotStore, SongCatalog};
use crate::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, MySql, QueryBuilder};
use std::collections::BTreeSet;

/// Rows per multi-value insert
const INSERT_CHUNK: usize = 500;

#[derive(FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    region: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    states: Option<String>,
    summary: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = MaiError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let summary = row.summary.as_deref().and_then(|raw| {
            serde_json::from_str::<FetchSummary>(raw)
                .map_err(|e| log::warn!("Ignoring unreadable summary of job {}: {e}", row.id))
                .ok()
        });
        Ok(Job {
            region: row.region.parse()?,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            states: parse_states(row.states.as_deref()),
            summary,
            user_id: row.user_id,
            id: row.id,
        })
    }
}

#[derive(FromRow)]
struct SongRow {
    id: String,
    song_name: String,
    difficulty: String,
    music_type: String,
    level_label: String,
    level_precise: i32,
    added_version: i32,
}

impl TryFrom<SongRow> for CatalogSong {
    type Error = MaiError;

    fn try_from(row: SongRow) -> Result<Self, Self::Error> {
        Ok(CatalogSong {
            difficulty: row.difficulty.parse()?,
            music_type: row.music_type.parse()?,
            id: row.id,
            song_name: row.song_name,
            level_label: row.level_label,
            level_precise: row.level_precise,
            added_version: row.added_version,
        })
    }
}

#[derive(FromRow)]
struct SnapshotRow {
    id: String,
    user_id: String,
    region: String,
    fetched_at: DateTime<Utc>,
    game_version: i32,
    rating: u32,
    display_name: String,
    title: String,
    icon_url: String,
    stars: u32,
    version_play_count: u32,
    total_play_count: u32,
    class_rank_url: String,
    course_rank_url: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = MaiError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        Ok(Snapshot {
            region: row.region.parse()?,
            id: row.id,
            user_id: row.user_id,
            fetched_at: row.fetched_at,
            game_version: row.game_version,
            player: RawPlayerRecord {
                icon_url: row.icon_url,
                display_name: row.display_name,
                rating: row.rating,
                title: row.title,
                stars: row.stars,
                version_play_count: row.version_play_count,
                total_play_count: row.total_play_count,
                class_rank_url: row.class_rank_url,
                course_rank_url: row.course_rank_url,
            },
        })
    }
}

#[derive(FromRow)]
struct CatalogScoreRow {
    song_id: String,
    song_name: String,
    difficulty: String,
    music_type: String,
    level_label: String,
    level_precise: i32,
    added_version: i32,
    achievement: u32,
    dx_score: u32,
    fc: String,
    fs: String,
}

impl TryFrom<CatalogScoreRow> for CatalogScore {
    type Error = MaiError;

    fn try_from(row: CatalogScoreRow) -> Result<Self, Self::Error> {
        Ok(CatalogScore {
            difficulty: row.difficulty.parse()?,
            music_type: row.music_type.parse()?,
            full_combo: row.fc.parse()?,
            full_sync: row.fs.parse()?,
            song_id: row.song_id,
            song_name: row.song_name,
            level_label: row.level_label,
            level_precise: row.level_precise,
            added_version: row.added_version,
            achievement: row.achievement,
            dx_score: row.dx_score,
        })
    }
}

const JOB_COLUMNS: &str =
    "id, user_id, region, status, started_at, completed_at, error_message, states, summary";

const SNAPSHOT_COLUMNS: &str = "id, user_id, region, fetched_at, game_version, rating, \
     display_name, title, icon_url, stars, version_play_count, total_play_count, \
     class_rank_url, course_rank_url";

/// Store backed by the server's MySQL pool
#[derive(Clone)]
pub struct MySqlStore {
    pool: DbPool,
}

impl MySqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for MySqlStore {
    async fn insert_job(&self, job: &Job) -> MaiResult<()> {
        let summary = job.summary.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO fetch_jobs (id, user_id, region, status, started_at, completed_at, \
             error_message, states, summary) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.user_id)
        .bind(job.region.as_str())
        .bind(job.status.as_str())
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.error_message)
        .bind(serialize_states(&job.states))
        .bind(summary)
        .execute(&self.pool)
        .await
        .map_err(|e| MaiError::Database {
            message: format!("Failed to insert fetch job: {e}"),
        })?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> MaiResult<Option<Job>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM fetch_jobs WHERE id = ?"))
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Job::try_from).transpose()
    }

    async fn update_job_states(
        &self,
        job_id: &str,
        states: &BTreeSet<FetchState>,
    ) -> MaiResult<()> {
        sqlx::query("UPDATE fetch_jobs SET states = ? WHERE id = ?")
            .bind(serialize_states(states))
            .bind(job_id)
            .execute(&self.pool)
            .await?;
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
        let summary = summary.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "UPDATE fetch_jobs SET status = ?, completed_at = ?, error_message = ?, summary = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(error_message)
        .bind(summary)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MaiError::Database {
            message: format!("Failed to finish fetch job {job_id}: {e}"),
        })?;
        Ok(())
    }

    async fn recent_jobs(
        &self,
        user_id: &str,
        region: Region,
        limit: usize,
    ) -> MaiResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM fetch_jobs WHERE user_id = ? AND region = ? \
             ORDER BY started_at DESC LIMIT ?"
        ))
        .bind(user_id)
        .bind(region.as_str())
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn has_pending_job(&self, user_id: &str, region: Region) -> MaiResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM fetch_jobs WHERE user_id = ? AND region = ? AND status = ?",
        )
        .bind(user_id)
        .bind(region.as_str())
        .bind(JobStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl CredentialStore for MySqlStore {
    async fn get_credential(&self, user_id: &str, region: Region) -> MaiResult<Option<String>> {
        let credential: Option<String> = sqlx::query_scalar(
            "SELECT credential FROM user_credentials WHERE user_id = ? AND region = ?",
        )
        .bind(user_id)
        .bind(region.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn put_credential(
        &self,
        user_id: &str,
        region: Region,
        credential: &str,
    ) -> MaiResult<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO user_credentials (user_id, region, credential, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON DUPLICATE KEY UPDATE credential = VALUES(credential), updated_at = VALUES(updated_at)",
        )
        .bind(user_id)
        .bind(region.as_str())
        .bind(credential)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_credential(&self, user_id: &str, region: Region) -> MaiResult<()> {
        sqlx::query("DELETE FROM user_credentials WHERE user_id = ? AND region = ?")
            .bind(user_id)
            .bind(region.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SongCatalog for MySqlStore {
    async fn catalog_songs(&self, region: Region, game_version: i32) -> MaiResult<Vec<CatalogSong>> {
        let rows: Vec<SongRow> = sqlx::query_as(
            "SELECT id, song_name, difficulty, music_type, level_label, level_precise, added_version \
             FROM songs WHERE region = ? AND game_version = ?",
        )
        .bind(region.as_str())
        .bind(game_version)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CatalogSong::try_from).collect()
    }

    async fn insert_catalog_songs(
        &self,
        region: Region,
        game_version: i32,
        songs: &[CatalogSong],
    ) -> MaiResult<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in songs.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT INTO songs (id, song_name, difficulty, music_type, level_label, \
                 level_precise, added_version, region, game_version) ",
            );
            builder.push_values(chunk, |mut b, song| {
                b.push_bind(&song.id)
                    .push_bind(&song.song_name)
                    .push_bind(song.difficulty.as_str())
                    .push_bind(song.music_type.as_str())
                    .push_bind(&song.level_label)
                    .push_bind(song.level_precise)
                    .push_bind(song.added_version)
                    .push_bind(region.as_str())
                    .push_bind(game_version);
            });
            builder.push(
                " ON DUPLICATE KEY UPDATE level_label = VALUES(level_label), \
                 level_precise = VALUES(level_precise), added_version = VALUES(added_version)",
            );
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MySqlStore {
    async fn insert_snapshot(&self, snapshot: &Snapshot, scores: &[ScoreRow]) -> MaiResult<()> {
        let mut tx = self.pool.begin().await?;
        let player = &snapshot.player;

        sqlx::query(&format!(
            "INSERT INTO user_snapshots ({SNAPSHOT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&snapshot.id)
        .bind(&snapshot.user_id)
        .bind(snapshot.region.as_str())
        .bind(snapshot.fetched_at)
        .bind(snapshot.game_version)
        .bind(player.rating)
        .bind(&player.display_name)
        .bind(&player.title)
        .bind(&player.icon_url)
        .bind(player.stars)
        .bind(player.version_play_count)
        .bind(player.total_play_count)
        .bind(&player.class_rank_url)
        .bind(&player.course_rank_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| MaiError::Database {
            message: format!("Failed to insert snapshot: {e}"),
        })?;

        for chunk in scores.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT INTO user_scores (id, snapshot_id, song_id, achievement, dx_score, fc, fs) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.id)
                    .push_bind(&row.snapshot_id)
                    .push_bind(&row.song_id)
                    .push_bind(row.achievement)
                    .push_bind(row.dx_score)
                    .push_bind(row.full_combo.as_str())
                    .push_bind(row.full_sync.as_str());
            });
            builder.build().execute(&mut *tx).await.map_err(|e| MaiError::Database {
                message: format!("Failed to insert score rows: {e}"),
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_snapshot(&self, snapshot_id: &str) -> MaiResult<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM user_snapshots WHERE id = ?"
        ))
        .bind(snapshot_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Snapshot::try_from).transpose()
    }

    async fn list_snapshots(&self, user_id: &str, region: Region) -> MaiResult<Vec<Snapshot>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(&format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM user_snapshots WHERE user_id = ? AND region = ? \
             ORDER BY fetched_at DESC"
        ))
        .bind(user_id)
        .bind(region.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Snapshot::try_from).collect()
    }

    async fn all_snapshot_ids(&self) -> MaiResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM user_snapshots ORDER BY fetched_at")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn snapshot_scores(&self, snapshot_id: &str) -> MaiResult<Vec<CatalogScore>> {
        let rows: Vec<CatalogScoreRow> = sqlx::query_as(
            "SELECT s.id AS song_id, s.song_name, s.difficulty, s.music_type, s.level_label, \
             s.level_precise, s.added_version, us.achievement, us.dx_score, us.fc, us.fs \
             FROM user_scores us JOIN songs s ON s.id = us.song_id \
             WHERE us.snapshot_id = ? ORDER BY us.id",
        )
        .bind(snapshot_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CatalogScore::try_from).collect()
    }

    async fn store_ranks(&self, snapshot_id: &str, ranks: &[(String, usize)]) -> MaiResult<()> {
        let mut tx = self.pool.begin().await?;
        for (song_id, rank) in ranks {
            sqlx::query("UPDATE user_scores SET `rank` = ? WHERE snapshot_id = ? AND song_id = ?")
                .bind(*rank as u32)
                .bind(snapshot_id)
                .bind(song_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
