use crate::config::Constants;
use crate::error::{MaiError, MaiResult};
use crate::model::{RankedSong, Region, Snapshot};
use crate::service::rating::{assign_ranks, best50_total, split_songs};
use crate::service::store::SnapshotStore;
use serde::Serialize;
use std::sync::Arc;

/// Ranked view of one snapshot
#[derive(Debug, Clone, Serialize)]
pub struct Best50 {
    pub snapshot: Snapshot,
    pub total_rating: u32,
    pub current_best: Vec<RankedSong>,
    pub legacy_best: Vec<RankedSong>,
    pub remainder: Vec<RankedSong>,
}

/// Read side of the snapshot history
#[derive(Clone)]
pub struct SnapshotService {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    async fn load(&self, snapshot_id: &str) -> MaiResult<Snapshot> {
        self.store
            .get_snapshot(snapshot_id)
            .await?
            .ok_or_else(|| MaiError::no_data(format!("Snapshot {snapshot_id} not found")))
    }

    /// Snapshot history of a user in a region, newest first
    pub async fn list(&self, user_id: &str, region: Region) -> MaiResult<Vec<Snapshot>> {
        self.store.list_snapshots(user_id, region).await
    }

    /// Newest snapshot of a user in a region
    pub async fn latest(&self, user_id: &str, region: Region) -> MaiResult<Snapshot> {
        self.store
            .list_snapshots(user_id, region)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MaiError::no_data("No snapshot found for this region"))
    }

    /// Rate and rank a snapshot against the version epoch it was fetched in
    pub async fn best50(&self, snapshot_id: &str) -> MaiResult<Best50> {
        let snapshot = self.load(snapshot_id).await?;
        let scores = self.store.snapshot_scores(snapshot_id).await?;

        let split = split_songs(&scores, snapshot.game_version);
        let total_rating = best50_total(&split);

        let mut current_best = Vec::new();
        let mut legacy_best = Vec::new();
        let mut remainder = Vec::new();
        let legacy_end = Constants::NEW_BEST_COUNT + Constants::OLD_BEST_COUNT;
        for song in assign_ranks(&split) {
            match song.rank {
                r if r < Constants::NEW_BEST_COUNT => current_best.push(song),
                r if r < legacy_end => legacy_best.push(song),
                _ => remainder.push(song),
            }
        }

        Ok(Best50 {
            snapshot,
            total_rating,
            current_best,
            legacy_best,
            remainder,
        })
    }

    /// Recompute and cache the global rank of every score row of a snapshot.
    /// Returns the number of rows ranked.
    pub async fn recompute_ranks(&self, snapshot_id: &str) -> MaiResult<usize> {
        let snapshot = self.load(snapshot_id).await?;
        let scores = self.store.snapshot_scores(snapshot_id).await?;

        let ranks: Vec<(String, usize)> = assign_ranks(&split_songs(&scores, snapshot.game_version))
            .into_iter()
            .map(|song| (song.song.score.song_id, song.rank))
            .collect();

        self.store.store_ranks(snapshot_id, &ranks).await?;
        log::debug!("Ranked {} songs of snapshot {snapshot_id}", ranks.len());
        Ok(ranks.len())
    }

    /// Recompute ranks of every snapshot. A failing snapshot is logged and
    /// skipped; returns (snapshots ranked, snapshots failed).
    pub async fn recompute_all(&self) -> MaiResult<(usize, usize)> {
        let ids = self.store.all_snapshot_ids().await?;
        let mut ranked = 0;
        let mut failed = 0;

        for id in &ids {
            match self.recompute_ranks(id).await {
                Ok(_) => ranked += 1,
                Err(e) => {
                    log::error!("Failed to recompute ranks of snapshot {id}: {e}");
                    failed += 1;
                }
            }
        }

        log::info!("Recomputed ranks of {ranked}/{} snapshots", ids.len());
        Ok((ranked, failed))
    }
}
