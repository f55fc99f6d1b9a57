use crate::model::job::{progress_percent, FetchState};
use crate::service::locks::KeyedLocks;
use crate::service::store::JobStore;
use std::sync::Arc;

/// Records sub-task completion markers on jobs.
///
/// Appends for one job are serialized through a per-job lock; appends for
/// different jobs run independently. The lock entry is dropped as soon as
/// the last in-flight append for that job finishes.
#[derive(Clone)]
pub struct FetchStateTracker {
    jobs: Arc<dyn JobStore>,
    locks: KeyedLocks<String>,
}

impl FetchStateTracker {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self {
            jobs,
            locks: KeyedLocks::new(),
        }
    }

    /// Idempotently add `state` to the job's completed set.
    ///
    /// Never fails: unknown jobs and storage errors are logged and ignored so
    /// the task reporting progress keeps running.
    pub async fn append_state(&self, job_id: &str, state: FetchState) {
        let _guard = self.locks.lock(job_id.to_string()).await;

        let job = match self.jobs.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                log::warn!("Job {job_id} not found when trying to append state '{state}'");
                return;
            }
            Err(e) => {
                log::error!("Failed to load job {job_id} to append state '{state}': {e}");
                return;
            }
        };

        let mut states = job.states;
        if !states.insert(state) {
            return;
        }

        match self.jobs.update_job_states(job_id, &states).await {
            Ok(()) => log::info!(
                "Appended state '{state}' to job {job_id}. Progress: {}%",
                progress_percent(&states)
            ),
            Err(e) => log::error!("Failed to append state '{state}' to job {job_id}: {e}"),
        }
    }

    /// Jobs with appends in flight
    pub fn active_jobs(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Difficulty, Job, Region};
    use crate::service::store::MemoryStore;
    use chrono::Utc;

    fn all_six() -> Vec<FetchState> {
        let mut states = vec![FetchState::PlayerData];
        states.extend(Difficulty::ALL.into_iter().map(FetchState::SongData));
        states
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let job = Job::new_pending("job".into(), "user", Region::Intl, Utc::now());
        store.insert_job(&job).await.unwrap();

        let tracker = FetchStateTracker::new(store.clone());
        tracker.append_state("job", FetchState::Login).await;
        tracker.append_state("job", FetchState::Login).await;

        let job = store.get_job("job").await.unwrap().unwrap();
        assert_eq!(job.states.len(), 1);
        assert_eq!(job.progress(), 14);
    }

    #[tokio::test]
    async fn test_unknown_job_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let tracker = FetchStateTracker::new(store.clone());
        tracker.append_state("missing", FetchState::Login).await;
        assert!(store.get_job("missing").await.unwrap().is_none());
        assert_eq!(tracker.active_jobs(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let tracker = FetchStateTracker::new(store.clone());

        let job_ids: Vec<String> = (0..64).map(|i| format!("job-{i}")).collect();
        for id in &job_ids {
            let job = Job::new_pending(id.clone(), "user", Region::Intl, Utc::now());
            store.insert_job(&job).await.unwrap();
        }

        // Interleave every job's six appends with every other job's
        let mut handles = Vec::new();
        for state in all_six() {
            for id in &job_ids {
                let tracker = tracker.clone();
                let id = id.clone();
                handles.push(tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    tracker.append_state(&id, state).await;
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for id in &job_ids {
            let job = store.get_job(id).await.unwrap().unwrap();
            assert_eq!(job.states.len(), 6, "job {id} lost an update");
        }
        assert_eq!(tracker.active_jobs(), 0);
    }
}
