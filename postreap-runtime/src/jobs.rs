//! Job registry
//!
//! One record per keyword key. Records are immutable and replaced
//! wholesale. Both contended transitions go through the map's entry lock:
//! marking a keyword as in progress, and a run writing its outcome, which
//! only lands while that run still owns the key.

use chrono::{DateTime, Local};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Registry key for a user-supplied keyword
pub fn keyword_key(keyword: &str) -> String {
    keyword.trim().to_lowercase()
}

/// Lifecycle of a keyword's most recent job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotFound,
    InProgress,
    Completed,
    Failed,
}

/// Stored result of a successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeSuccess {
    pub success: bool,
    pub links: Vec<String>,
    pub total_posts: usize,
    pub timestamp: DateTime<Local>,
    pub keyword: String,
    pub csv_filename: Option<String>,
    pub json_filename: Option<String>,
}

impl ScrapeSuccess {
    pub fn new(
        keyword: &str,
        links: Vec<String>,
        csv_filename: Option<String>,
        json_filename: Option<String>,
    ) -> Self {
        Self {
            success: true,
            total_posts: links.len(),
            links,
            timestamp: Local::now(),
            keyword: keyword.to_string(),
            csv_filename,
            json_filename,
        }
    }
}

/// Stored result of a failed job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeFailure {
    pub success: bool,
    pub error: String,
    pub timestamp: DateTime<Local>,
    pub keyword: String,
}

impl ScrapeFailure {
    pub fn new(keyword: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            timestamp: Local::now(),
            keyword: keyword.to_string(),
        }
    }
}

/// Result record served to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScrapeOutcome {
    Success(ScrapeSuccess),
    Failure(ScrapeFailure),
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success(_))
    }
}

/// Snapshot of a keyword's state
#[derive(Debug, Clone)]
pub struct JobRecord {
    /// Identifies the run that last wrote this record
    pub run_id: Uuid,
    pub status: JobStatus,
    /// Latest finished outcome; survives while a rerun is in progress
    pub outcome: Option<ScrapeOutcome>,
    pub updated_at: DateTime<Local>,
}

impl JobRecord {
    fn started(previous: Option<ScrapeOutcome>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: JobStatus::InProgress,
            outcome: previous,
            updated_at: Local::now(),
        }
    }
}

/// Shared registry of jobs by keyword key
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<DashMap<String, Arc<JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as in progress; `None` if a job for it is already running
    pub fn try_begin(&self, key: &str) -> Option<Uuid> {
        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status == JobStatus::InProgress {
                    debug!("Job for {} already in progress", key);
                    return None;
                }
                let record = JobRecord::started(entry.get().outcome.clone());
                let run_id = record.run_id;
                entry.insert(Arc::new(record));
                Some(run_id)
            }
            Entry::Vacant(entry) => {
                let record = JobRecord::started(None);
                let run_id = record.run_id;
                entry.insert(Arc::new(record));
                Some(run_id)
            }
        }
    }

    /// Record the final outcome of run `run_id`.
    ///
    /// Returns false, dropping the outcome, when another run has taken over
    /// the key since `run_id` began.
    pub fn finish(&self, key: &str, run_id: Uuid, outcome: ScrapeOutcome) -> bool {
        let status = if outcome.is_success() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        let record = Arc::new(JobRecord {
            run_id,
            status,
            outcome: Some(outcome),
            updated_at: Local::now(),
        });

        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().run_id != run_id {
                    debug!("Dropping stale outcome of run {} for {}", run_id, key);
                    return false;
                }
                entry.insert(record);
            }
            Entry::Vacant(entry) => {
                entry.insert(record);
            }
        }
        true
    }

    pub fn get(&self, key: &str) -> Option<Arc<JobRecord>> {
        self.jobs.get(key).map(|r| Arc::clone(r.value()))
    }

    pub fn status(&self, key: &str) -> JobStatus {
        self.get(key).map(|r| r.status).unwrap_or(JobStatus::NotFound)
    }

    pub fn outcome(&self, key: &str) -> Option<ScrapeOutcome> {
        self.get(key).and_then(|r| r.outcome.clone())
    }

    /// Every stored outcome, ordered by key
    pub fn outcomes(&self) -> BTreeMap<String, ScrapeOutcome> {
        self.jobs
            .iter()
            .filter_map(|r| r.value().outcome.clone().map(|o| (r.key().clone(), o)))
            .collect()
    }

    /// Keys that have a stored outcome, sorted
    pub fn keywords(&self) -> Vec<String> {
        self.outcomes().into_keys().collect()
    }

    /// Drop a keyword's outcome and status; false if it had neither
    pub fn remove(&self, key: &str) -> bool {
        self.jobs.remove(key).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|r| r.value().status == JobStatus::InProgress)
            .count()
    }

    pub fn result_count(&self) -> usize {
        self.jobs.iter().filter(|r| r.value().outcome.is_some()).count()
    }
}
