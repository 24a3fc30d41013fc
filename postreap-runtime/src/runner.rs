//! Job runner
//!
//! Each accepted keyword gets one background task. The task harvests,
//! writes the export files and records the outcome. Every failure,
//! including a panic inside the harvest, ends as a `failed` record.

use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use postreap_browser::{harvest, BrowserError, HarvestReport, HarvestRequest};
use postreap_core::{save_all, Credentials, OutputError, PostExport, ReapConfig};

use crate::{keyword_key, JobStore, ScrapeFailure, ScrapeOutcome, ScrapeSuccess};

/// Errors that end a job
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Failed to save results: {0}")]
    Output(#[from] OutputError),

    #[error("Scrape task aborted: {0}")]
    Aborted(String),
}

/// Produces post links for a request
#[async_trait]
pub trait Harvester: Send + Sync {
    async fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, JobError>;
}

/// Harvester that drives a real browser
pub struct BrowserHarvester {
    config: Arc<ReapConfig>,
    credentials: Credentials,
}

impl BrowserHarvester {
    pub fn new(config: Arc<ReapConfig>, credentials: Credentials) -> Self {
        Self {
            config,
            credentials,
        }
    }
}

#[async_trait]
impl Harvester for BrowserHarvester {
    async fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, JobError> {
        Ok(harvest(&self.config, &self.credentials, request).await?)
    }
}

/// Search terms a keyword job submits
pub fn job_hashtags(keyword: &str) -> Vec<String> {
    vec![format!("{} hiring", keyword)]
}

/// Outcome of a submission
#[derive(Debug)]
pub enum Submission {
    /// A new job was spawned for the key
    Started { key: String, handle: JoinHandle<()> },
    /// A job for the key is already running
    AlreadyRunning { key: String },
}

/// Spawns and records keyword jobs
#[derive(Clone)]
pub struct JobRunner {
    store: JobStore,
    harvester: Arc<dyn Harvester>,
    config: Arc<ReapConfig>,
}

impl JobRunner {
    pub fn new(store: JobStore, harvester: Arc<dyn Harvester>, config: Arc<ReapConfig>) -> Self {
        Self {
            store,
            harvester,
            config,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn config(&self) -> &ReapConfig {
        &self.config
    }

    /// Start a job for `keyword` unless one is already running
    pub fn submit(&self, keyword: &str, target_posts: usize, headless: bool) -> Submission {
        let key = keyword_key(keyword);
        let Some(run_id) = self.store.try_begin(&key) else {
            return Submission::AlreadyRunning { key };
        };

        info!("Starting scrape job {} for '{}' ({} posts)", run_id, key, target_posts);
        let request = HarvestRequest::new(job_hashtags(&key), target_posts).headless(headless);

        let runner = self.clone();
        let job_key = key.clone();
        let handle = tokio::spawn(async move {
            let work = {
                let runner = runner.clone();
                let key = job_key.clone();
                tokio::spawn(async move { runner.execute(&key, &request).await })
            };

            let result = match work.await {
                Ok(result) => result,
                Err(e) => Err(JobError::Aborted(e.to_string())),
            };
            runner.record(&job_key, run_id, result);
        });

        Submission::Started { key, handle }
    }

    /// Harvest and save; the outcome is not recorded here
    pub async fn execute(&self, key: &str, request: &HarvestRequest) -> Result<ScrapeSuccess, JobError> {
        let report = self.harvester.harvest(request).await?;
        let scrape = &self.config.scrape;

        let export = PostExport::new(
            report.collection.links.clone(),
            report.collection_method(),
            &scrape.user_agent,
            report.filters_applied(scrape.date_filter),
            Local::now(),
        );
        let paths = save_all(&self.config.output, Some(key), &export)?;

        Ok(ScrapeSuccess::new(
            key,
            report.collection.into_links(),
            paths.csv.map(|p| p.display().to_string()),
            paths.json.map(|p| p.display().to_string()),
        ))
    }

    fn record(&self, key: &str, run_id: Uuid, result: Result<ScrapeSuccess, JobError>) {
        let outcome = match result {
            Ok(success) => {
                info!("Scrape job {} for '{}' collected {} posts", run_id, key, success.total_posts);
                if success.total_posts == 0 {
                    warn!("No posts collected for '{}'", key);
                }
                ScrapeOutcome::Success(success)
            }
            Err(e) => {
                error!("Scrape job {} for '{}' failed: {}", run_id, key, e);
                ScrapeOutcome::Failure(ScrapeFailure::new(key, e.to_string()))
            }
        };
        if !self.store.finish(key, run_id, outcome) {
            warn!("Scrape job {} for '{}' was superseded; outcome discarded", run_id, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobStatus;
    use postreap_core::{Collection, SaveFormat, StopReason};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Returns fixed links, optionally waiting for a signal first
    struct FakeHarvester {
        links: Vec<String>,
        gate: Option<Arc<Notify>>,
        calls: AtomicUsize,
    }

    impl FakeHarvester {
        fn new(links: &[&str]) -> Self {
            Self {
                links: links.iter().map(|s| s.to_string()).collect(),
                gate: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Harvester for FakeHarvester {
        async fn harvest(&self, request: &HarvestRequest) -> Result<HarvestReport, JobError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(HarvestReport {
                collection: Collection {
                    links: self.links.clone(),
                    stop: StopReason::Exhausted,
                    snapshots: 1,
                    advances: 1,
                    unreadable: 0,
                },
                query: request.hashtags.join(" OR "),
                posts_filter_applied: true,
                date_filter_applied: true,
            })
        }
    }

    struct FailingHarvester;

    #[async_trait]
    impl Harvester for FailingHarvester {
        async fn harvest(&self, _request: &HarvestRequest) -> Result<HarvestReport, JobError> {
            Err(BrowserError::Login("no signed-in page after submit".to_string()).into())
        }
    }

    struct PanickingHarvester;

    #[async_trait]
    impl Harvester for PanickingHarvester {
        async fn harvest(&self, _request: &HarvestRequest) -> Result<HarvestReport, JobError> {
            panic!("harvester blew up");
        }
    }

    fn config_in(dir: &std::path::Path, format: SaveFormat) -> Arc<ReapConfig> {
        let mut config = ReapConfig::default();
        config.output.dir = dir.to_path_buf();
        config.output.format = format;
        Arc::new(config)
    }

    fn started(submission: Submission) -> JoinHandle<()> {
        match submission {
            Submission::Started { handle, .. } => handle,
            Submission::AlreadyRunning { key } => panic!("job for {} unexpectedly running", key),
        }
    }

    #[test]
    fn test_job_hashtags() {
        assert_eq!(job_hashtags("rust"), vec!["rust hiring".to_string()]);
    }

    #[tokio::test]
    async fn test_successful_job_saves_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new();
        let harvester = Arc::new(FakeHarvester::new(&[
            "https://www.linkedin.com/posts/a",
            "https://www.linkedin.com/posts/b",
        ]));
        let runner = JobRunner::new(store.clone(), harvester, config_in(dir.path(), SaveFormat::Both));

        started(runner.submit("  Rust ", 2, true)).await.unwrap();

        assert_eq!(store.status("rust"), JobStatus::Completed);
        let Some(ScrapeOutcome::Success(success)) = store.outcome("rust") else {
            panic!("expected success");
        };
        assert_eq!(success.total_posts, 2);
        assert_eq!(success.keyword, "rust");

        let csv = success.csv_filename.unwrap();
        let json = success.json_filename.unwrap();
        assert!(csv.ends_with("linkedin_posts_rust.csv"));
        assert!(std::path::Path::new(&csv).exists());
        assert!(std::path::Path::new(&json).exists());
    }

    #[tokio::test]
    async fn test_duplicate_submission_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let harvester = Arc::new(FakeHarvester {
            gate: Some(Arc::clone(&gate)),
            ..FakeHarvester::new(&["https://www.linkedin.com/posts/a"])
        });
        let store = JobStore::new();
        let runner = JobRunner::new(
            store.clone(),
            harvester.clone(),
            config_in(dir.path(), SaveFormat::Json),
        );

        let handle = started(runner.submit("go", 1, true));
        assert!(matches!(
            runner.submit("GO", 1, true),
            Submission::AlreadyRunning { ref key } if key == "go"
        ));
        assert_eq!(store.status("go"), JobStatus::InProgress);

        gate.notify_one();
        handle.await.unwrap();

        assert_eq!(store.status("go"), JobStatus::Completed);
        assert_eq!(harvester.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_harvest_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new();
        let runner = JobRunner::new(
            store.clone(),
            Arc::new(FailingHarvester),
            config_in(dir.path(), SaveFormat::Both),
        );

        started(runner.submit("rust", 5, true)).await.unwrap();

        assert_eq!(store.status("rust"), JobStatus::Failed);
        let Some(ScrapeOutcome::Failure(failure)) = store.outcome("rust") else {
            panic!("expected failure");
        };
        assert!(failure.error.contains("Login failed"));
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new();
        let runner = JobRunner::new(
            store.clone(),
            Arc::new(PanickingHarvester),
            config_in(dir.path(), SaveFormat::Csv),
        );

        started(runner.submit("rust", 5, true)).await.unwrap();

        assert_eq!(store.status("rust"), JobStatus::Failed);
        assert_eq!(store.active_count(), 0);
    }
}
