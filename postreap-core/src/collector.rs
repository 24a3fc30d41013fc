//! Bounded deduplicating collector
//!
//! Repeatedly reads the currently visible candidates from a [`FeedSource`],
//! keeps the first occurrence of every normalized identifier and asks the
//! source for more content until the target is met, the retry budget runs
//! out, or the source reports that nothing more can appear.
//!
//! The collector never fails. Partial results are returned as-is and the
//! caller inspects [`Collection::stop`] to see why the run ended.

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{normalize, DEFAULT_MAX_ATTEMPTS, DEFAULT_TARGET_POSTS};

/// One visible item as reported by a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    /// A raw link, possibly relative and carrying tracking parameters
    Link(String),
    /// The item was visible but no identifier could be read from it
    Unreadable(String),
}

impl Candidate {
    pub fn link(raw: impl Into<String>) -> Self {
        Self::Link(raw.into())
    }
}

/// Errors a feed source may report for a whole step
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Snapshot failed: {0}")]
    Snapshot(String),

    #[error("Advance failed: {0}")]
    Advance(String),
}

/// Something that shows a growing list of linkable items
#[async_trait]
pub trait FeedSource: Send {
    /// Read the currently visible candidates without changing page state
    async fn snapshot(&mut self) -> Result<Vec<Candidate>, SourceError>;

    /// Ask for more content; `false` means nothing further can appear
    async fn advance(&mut self) -> Result<bool, SourceError>;
}

/// How fruitless iterations are counted against the retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptPolicy {
    /// Only consecutive zero-progress iterations count; progress resets to zero
    #[default]
    ResetOnProgress,
    /// Every iteration counts, progress or not
    EveryIteration,
}

/// Bounds for one collection run
#[derive(Debug, Clone)]
pub struct CollectLimits {
    /// Stop once this many unique identifiers are held
    pub target_count: usize,
    /// Stop once the attempt counter reaches this value
    pub max_attempts: u32,
    /// Optional wall-clock ceiling, checked between iterations
    pub deadline: Option<Duration>,
    pub policy: AttemptPolicy,
}

impl Default for CollectLimits {
    fn default() -> Self {
        Self {
            target_count: DEFAULT_TARGET_POSTS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            deadline: None,
            policy: AttemptPolicy::ResetOnProgress,
        }
    }
}

impl CollectLimits {
    pub fn new(target_count: usize, max_attempts: u32) -> Self {
        Self {
            target_count,
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Why a collection run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    /// The source reported that no further content exists
    Exhausted,
    AttemptsExhausted,
    DeadlineElapsed,
}

/// Result of one collection run
#[derive(Debug, Clone)]
pub struct Collection {
    /// Normalized identifiers in first-seen order
    pub links: Vec<String>,
    pub stop: StopReason,
    pub snapshots: usize,
    pub advances: usize,
    /// Candidates skipped because no identifier could be read
    pub unreadable: usize,
}

impl Collection {
    pub fn reached_target(&self) -> bool {
        self.stop == StopReason::TargetReached
    }

    pub fn into_links(self) -> Vec<String> {
        self.links
    }
}

/// Seen set and output sequence, kept in lockstep
#[derive(Debug, Default)]
struct Harvest {
    seen: HashSet<String>,
    links: Vec<String>,
}

impl Harvest {
    /// Returns true if `id` was not seen before
    fn accept(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.links.push(id.to_string());
        debug_assert_eq!(self.seen.len(), self.links.len());
        true
    }

    fn len(&self) -> usize {
        self.links.len()
    }
}

/// Collects unique identifiers from a feed source
#[derive(Debug, Clone)]
pub struct Collector {
    origin: String,
    limits: CollectLimits,
}

impl Collector {
    pub fn new(origin: &str, limits: CollectLimits) -> Self {
        Self {
            origin: origin.to_string(),
            limits,
        }
    }

    pub fn limits(&self) -> &CollectLimits {
        &self.limits
    }

    /// Run the collection loop to completion
    pub async fn collect<S>(&self, source: &mut S) -> Collection
    where
        S: FeedSource + ?Sized,
    {
        let target = self.limits.target_count;
        let max_attempts = self.limits.max_attempts;
        let started = Instant::now();

        let mut harvest = Harvest::default();
        let mut attempts: u32 = 0;
        let mut snapshots = 0;
        let mut advances = 0;
        let mut unreadable = 0;

        info!("Starting to collect {} post links", target);

        let stop = loop {
            if harvest.len() >= target {
                break StopReason::TargetReached;
            }
            if attempts >= max_attempts {
                break StopReason::AttemptsExhausted;
            }
            if let Some(deadline) = self.limits.deadline {
                if started.elapsed() >= deadline {
                    break StopReason::DeadlineElapsed;
                }
            }

            let candidates = match source.snapshot().await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("Snapshot failed, treating as empty: {}", e);
                    Vec::new()
                }
            };
            snapshots += 1;
            debug!("Snapshot {} returned {} candidates", snapshots, candidates.len());

            let mut added = 0;
            for candidate in candidates {
                if harvest.len() >= target {
                    break;
                }
                let raw = match candidate {
                    Candidate::Link(raw) => raw,
                    Candidate::Unreadable(reason) => {
                        debug!("Skipping unreadable candidate: {}", reason);
                        unreadable += 1;
                        continue;
                    }
                };

                let id = normalize(&raw, &self.origin);
                if harvest.accept(&id) {
                    added += 1;
                    info!("Collected post {}: {}", harvest.len(), id);
                }
            }

            match self.limits.policy {
                AttemptPolicy::ResetOnProgress if added > 0 => attempts = 0,
                AttemptPolicy::ResetOnProgress => attempts += 1,
                AttemptPolicy::EveryIteration => attempts += 1,
            }

            if added > 0 || harvest.len() >= target {
                continue;
            }

            advances += 1;
            match source.advance().await {
                Ok(true) => {
                    info!(
                        "Scrolled {} times, collected {}/{} posts",
                        advances,
                        harvest.len(),
                        target
                    );
                }
                Ok(false) => {
                    info!("Reached the end of the feed");
                    break StopReason::Exhausted;
                }
                Err(e) => warn!("Advance failed, retrying: {}", e),
            }
        };

        info!(
            "Collection completed ({:?}). Total posts collected: {}",
            stop,
            harvest.len()
        );

        Collection {
            links: harvest.links,
            stop,
            snapshots,
            advances,
            unreadable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const ORIGIN: &str = "https://example.com";

    /// Serves scripted snapshots; once the script runs out the last batch repeats
    struct ScriptedFeed {
        batches: VecDeque<Result<Vec<Candidate>, SourceError>>,
        last: Vec<Candidate>,
        advance_results: VecDeque<bool>,
        snapshot_calls: usize,
        advance_calls: usize,
    }

    impl ScriptedFeed {
        fn new(batches: Vec<Vec<&str>>) -> Self {
            Self {
                batches: batches
                    .into_iter()
                    .map(|b| Ok(b.into_iter().map(Candidate::link).collect()))
                    .collect(),
                last: Vec::new(),
                advance_results: VecDeque::new(),
                snapshot_calls: 0,
                advance_calls: 0,
            }
        }

        fn with_advances(mut self, results: Vec<bool>) -> Self {
            self.advance_results = results.into();
            self
        }

        fn push_error(&mut self) {
            self.batches
                .push_back(Err(SourceError::Snapshot("page crashed".to_string())));
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedFeed {
        async fn snapshot(&mut self) -> Result<Vec<Candidate>, SourceError> {
            self.snapshot_calls += 1;
            match self.batches.pop_front() {
                Some(Ok(batch)) => {
                    self.last = batch.clone();
                    Ok(batch)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.clone()),
            }
        }

        async fn advance(&mut self) -> Result<bool, SourceError> {
            self.advance_calls += 1;
            Ok(self.advance_results.pop_front().unwrap_or(true))
        }
    }

    /// Alternates one fresh link with an empty snapshot, forever
    struct Trickle {
        calls: usize,
    }

    #[async_trait]
    impl FeedSource for Trickle {
        async fn snapshot(&mut self) -> Result<Vec<Candidate>, SourceError> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                Ok(vec![Candidate::Link(format!("/posts/{}", self.calls))])
            } else {
                Ok(Vec::new())
            }
        }

        async fn advance(&mut self) -> Result<bool, SourceError> {
            Ok(true)
        }
    }

    fn ids(links: &[&str]) -> Vec<String> {
        links.iter().map(|l| normalize(l, ORIGIN)).collect()
    }

    #[tokio::test]
    async fn test_stops_exactly_at_target() {
        let mut feed = ScriptedFeed::new(vec![vec!["a", "b"], vec!["c", "d"], vec!["e", "f"]]);
        let collector = Collector::new(ORIGIN, CollectLimits::new(5, 10));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links, ids(&["a", "b", "c", "d", "e"]));
        assert_eq!(result.stop, StopReason::TargetReached);
        assert_eq!(feed.snapshot_calls, 3);
        assert!(result.reached_target());
    }

    #[tokio::test]
    async fn test_duplicates_within_snapshot_collapse() {
        let mut feed = ScriptedFeed::new(vec![vec!["/posts/1", "/posts/1?utm=x", "/posts/2"]])
            .with_advances(vec![false]);
        let collector = Collector::new(ORIGIN, CollectLimits::new(10, 5));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links, ids(&["/posts/1", "/posts/2"]));
        let unique: HashSet<_> = result.links.iter().collect();
        assert_eq!(unique.len(), result.links.len());
    }

    #[tokio::test]
    async fn test_exhaustion_returns_partial() {
        let mut feed = ScriptedFeed::new(vec![vec!["a"]]).with_advances(vec![false]);
        let collector = Collector::new(ORIGIN, CollectLimits::new(5, 10));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links, ids(&["a"]));
        assert_eq!(result.stop, StopReason::Exhausted);
        assert_eq!(feed.advance_calls, 1);
    }

    #[tokio::test]
    async fn test_stale_feed_exhausts_attempts() {
        let mut feed = ScriptedFeed::new(vec![vec!["a", "b"]]);
        let collector = Collector::new(ORIGIN, CollectLimits::new(5, 3));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links.len(), 2);
        assert_eq!(result.stop, StopReason::AttemptsExhausted);
        // One productive snapshot, then three fruitless ones each followed by a scroll
        assert_eq!(feed.snapshot_calls, 4);
        assert_eq!(feed.advance_calls, 3);
    }

    #[tokio::test]
    async fn test_progress_resets_attempts() {
        let mut feed = Trickle { calls: 0 };
        let collector = Collector::new(ORIGIN, CollectLimits::new(20, 2));

        let result = collector.collect(&mut feed).await;

        // Never two empty snapshots in a row, so only the target ends the run
        assert_eq!(result.stop, StopReason::TargetReached);
        assert_eq!(result.links.len(), 20);
    }

    #[tokio::test]
    async fn test_every_iteration_policy_counts_progress() {
        let mut feed = Trickle { calls: 0 };
        let limits = CollectLimits::new(20, 4).with_policy(AttemptPolicy::EveryIteration);
        let collector = Collector::new(ORIGIN, limits);

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.stop, StopReason::AttemptsExhausted);
        assert_eq!(result.snapshots, 4);
        assert_eq!(result.links.len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_error_counts_as_starvation() {
        let mut feed = ScriptedFeed::new(vec![vec!["a"]]);
        feed.push_error();
        feed.batches.push_back(Ok(vec![Candidate::link("b")]));
        let collector = Collector::new(ORIGIN, CollectLimits::new(2, 5));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links, ids(&["a", "b"]));
        // The failed snapshot is the only fruitless iteration
        assert_eq!(feed.advance_calls, 1);
        assert_eq!(result.snapshots, 3);
    }

    #[tokio::test]
    async fn test_unreadable_candidates_are_skipped() {
        let mut feed = ScriptedFeed::new(vec![]);
        feed.batches.push_back(Ok(vec![
            Candidate::Unreadable("no href".to_string()),
            Candidate::link("/posts/9"),
            Candidate::Unreadable("detached".to_string()),
        ]));
        let collector = Collector::new(ORIGIN, CollectLimits::new(1, 3));

        let result = collector.collect(&mut feed).await;

        assert_eq!(result.links, ids(&["/posts/9"]));
        assert_eq!(result.unreadable, 1);
    }

    #[tokio::test]
    async fn test_zero_deadline_stops_immediately() {
        let mut feed = ScriptedFeed::new(vec![vec!["a"]]);
        let limits = CollectLimits::new(5, 5).with_deadline(Duration::ZERO);
        let collector = Collector::new(ORIGIN, limits);

        let result = collector.collect(&mut feed).await;

        assert!(result.links.is_empty());
        assert_eq!(result.stop, StopReason::DeadlineElapsed);
        assert_eq!(feed.snapshot_calls, 0);
    }

    #[test]
    fn test_harvest_keeps_lockstep() {
        let mut harvest = Harvest::default();
        assert!(harvest.accept("x"));
        assert!(!harvest.accept("x"));
        assert!(harvest.accept("y"));
        assert_eq!(harvest.seen.len(), harvest.links.len());
    }
}
