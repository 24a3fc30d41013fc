//! Feed source over a live search results page
//!
//! Snapshots read the rendered HTML and hand it to [`ExtractionPlan`].
//! Advancing scrolls one viewport and reports whether the page can still
//! grow. With permalink resolution on, newly seen links are opened in their
//! own tab and replaced by the URL the site lands on, but only as many as
//! the run still needs; links past that budget are held back until a later
//! snapshot.

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, warn};

use postreap_core::{normalize, strip_query, Candidate, FeedSource, ScrapeSettings, SourceError};

use crate::{BrowserError, ExtractionPlan};

/// Distance from the bottom at which the page counts as fully scrolled
const BOTTOM_SLACK_PX: f64 = 1000.0;

const SCROLL_STATE_JS: &str = "JSON.stringify({\
    height: document.body.scrollHeight,\
    offset: window.innerHeight + window.scrollY\
})";

const SCROLL_BY_VIEWPORT_JS: &str = "window.scrollBy(0, window.innerHeight)";

#[derive(Debug, Clone, Copy, Deserialize)]
struct ScrollState {
    height: f64,
    offset: f64,
}

impl ScrollState {
    fn at_bottom(&self) -> bool {
        self.offset >= self.height - BOTTOM_SLACK_PX
    }
}

/// Whether another scroll can produce content, given the state before and after
fn can_grow(before: ScrollState, after: ScrollState) -> bool {
    !(after.at_bottom() && after.height <= before.height)
}

/// Inclusive jitter range in milliseconds, tolerating a reversed pair
fn delay_range(range: [u64; 2]) -> (u64, u64) {
    let [a, b] = range;
    (a.min(b), a.max(b))
}

/// Links to open this snapshot: the first `budget` distinct ids not yet resolved
fn pick_for_resolution(ids: &[String], resolved: &HashMap<String, String>, budget: usize) -> Vec<String> {
    let mut picked: Vec<String> = Vec::new();
    for id in ids {
        if picked.len() >= budget {
            break;
        }
        if !resolved.contains_key(id) && !picked.contains(id) {
            picked.push(id.clone());
        }
    }
    picked
}

/// [`FeedSource`] backed by a browser page
pub struct BrowserFeed<'a> {
    browser: &'a Browser,
    page: &'a Page,
    plan: ExtractionPlan,
    origin: String,
    scroll_delay_ms: (u64, u64),
    nav_timeout: Duration,
    resolve_permalinks: bool,
    /// Distinct permalinks the run needs in total
    resolve_limit: usize,
    /// Normalized link -> resolved permalink, for this run only
    resolved: HashMap<String, String>,
}

impl<'a> BrowserFeed<'a> {
    pub fn new(browser: &'a Browser, page: &'a Page, origin: &str, settings: &ScrapeSettings) -> Self {
        Self {
            browser,
            page,
            plan: ExtractionPlan::default(),
            origin: origin.to_string(),
            scroll_delay_ms: delay_range(settings.scroll_delay_ms),
            nav_timeout: settings.element_timeout(),
            resolve_permalinks: settings.resolve_permalinks,
            resolve_limit: usize::MAX,
            resolved: HashMap::new(),
        }
    }

    /// Stop opening tabs once `limit` distinct permalinks are known
    pub fn with_resolve_limit(mut self, limit: usize) -> Self {
        self.resolve_limit = limit;
        self
    }

    fn resolve_budget(&self) -> usize {
        let known: HashSet<&String> = self.resolved.values().collect();
        self.resolve_limit.saturating_sub(known.len())
    }

    pub fn with_plan(mut self, plan: ExtractionPlan) -> Self {
        self.plan = plan;
        self
    }

    async fn eval_string(&self, script: &str) -> Result<String, BrowserError> {
        self.page
            .evaluate(script)
            .await?
            .into_value::<String>()
            .map_err(|e| BrowserError::Script(e.to_string()))
    }

    async fn scroll_state(&self) -> Result<ScrollState, BrowserError> {
        let raw = self.eval_string(SCROLL_STATE_JS).await?;
        serde_json::from_str(&raw).map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Open `url` in a fresh tab and return the address it settles on
    async fn open_in_tab(&self, url: &str) -> Result<String, BrowserError> {
        let tab = self.browser.new_page("about:blank").await?;

        let landed = match tokio::time::timeout(self.nav_timeout, tab.goto(url)).await {
            Ok(Ok(_)) => tab.url().await.map_err(BrowserError::from),
            Ok(Err(e)) => Err(BrowserError::from(e)),
            Err(_) => Err(BrowserError::Script(format!(
                "navigation to {} timed out after {}s",
                url,
                self.nav_timeout.as_secs()
            ))),
        };

        if let Err(e) = tab.close().await {
            debug!("Failed to close permalink tab: {}", e);
        }

        Ok(landed?.unwrap_or_else(|| url.to_string()))
    }

    /// Replace each link with its permalink; failures keep the original link.
    ///
    /// Links beyond the remaining budget are left out of this snapshot.
    async fn resolve(&mut self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let ids: Vec<String> = candidates
            .iter()
            .filter_map(|c| match c {
                Candidate::Link(raw) => Some(normalize(raw, &self.origin)),
                Candidate::Unreadable(_) => None,
            })
            .collect();

        for id in pick_for_resolution(&ids, &self.resolved, self.resolve_budget()) {
            let permalink = match self.open_in_tab(&id).await {
                Ok(landed) => strip_query(&landed).to_string(),
                Err(e) => {
                    warn!("Could not resolve permalink for {}: {}", id, e);
                    id.clone()
                }
            };
            debug!("Resolved {} -> {}", id, permalink);
            self.resolved.insert(id, permalink);
        }

        let mut ids = ids.into_iter();
        let mut held_back = 0;
        let mut out = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !matches!(candidate, Candidate::Link(_)) {
                out.push(candidate);
                continue;
            }
            let Some(id) = ids.next() else { break };
            match self.resolved.get(&id) {
                Some(permalink) => out.push(Candidate::Link(permalink.clone())),
                None => held_back += 1,
            }
        }
        if held_back > 0 {
            debug!("Held back {} links past the resolution budget", held_back);
        }
        out
    }
}

#[async_trait]
impl FeedSource for BrowserFeed<'_> {
    async fn snapshot(&mut self) -> Result<Vec<Candidate>, SourceError> {
        let html = self
            .eval_string("document.documentElement.outerHTML")
            .await
            .map_err(|e| SourceError::Snapshot(e.to_string()))?;

        let candidates = self.plan.extract(&html);
        if !self.resolve_permalinks {
            return Ok(candidates);
        }
        Ok(self.resolve(candidates).await)
    }

    async fn advance(&mut self) -> Result<bool, SourceError> {
        let before = self
            .scroll_state()
            .await
            .map_err(|e| SourceError::Advance(e.to_string()))?;

        self.page
            .evaluate(SCROLL_BY_VIEWPORT_JS)
            .await
            .map_err(|e| SourceError::Advance(e.to_string()))?;

        let (low, high) = self.scroll_delay_ms;
        let delay = rand::thread_rng().gen_range(low..=high);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let after = self
            .scroll_state()
            .await
            .map_err(|e| SourceError::Advance(e.to_string()))?;

        let more = can_grow(before, after);
        if !more {
            debug!("Reached bottom of page at height {}", after.height);
        }
        Ok(more)
    }
}
