//! One end-to-end harvest: launch, sign in, search, filter, collect

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use postreap_core::{Collection, Collector, Credentials, DateFilter, FiltersApplied, ReapConfig};

use crate::{apply_date_filter, apply_posts_filter, login, search, search_query, BrowserError, BrowserFeed, Session};

/// Parameters of a single harvest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestRequest {
    pub hashtags: Vec<String>,
    pub target_posts: usize,
    pub headless: bool,
}

impl HarvestRequest {
    pub fn new(hashtags: Vec<String>, target_posts: usize) -> Self {
        Self {
            hashtags,
            target_posts,
            headless: true,
        }
    }

    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }
}

/// What a harvest produced and which filters took effect
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub collection: Collection,
    pub query: String,
    pub posts_filter_applied: bool,
    pub date_filter_applied: bool,
}

impl HarvestReport {
    /// Label recorded in exports for how the links were gathered
    pub fn collection_method(&self) -> &'static str {
        if self.posts_filter_applied {
            "Direct URL Collection (Posts Filter)"
        } else {
            "Direct URL Collection"
        }
    }

    /// Filters to record in exports, given the date filter that was requested
    pub fn filters_applied(&self, requested: DateFilter) -> FiltersApplied {
        FiltersApplied::new(
            self.posts_filter_applied,
            self.date_filter_applied.then_some(requested),
        )
    }
}

/// Run a full harvest; the browser is closed whether or not it succeeds
pub async fn harvest(
    config: &ReapConfig,
    credentials: &Credentials,
    request: &HarvestRequest,
) -> Result<HarvestReport, BrowserError> {
    let mut settings = config.scrape.clone();
    settings.headless = request.headless;

    let session = Session::launch(&settings).await?;
    let result = drive(&session, config, credentials, request).await;
    session.close().await;

    if let Err(e) = &result {
        warn!("Harvest failed: {}", e);
    }
    result
}

async fn drive(
    session: &Session,
    config: &ReapConfig,
    credentials: &Credentials,
    request: &HarvestRequest,
) -> Result<HarvestReport, BrowserError> {
    let page = session.page();
    let settings = &config.scrape;
    let timeout = settings.element_timeout();

    login(page, &config.site, credentials, timeout).await?;
    search(page, &request.hashtags, timeout).await?;

    let posts_filter_applied = apply_posts_filter(page).await;
    let date_filter_applied = apply_date_filter(page, settings.date_filter, timeout).await;

    let collector = Collector::new(&config.site.origin, settings.limits(request.target_posts));
    let mut feed = BrowserFeed::new(session.browser(), page, &config.site.origin, settings)
        .with_resolve_limit(request.target_posts);
    let collection = collector.collect(&mut feed).await;

    info!(
        "Collected {} unique post links ({:?})",
        collection.links.len(),
        collection.stop
    );

    Ok(HarvestReport {
        collection,
        query: search_query(&request.hashtags),
        posts_filter_applied,
        date_filter_applied,
    })
}
