//! Candidate extraction from rendered feed HTML
//!
//! A snapshot of the page is parsed offline. Container selectors are tried
//! in priority order and the first one that matches anything defines the
//! visible items. Each item is then searched with the link selectors, in
//! order, for an href that points at a post.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

use postreap_core::Candidate;

/// Matches hrefs that address a single post
static POST_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(/posts/|activity-\d|/feed/update/urn:li:activity:)").unwrap()
});

/// Attribute values naming an activity directly, e.g. `urn:li:activity:7123`
static ACTIVITY_URN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^urn:li:activity:\d+$").unwrap());

/// Post containers, most specific first
pub const CONTAINER_SELECTORS: &[&str] = &[
    ".feed-shared-update-v2",
    ".update-components-text",
    "[data-id^='urn:li:activity']",
    ".artdeco-card",
];

/// Link locations inside a container, most reliable first
pub const LINK_SELECTORS: &[&str] = &[
    "a[href*='/posts/']",
    "a[href*='/feed/update/']",
    "a[href*='activity-']",
    ".update-components-actor a",
    "a[data-control-name*='like']",
];

/// Compiled selector lists for one run
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    containers: Vec<(String, Selector)>,
    links: Vec<Selector>,
}

impl Default for ExtractionPlan {
    fn default() -> Self {
        Self::new(CONTAINER_SELECTORS, LINK_SELECTORS)
    }
}

impl ExtractionPlan {
    /// Compile selector lists; selectors that fail to parse are dropped
    pub fn new(containers: &[&str], links: &[&str]) -> Self {
        Self {
            containers: containers
                .iter()
                .filter_map(|s| compile(s).map(|sel| (s.to_string(), sel)))
                .collect(),
            links: links.iter().filter_map(|s| compile(s)).collect(),
        }
    }

    /// Extract candidates from a full page of HTML
    pub fn extract(&self, html: &str) -> Vec<Candidate> {
        let document = Html::parse_document(html);

        for (name, selector) in &self.containers {
            let items: Vec<ElementRef> = document.select(selector).collect();
            if items.is_empty() {
                debug!("Container strategy {} matched nothing", name);
                continue;
            }
            debug!("Container strategy {} matched {} items", name, items.len());
            return items.iter().map(|item| self.candidate_of(item)).collect();
        }

        Vec::new()
    }

    fn candidate_of(&self, item: &ElementRef) -> Candidate {
        for selector in &self.links {
            for link in item.select(selector) {
                if let Some(href) = link.value().attr("href") {
                    if is_post_href(href) {
                        return Candidate::link(href);
                    }
                }
            }
        }

        // No usable anchor; fall back to an activity URN on the item itself
        for attr in ["data-urn", "data-id"] {
            if let Some(urn) = item.value().attr(attr) {
                if ACTIVITY_URN.is_match(urn) {
                    return Candidate::Link(format!("/feed/update/{}/", urn));
                }
            }
        }

        Candidate::Unreadable("no post link in container".to_string())
    }
}

/// True if `href` addresses a single post
pub fn is_post_href(href: &str) -> bool {
    POST_HREF.is_match(href)
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(e) => {
            debug!("Dropping unparsable selector {}: {:?}", selector, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_container_strategy() {
        let html = r#"
            <html><body>
                <div class="feed-shared-update-v2">
                    <a href="/in/someone">Author</a>
                    <a href="/posts/alice_rust-hiring-123?utm_source=share">Post</a>
                </div>
                <div class="feed-shared-update-v2">
                    <a href="https://www.linkedin.com/feed/update/urn:li:activity:42/">Post</a>
                </div>
                <div class="artdeco-card"><a href="/posts/ignored">Card</a></div>
            </body></html>
        "#;

        let candidates = ExtractionPlan::default().extract(html);

        assert_eq!(
            candidates,
            vec![
                Candidate::link("/posts/alice_rust-hiring-123?utm_source=share"),
                Candidate::link("https://www.linkedin.com/feed/update/urn:li:activity:42/"),
            ]
        );
    }

    #[test]
    fn test_falls_back_to_later_container_strategy() {
        let html = r#"
            <div class="artdeco-card"><a href="/posts/bob-1">One</a></div>
            <div class="artdeco-card"><a href="/company/acme">Company</a></div>
        "#;

        let candidates = ExtractionPlan::default().extract(html);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], Candidate::link("/posts/bob-1"));
        assert!(matches!(candidates[1], Candidate::Unreadable(_)));
    }

    #[test]
    fn test_activity_urn_fallback() {
        let html = r#"
            <div data-id="urn:li:activity:7001" class="x"><span>no links</span></div>
        "#;

        let candidates = ExtractionPlan::default().extract(html);

        assert_eq!(
            candidates,
            vec![Candidate::link("/feed/update/urn:li:activity:7001/")]
        );
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let candidates = ExtractionPlan::default().extract("<html><body><p>hi</p></body></html>");
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_bad_selectors_are_dropped() {
        let plan = ExtractionPlan::new(&["div[[[", ".post"], &["a"]);
        assert_eq!(plan.containers.len(), 1);

        let candidates = plan.extract(r#"<div class="post"><a href="/posts/z">z</a></div>"#);
        assert_eq!(candidates, vec![Candidate::link("/posts/z")]);
    }

    #[test]
    fn test_post_href_matching() {
        assert!(is_post_href("/posts/x-123"));
        assert!(is_post_href("https://www.linkedin.com/feed/update/urn:li:activity:1/"));
        assert!(is_post_href("/in/a/recent-activity-9/"));
        assert!(!is_post_href("/in/someone/"));
        assert!(!is_post_href("/feed/"));
    }
}
