//! Scripted UI steps: login, search, posts filter, date filter
//!
//! Login and search are required and fail the run. The two filters are
//! best effort: when the site does not offer them the run continues on
//! the unfiltered results.

use chromiumoxide::page::Page;
use std::time::Duration;
use tracing::{info, warn};

use postreap_core::{Credentials, DateFilter, SiteConfig};

use crate::{click_any, find_first, wait_for_any, BrowserError, Locator};

/// Short pause letting the page settle after an action
const SETTLE: Duration = Duration::from_secs(2);

fn login_confirmation() -> Vec<Locator> {
    vec![
        Locator::css(".search-global-typeahead"),
        Locator::css(".feed-container-theme"),
        Locator::css(".global-nav"),
    ]
}

fn search_inputs() -> Vec<Locator> {
    vec![
        Locator::css(".search-global-typeahead__input"),
        Locator::css("input[placeholder*='Search']"),
        Locator::css(".search-global-typeahead input"),
    ]
}

fn posts_filter() -> Vec<Locator> {
    vec![
        Locator::text("button", "Posts"),
        Locator::css("button[aria-label*='Posts']"),
        Locator::text("button", "Content"),
        Locator::css("button[aria-label*='Content']"),
    ]
}

fn date_filter_toggle() -> Vec<Locator> {
    vec![
        Locator::css("#searchFilter_datePosted"),
        Locator::text("button", "Date posted"),
        Locator::css("button[aria-label*='Date posted']"),
    ]
}

fn show_results() -> Vec<Locator> {
    vec![Locator::text("button", "Show results")]
}

/// Locators for a date option, or `None` when no filtering is wanted
pub fn date_option(filter: DateFilter) -> Option<Vec<Locator>> {
    let (slug, seconds) = match filter {
        DateFilter::Past24h => ("past-24h", 86_400),
        DateFilter::PastWeek => ("past-week", 604_800),
        DateFilter::PastMonth => ("past-month", 2_592_000),
        DateFilter::AnyTime => return None,
    };
    Some(vec![
        Locator::css(&format!("input#datePosted-{}", slug)),
        Locator::text("label", filter.label()),
        Locator::css(&format!("input[value='r{}']", seconds)),
        Locator::css(&format!(".search-s-facet__form input[id*='{}']", slug)),
    ])
}

/// Hashtags joined with OR, as typed into the search box
pub fn search_query(hashtags: &[String]) -> String {
    hashtags
        .iter()
        .map(|h| h.trim())
        .filter(|h| !h.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// Sign in with the given credentials
pub async fn login(
    page: &Page,
    site: &SiteConfig,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<(), BrowserError> {
    let url = site.login_url();
    info!("Navigating to login page: {}", url);
    page.goto(url.as_str()).await?;

    let username = wait_for_any(page, &[Locator::css("#username")], timeout).await?;
    username.click().await?.type_str(credentials.email.as_str()).await?;

    let password = wait_for_any(page, &[Locator::css("#password")], timeout).await?;
    password.click().await?.type_str(credentials.password.as_str()).await?;

    click_any(page, &[Locator::css("button[type='submit']")], timeout).await?;

    wait_for_any(page, &login_confirmation(), timeout)
        .await
        .map_err(|e| BrowserError::Login(format!("no signed-in page after submit ({})", e)))?;

    info!("Successfully logged in");
    tokio::time::sleep(SETTLE).await;
    Ok(())
}

/// Search for the hashtags and wait for the results page
pub async fn search(page: &Page, hashtags: &[String], timeout: Duration) -> Result<(), BrowserError> {
    let query = search_query(hashtags);
    if query.is_empty() {
        return Err(BrowserError::Search("no hashtags to search for".to_string()));
    }
    info!("Searching for: {}", query);

    let input = wait_for_any(page, &search_inputs(), timeout)
        .await
        .map_err(|e| BrowserError::Search(format!("could not find search input ({})", e)))?;
    input.click().await?.type_str(query.as_str()).await?.press_key("Enter").await?;

    wait_for_any(page, &[Locator::css(".search-results-container")], timeout)
        .await
        .map_err(|e| BrowserError::Search(format!("results did not load ({})", e)))?;

    info!("Search results loaded");
    tokio::time::sleep(SETTLE).await;
    Ok(())
}

/// Switch the results to posts; returns whether the filter was clicked
pub async fn apply_posts_filter(page: &Page) -> bool {
    tokio::time::sleep(SETTLE).await;

    let Some((_, button)) = find_first(page, &posts_filter()).await else {
        warn!("Could not find Posts filter button, continuing anyway");
        return false;
    };
    if let Err(e) = button.click().await {
        warn!("Failed to apply Posts filter: {}", e);
        return false;
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    info!("Successfully applied Posts filter");
    true
}

/// Restrict results by post date; returns whether an option was selected
pub async fn apply_date_filter(page: &Page, filter: DateFilter, timeout: Duration) -> bool {
    let Some(option) = date_option(filter) else {
        info!("Date filter set to any time, skipping");
        return false;
    };
    info!("Applying 'Date posted' filter: {}", filter.label());

    let step_timeout = timeout.min(Duration::from_secs(5));
    if let Err(e) = click_any(page, &date_filter_toggle(), step_timeout).await {
        warn!("Could not find Date posted filter: {}", e);
        return false;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    if let Err(e) = click_any(page, &option, step_timeout).await {
        warn!("Could not select {} option: {}", filter.label(), e);
        return false;
    }

    match click_any(page, &show_results(), step_timeout).await {
        Ok(()) => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            info!("Successfully applied '{}' filter", filter.label());
        }
        Err(_) => {
            // Some layouts apply the option without a confirm button
            tokio::time::sleep(SETTLE).await;
            info!("Date filter applied (auto-apply)");
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_joins_with_or() {
        let tags = vec!["rust".to_string(), " hiring ".to_string(), "".to_string()];
        assert_eq!(search_query(&tags), "rust OR hiring");
        assert_eq!(search_query(&[]), "");
    }

    #[test]
    fn test_date_option_per_filter() {
        assert!(date_option(DateFilter::AnyTime).is_none());

        let week = date_option(DateFilter::PastWeek).unwrap();
        assert_eq!(week[0], Locator::css("input#datePosted-past-week"));
        assert_eq!(week[1], Locator::text("label", "Past week"));
        assert_eq!(week[2], Locator::css("input[value='r604800']"));

        let day = date_option(DateFilter::Past24h).unwrap();
        assert_eq!(day[2], Locator::css("input[value='r86400']"));
    }

    #[test]
    fn test_chains_are_ordered() {
        assert_eq!(login_confirmation()[0], Locator::css(".search-global-typeahead"));
        assert_eq!(search_inputs().len(), 3);
        assert_eq!(posts_filter()[0], Locator::text("button", "Posts"));
    }
}
