//! Prioritized locator chains
//!
//! The site's markup shifts between layouts, so every UI step names an
//! ordered list of ways to find its element. The first locator that
//! matches wins.

use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::BrowserError;

/// Delay between polls while waiting for an element
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One way of finding an element on the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Plain CSS selector
    Css(String),
    /// First `tag` element whose visible text contains `text`
    Text { tag: String, text: String },
}

impl Locator {
    pub fn css(selector: &str) -> Self {
        Self::Css(selector.to_string())
    }

    pub fn text(tag: &str, text: &str) -> Self {
        Self::Text {
            tag: tag.to_string(),
            text: text.to_string(),
        }
    }

    /// Try this locator once; `None` if nothing matches right now
    pub async fn find(&self, page: &Page) -> Option<Element> {
        match self {
            Locator::Css(selector) => page.find_element(selector.as_str()).await.ok(),
            Locator::Text { tag, text } => {
                let elements = page.find_elements(tag.as_str()).await.ok()?;
                for element in elements {
                    if let Ok(Some(inner)) = element.inner_text().await {
                        if inner.contains(text.as_str()) {
                            return Some(element);
                        }
                    }
                }
                None
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "{}", selector),
            Locator::Text { tag, text } => write!(f, "{} with text {:?}", tag, text),
        }
    }
}

/// Human-readable summary of a chain, for errors and logs
pub fn describe(chain: &[Locator]) -> String {
    chain
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(" | ")
}

/// First element matched by any locator in `chain`, in chain order, right now
pub async fn find_first(page: &Page, chain: &[Locator]) -> Option<(usize, Element)> {
    for (idx, locator) in chain.iter().enumerate() {
        if let Some(element) = locator.find(page).await {
            debug!("Matched locator {}: {}", idx, locator);
            return Some((idx, element));
        }
    }
    None
}

/// Poll `chain` until one locator matches or `timeout` elapses
pub async fn wait_for_any(
    page: &Page,
    chain: &[Locator],
    timeout: Duration,
) -> Result<Element, BrowserError> {
    let started = Instant::now();
    loop {
        if let Some((_, element)) = find_first(page, chain).await {
            return Ok(element);
        }
        if started.elapsed() >= timeout {
            return Err(BrowserError::ElementNotFound {
                what: describe(chain),
                timeout_secs: timeout.as_secs(),
            });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait for any locator in `chain` and click it
pub async fn click_any(
    page: &Page,
    chain: &[Locator],
    timeout: Duration,
) -> Result<(), BrowserError> {
    let element = wait_for_any(page, chain, timeout).await?;
    element.click().await?;
    Ok(())
}
