//! Chromium session
//!
//! Finds a Chromium-family executable, launches it and owns the single
//! page a harvest runs in.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use postreap_core::ScrapeSettings;

/// Browser window size used for every session
pub const WINDOW_SIZE: (u32, u32) = (1366, 768);

/// Errors from the browser layer
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("No Chromium executable found (set CHROME_EXECUTABLE)")]
    ChromiumNotFound,

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Cdp(#[from] CdpError),

    #[error("Timed out after {timeout_secs}s waiting for {what}")]
    ElementNotFound { what: String, timeout_secs: u64 },

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Search failed: {0}")]
    Search(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),
}

/// Locate a Chromium-family executable.
///
/// Order: `CHROME_EXECUTABLE`, then `PATH`, then well-known install paths.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let names = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for name in names {
                let candidate = dir.join(name);
                if candidate.exists() {
                    return Some(candidate);
                }
            }
        }
    }

    let well_known: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
        ]
    };

    well_known.iter().map(PathBuf::from).find(|p| p.exists())
}

/// A running browser plus the page a harvest drives
pub struct Session {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl Session {
    /// Launch Chromium with the given settings and open a blank page
    pub async fn launch(settings: &ScrapeSettings) -> Result<Self, BrowserError> {
        let executable = find_chromium().ok_or(BrowserError::ChromiumNotFound)?;
        debug!("Using Chromium at {}", executable.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .window_size(WINDOW_SIZE.0, WINDOW_SIZE.1)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", settings.user_agent));
        if !settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        info!("Browser started successfully (headless: {})", settings.headless);
        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Close the browser; failures are logged, never returned
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            error!("Error closing browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
        info!("Browser closed and resources cleaned up");
    }
}
