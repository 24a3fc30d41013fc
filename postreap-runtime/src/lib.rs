//! postreap runtime - background scrape jobs
//!
//! - Per-keyword job registry with atomic in-progress guard
//! - Pluggable [`Harvester`] seam (browser-backed in production)
//! - Job runner that harvests, saves files and records the outcome

pub mod jobs;
pub mod runner;

pub use jobs::*;
pub use runner::*;
