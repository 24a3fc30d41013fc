//! postreap core - collection loop and domain model for post-link harvesting
//!
//! This crate provides the pieces that do not touch a browser:
//! - Bounded deduplicating collector over a pluggable feed source
//! - Identifier normalization (absolute URL, query stripped)
//! - Explicit run configuration loaded from TOML
//! - CSV and JSON persistence of collected links

pub mod identifier;
pub mod collector;
pub mod config;
pub mod output;

pub use identifier::*;
pub use collector::*;
pub use config::*;
pub use output::*;

/// Site every relative post link is resolved against
pub const DEFAULT_ORIGIN: &str = "https://www.linkedin.com";

/// Number of unique post links a job aims for
pub const DEFAULT_TARGET_POSTS: usize = 50;

/// Consecutive fruitless scroll attempts before a run gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;
