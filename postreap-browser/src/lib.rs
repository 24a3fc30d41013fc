//! postreap browser layer
//!
//! Drives a Chromium session through the site:
//! - Browser discovery and launch (chromiumoxide)
//! - Prioritized locator chains for every UI step
//! - Login, hashtag search, posts and date filters
//! - A [`postreap_core::FeedSource`] over the rendered search feed

pub mod session;
pub mod locator;
pub mod steps;
pub mod strategy;
pub mod feed;
pub mod harvest;

pub use session::*;
pub use locator::*;
pub use steps::*;
pub use strategy::*;
pub use feed::*;
pub use harvest::*;
