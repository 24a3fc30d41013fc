//! postreap HTTP API
//!
//! Starts keyword scrape jobs in the background and serves their status
//! and results. State lives in a shared [`postreap_runtime::JobStore`].

pub mod error;
pub mod routes;

pub use error::*;
pub use routes::*;
