//! Extract, classify and emit stages for almanac.
//!
//! Fetches the Wikipedia "On This Day" feed, classifies every referenced
//! Wikidata entity against the arts rule tables (through SPARQL or the
//! entity API), falls back to keyword heuristics when classification comes
//! back empty, and writes deduplicated, sorted records as JSON or CSV.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod classify;
pub mod config;
pub mod error;
pub mod feed;
pub mod harvest;
pub mod output;
pub mod resilience;

mod http;

pub use classify::{BackendKind, BatchClassifier, Classification, ClassificationBackend};
pub use config::Config;
pub use error::{HarvestError, HarvestResult};
pub use feed::{FeedSource, WikipediaFeed};
pub use harvest::{Harvest, Harvester, RunReport};
pub use output::{OutputFormat, OutputTarget};
