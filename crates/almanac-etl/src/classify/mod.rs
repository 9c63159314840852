//! Entity classification against Wikidata.
//!
//! A [`ClassificationBackend`] answers one question for a batch of entities:
//! which rule rows does each of them hit? Two backends exist, a SPARQL one
//! that evaluates the whole rule table server-side and an entity-API one
//! that walks the class hierarchy itself. [`BatchClassifier`] drives either
//! of them with batching, retries, splitting and throttling.

pub mod batch;
pub mod entity;
pub mod sparql;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use almanac_core::taxonomy::{ArtsRules, RuleRef};
use almanac_core::Qid;

use crate::config::Config;
use crate::error::HarvestResult;
use crate::resilience::Throttle;

pub use batch::{BatchClassifier, Classification, ClassificationReport};
pub use entity::EntityApiBackend;
pub use sparql::SparqlBackend;

/// A backend's raw answer: `qid` matched the row `rule`.
pub type RuleHit = (Qid, RuleRef);

/// One way of asking Wikidata about entity types.
#[async_trait]
pub trait ClassificationBackend: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Hard cap on ids per call imposed by the remote API, if any.
    fn batch_limit(&self) -> Option<usize> {
        None
    }

    /// Report every rule row each entity in `batch` hits. Entities that hit
    /// nothing are simply absent from the result.
    async fn classify_batch(&self, batch: &[Qid], rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>>;
}

/// Which backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sparql,
    Entity,
}

impl BackendKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sparql => "sparql",
            Self::Entity => "entity",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sparql" => Ok(Self::Sparql),
            "entity" | "api" => Ok(Self::Entity),
            other => Err(format!("unknown backend: {other} (expected sparql or entity)")),
        }
    }
}

/// Build the configured backend. The entity backend paces its own
/// hierarchy lookups with `throttle`.
///
/// # Errors
/// Returns an error if the HTTP client cannot be created.
pub fn build_backend(
    config: &Config,
    throttle: &Throttle,
) -> HarvestResult<Arc<dyn ClassificationBackend>> {
    Ok(match config.backend {
        BackendKind::Sparql => Arc::new(SparqlBackend::new(config)?),
        BackendKind::Entity => Arc::new(EntityApiBackend::new(config, throttle.clone())?),
    })
}
