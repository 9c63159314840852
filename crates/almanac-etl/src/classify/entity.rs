//! Entity-API classification backend.
//!
//! Fetches claims with `wbgetentities`, walks `subclass of` (P279) upward
//! from each entity's types and occupations, and evaluates the rule tables
//! locally. Superclass lookups are memoized for the lifetime of the backend,
//! so later batches mostly hit the cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;

use almanac_core::taxonomy::{ArtsRules, EntityFacts};
use almanac_core::Qid;

use super::{ClassificationBackend, RuleHit};
use crate::config::Config;
use crate::error::{HarvestError, HarvestResult};
use crate::http;
use crate::resilience::Throttle;

const SOURCE_NAME: &str = "Wikidata API";

/// Most ids `wbgetentities` accepts in one call for anonymous clients.
pub const ENTITY_LIMIT: usize = 50;

/// Instance of.
const PROP_INSTANCE_OF: &str = "P31";

/// Subclass of.
const PROP_SUBCLASS_OF: &str = "P279";

/// Occupation.
const PROP_OCCUPATION: &str = "P106";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    #[serde(default)]
    entities: Option<HashMap<String, WikidataEntity>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

/// A Wikidata entity with its claims (property-value pairs).
#[derive(Debug, Clone, Deserialize)]
pub struct WikidataEntity {
    pub id: String,

    /// Present (with an empty value) when the id does not exist.
    #[serde(default)]
    missing: Option<IgnoredAny>,

    #[serde(default)]
    pub claims: HashMap<String, Vec<WikidataClaim>>,
}

/// A single claim (statement) on a Wikidata entity.
#[derive(Debug, Clone, Deserialize)]
pub struct WikidataClaim {
    pub mainsnak: WikidataSnak,
}

/// The snak (property-value cell) inside a claim.
#[derive(Debug, Clone, Deserialize)]
pub struct WikidataSnak {
    /// Absent for `novalue` and `somevalue` snaks.
    #[serde(default)]
    pub datavalue: Option<WikidataDataValue>,
}

/// A typed data value: `{"type": "<type>", "value": <payload>}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WikidataDataValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

impl WikidataEntity {
    pub fn is_missing(&self) -> bool {
        self.missing.is_some()
    }

    /// Item ids referenced by `property`. Non-item values are skipped.
    pub fn get_entity_refs(&self, property: &str) -> Vec<Qid> {
        self.claims
            .get(property)
            .map(|claims| {
                claims
                    .iter()
                    .filter_map(|c| c.mainsnak.datavalue.as_ref())
                    .filter(|v| v.kind == "wikibase-entityid")
                    .filter_map(|v| v.value.get("id").and_then(serde_json::Value::as_str))
                    .filter_map(|id| id.parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn api_error(error: ApiError) -> HarvestError {
    let source_name = SOURCE_NAME.to_string();
    match error.code.as_str() {
        "toomanyvalues" | "param-too-long" | "no-such-entity" => HarvestError::QueryRejected {
            source_name,
            message: format!("{}: {}", error.code, error.info),
            status: None,
        },
        "maxlag" | "ratelimited" => HarvestError::RateLimited {
            source_name,
            retry_after: None,
        },
        _ => HarvestError::Malformed {
            source_name,
            message: format!("API error {}: {}", error.code, error.info),
        },
    }
}

fn entities_from_response(response: EntitiesResponse) -> HarvestResult<HashMap<Qid, WikidataEntity>> {
    if let Some(error) = response.error {
        return Err(api_error(error));
    }
    let entities = response.entities.ok_or_else(|| HarvestError::Malformed {
        source_name: SOURCE_NAME.to_string(),
        message: "response has neither entities nor error".to_string(),
    })?;

    Ok(entities
        .into_iter()
        .filter(|(_, entity)| !entity.is_missing())
        .filter_map(|(key, entity)| key.parse().ok().map(|qid| (qid, entity)))
        .collect())
}

/// Parse a `wbgetentities` body. Missing entities are left out.
pub fn parse_entities(body: &str) -> HarvestResult<HashMap<Qid, WikidataEntity>> {
    entities_from_response(http::parse_json(SOURCE_NAME, body)?)
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

/// Everything reachable from `seeds` in at most `max_depth` steps through
/// `parents`, seeds included.
pub fn closure(parents: &HashMap<Qid, Vec<Qid>>, seeds: &[Qid], max_depth: usize) -> HashSet<Qid> {
    let mut seen: HashSet<Qid> = seeds.iter().copied().collect();
    let mut frontier: Vec<Qid> = seen.iter().copied().collect();

    for _ in 0..max_depth {
        let next: Vec<Qid> = frontier
            .iter()
            .filter_map(|qid| parents.get(qid))
            .flatten()
            .copied()
            .filter(|parent| seen.insert(*parent))
            .collect();
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    seen
}

/// Type facts for one fetched entity, closed over the known hierarchy.
pub fn facts_for(
    qid: Qid,
    entity: &WikidataEntity,
    parents: &HashMap<Qid, Vec<Qid>>,
    max_depth: usize,
) -> EntityFacts {
    let mut type_seeds = vec![qid];
    type_seeds.extend(entity.get_entity_refs(PROP_INSTANCE_OF));
    let occupations = entity.get_entity_refs(PROP_OCCUPATION);

    EntityFacts::new(qid)
        .with_classes(closure(parents, &type_seeds, max_depth))
        .with_occupations(closure(parents, &occupations, max_depth))
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Classifies batches through the Wikidata action API.
#[derive(Debug)]
pub struct EntityApiBackend {
    http: Client,
    endpoint: String,
    throttle: Throttle,
    max_depth: usize,
    /// Direct superclasses of every class looked up so far.
    parents: Mutex<HashMap<Qid, Vec<Qid>>>,
}

impl EntityApiBackend {
    /// Create a new entity-API backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config, throttle: Throttle) -> HarvestResult<Self> {
        Ok(Self {
            http: http::build_client(&config.user_agent(), config.request_timeout())?,
            endpoint: config.entity_api_url.clone(),
            throttle,
            max_depth: config.max_subclass_depth,
            parents: Mutex::new(HashMap::new()),
        })
    }

    fn parents(&self) -> MutexGuard<'_, HashMap<Qid, Vec<Qid>>> {
        self.parents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_entities(&self, ids: &[Qid]) -> HarvestResult<HashMap<Qid, WikidataEntity>> {
        let joined = ids.iter().map(Qid::to_string).collect::<Vec<_>>().join("|");
        log::debug!("wbgetentities for {} ids", ids.len());

        let response = http::send(
            SOURCE_NAME,
            self.http.get(&self.endpoint).query(&[
                ("action", "wbgetentities"),
                ("ids", joined.as_str()),
                ("props", "claims"),
                ("format", "json"),
            ]),
        )
        .await?;

        let body: EntitiesResponse = http::read_json(SOURCE_NAME, response).await?;
        entities_from_response(body)
    }

    /// Look up and memoize the direct superclasses of `classes`.
    async fn fetch_parents(&self, classes: &[Qid]) -> HarvestResult<()> {
        for chunk in classes.chunks(ENTITY_LIMIT) {
            self.throttle.wait().await;
            let entities = self.fetch_entities(chunk).await?;
            let mut parents = self.parents();
            for qid in chunk {
                let direct = entities
                    .get(qid)
                    .map(|e| e.get_entity_refs(PROP_SUBCLASS_OF))
                    .unwrap_or_default();
                parents.insert(*qid, direct);
            }
        }
        Ok(())
    }

    /// Make sure the memo covers every class within `max_depth` of `seeds`.
    async fn load_ancestry(&self, seeds: Vec<Qid>) -> HarvestResult<()> {
        let mut seen: HashSet<Qid> = seeds.iter().copied().collect();
        let mut frontier = seeds;

        for _ in 0..self.max_depth {
            let missing: Vec<Qid> = {
                let parents = self.parents();
                frontier
                    .iter()
                    .filter(|qid| !parents.contains_key(qid))
                    .copied()
                    .collect()
            };
            if !missing.is_empty() {
                self.fetch_parents(&missing).await?;
            }

            let next: Vec<Qid> = {
                let parents = self.parents();
                frontier
                    .iter()
                    .filter_map(|qid| parents.get(qid))
                    .flatten()
                    .copied()
                    .filter(|parent| seen.insert(*parent))
                    .collect()
            };
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Ok(())
    }
}

#[async_trait]
impl ClassificationBackend for EntityApiBackend {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    fn batch_limit(&self) -> Option<usize> {
        Some(ENTITY_LIMIT)
    }

    async fn classify_batch(&self, batch: &[Qid], rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut entities = HashMap::new();
        for (i, chunk) in batch.chunks(ENTITY_LIMIT).enumerate() {
            if i > 0 {
                self.throttle.wait().await;
            }
            entities.extend(self.fetch_entities(chunk).await?);
        }

        let mut seeds = Vec::new();
        {
            let mut parents = self.parents();
            for (qid, entity) in &entities {
                let direct = entity.get_entity_refs(PROP_SUBCLASS_OF);
                seeds.extend(direct.iter().copied());
                parents.insert(*qid, direct);
                seeds.extend(entity.get_entity_refs(PROP_INSTANCE_OF));
                seeds.extend(entity.get_entity_refs(PROP_OCCUPATION));
            }
        }
        seeds.sort_unstable();
        seeds.dedup();
        self.load_ancestry(seeds).await?;

        let parents = self.parents();
        let hits = batch
            .iter()
            .filter_map(|qid| entities.get(qid).map(|entity| (*qid, entity)))
            .flat_map(|(qid, entity)| {
                let facts = facts_for(qid, entity, &parents, self.max_depth);
                rules.hits(&facts).into_iter().map(move |rule| (qid, rule))
            })
            .collect();
        Ok(hits)
    }
}
