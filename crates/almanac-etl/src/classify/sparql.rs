//! SPARQL classification backend.
//!
//! One query per batch: the batch is bound with `VALUES ?item`, and every
//! rule row becomes a `UNION` arm that binds the row's priority as `?rule`.
//! Work rows accept the item itself or anything it is a (transitive)
//! instance of. Occupation rows apply only to humans.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use almanac_core::taxonomy::{ArtsRules, ClassRule, RuleFamily, HUMAN};
use almanac_core::Qid;

use super::{ClassificationBackend, RuleHit};
use crate::config::Config;
use crate::error::{HarvestError, HarvestResult};
use crate::http;

const SOURCE_NAME: &str = "Wikidata SPARQL";

const RESULTS_MEDIA_TYPE: &str = "application/sparql-results+json";

// ---------------------------------------------------------------------------
// Response types (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SparqlResult {
    results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

// ---------------------------------------------------------------------------
// Query building
// ---------------------------------------------------------------------------

fn values_clause(var: &str, qids: &[Qid]) -> String {
    let terms: Vec<String> = qids.iter().map(Qid::sparql_term).collect();
    format!("VALUES {} {{ {} }}", var, terms.join(" "))
}

fn arm(row: &ClassRule, family: RuleFamily, priority: usize) -> String {
    let path = match family {
        RuleFamily::Work => "?item wdt:P31?/wdt:P279* ?class .".to_string(),
        RuleFamily::Occupation => format!(
            "?item wdt:P31 {} ; wdt:P106/wdt:P279* ?class .",
            HUMAN.sparql_term()
        ),
    };
    format!(
        "  {{\n    # {}\n    {}\n    {}\n    BIND({} AS ?rule)\n  }}",
        row.name,
        values_clause("?class", &row.classes),
        path,
        priority
    )
}

/// Build the query for one batch.
pub fn build_query(batch: &[Qid], rules: &ArtsRules) -> String {
    let arms: Vec<String> = rules
        .iter()
        .map(|(rule, row)| arm(row, rule.family, rules.priority(rule)))
        .collect();

    [
        "SELECT DISTINCT ?item ?rule WHERE {".to_string(),
        format!("  {}", values_clause("?item", batch)),
        arms.join("\n  UNION\n"),
        "}\n".to_string(),
    ]
    .join("\n")
}

fn malformed(message: impl Into<String>) -> HarvestError {
    HarvestError::Malformed {
        source_name: SOURCE_NAME.to_string(),
        message: message.into(),
    }
}

/// Turn a results document into rule hits.
///
/// Every binding must carry an `item` entity URI and an integer `rule` that
/// names an existing row.
pub fn parse_results(body: &str, rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
    let result: SparqlResult = http::parse_json(SOURCE_NAME, body)?;
    hits_from_result(result, rules)
}

fn hits_from_result(result: SparqlResult, rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
    result
        .results
        .bindings
        .into_iter()
        .map(|binding| {
            let item = binding
                .get("item")
                .ok_or_else(|| malformed("binding without ?item"))?;
            let rule = binding
                .get("rule")
                .ok_or_else(|| malformed("binding without ?rule"))?;

            let qid: Qid = item
                .value
                .parse()
                .map_err(|e: almanac_core::Error| malformed(e.to_string()))?;
            let priority: usize = rule
                .value
                .parse()
                .map_err(|_| malformed(format!("non-integer ?rule {:?}", rule.value)))?;
            let rule_ref = rules
                .rule_at_priority(priority)
                .ok_or_else(|| malformed(format!("?rule {priority} names no rule row")))?;

            Ok((qid, rule_ref))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Classifies batches with one SPARQL query each.
#[derive(Debug, Clone)]
pub struct SparqlBackend {
    http: Client,
    endpoint: String,
}

impl SparqlBackend {
    /// Create a new SPARQL backend.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> HarvestResult<Self> {
        Ok(Self {
            http: http::build_client(&config.user_agent(), config.request_timeout())?,
            endpoint: config.sparql_url.clone(),
        })
    }
}

#[async_trait]
impl ClassificationBackend for SparqlBackend {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn classify_batch(&self, batch: &[Qid], rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let query = build_query(batch, rules);
        log::debug!("SPARQL query for {} ids ({} bytes)", batch.len(), query.len());

        let response = http::send(
            SOURCE_NAME,
            self.http
                .post(&self.endpoint)
                .header(reqwest::header::ACCEPT, RESULTS_MEDIA_TYPE)
                .form(&[("query", query.as_str())]),
        )
        .await?;

        let result: SparqlResult = http::read_json(SOURCE_NAME, response).await?;
        hits_from_result(result, rules)
    }
}
