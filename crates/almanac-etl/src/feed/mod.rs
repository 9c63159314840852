//! Wikipedia "On This Day" feed client.
//!
//! One GET per bucket against `{base}/{bucket}/{MM}/{DD}`. The payload is a
//! JSON object keyed by bucket name; each key maps to an array of entries
//! with `text`, an optional `year`, and the `pages` they reference.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::task::JoinSet;

use almanac_core::{Bucket, MonthDay, OtdItem, Page};

use crate::config::Config;
use crate::error::{HarvestError, HarvestResult};
use crate::http;
use crate::resilience::RetryPolicy;

const SOURCE_NAME: &str = "Wikipedia";

/// Something that can produce the feed items of one bucket for one day.
#[async_trait]
pub trait FeedSource: Send + Sync + fmt::Debug {
    /// Fetch one bucket. For [`Bucket::All`] the returned items carry the
    /// concrete bucket they were listed under.
    async fn fetch_bucket(&self, day: MonthDay, bucket: Bucket) -> HarvestResult<Vec<OtdItem>>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One entry as it appears in the feed. `text` is required.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    text: String,
    #[serde(default)]
    year: Option<i32>,
    #[serde(default)]
    pages: Vec<Page>,
}

impl FeedEntry {
    fn into_item(self, bucket: Bucket) -> OtdItem {
        OtdItem {
            bucket,
            text: self.text.trim().to_string(),
            year: self.year,
            pages: self.pages,
        }
    }
}

/// Parse a feed payload for `bucket`.
///
/// A single-bucket payload must contain that bucket's key. The umbrella
/// payload is read in the fixed daily order; keys it does not carry
/// contribute nothing.
pub fn parse_payload(body: &str, bucket: Bucket) -> HarvestResult<Vec<OtdItem>> {
    items_from_payload(http::parse_json(SOURCE_NAME, body)?, bucket)
}

fn items_from_payload(
    mut payload: HashMap<String, serde_json::Value>,
    bucket: Bucket,
) -> HarvestResult<Vec<OtdItem>> {
    let wanted: Vec<Bucket> = if bucket.is_umbrella() {
        Bucket::DAILY.to_vec()
    } else {
        vec![bucket]
    };

    let mut items = Vec::new();
    for b in wanted {
        let Some(value) = payload.remove(b.as_str()) else {
            if bucket.is_umbrella() {
                log::debug!("Umbrella payload has no {} key", b);
                continue;
            }
            return Err(HarvestError::Malformed {
                source_name: SOURCE_NAME.to_string(),
                message: format!("payload has no {:?} key", b.as_str()),
            });
        };

        let entries: Vec<FeedEntry> =
            serde_json::from_value(value).map_err(|e| HarvestError::Malformed {
                source_name: SOURCE_NAME.to_string(),
                message: format!("{}: {}", b, e),
            })?;
        items.extend(entries.into_iter().map(|e| e.into_item(b)));
    }

    Ok(items)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// REST client for the Wikipedia feed.
#[derive(Debug, Clone)]
pub struct WikipediaFeed {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl WikipediaFeed {
    /// Create a new feed client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> HarvestResult<Self> {
        Ok(Self {
            http: http::build_client(&config.user_agent(), config.request_timeout())?,
            base_url: config.feed_base_url.trim_end_matches('/').to_string(),
            retry: config.retry_policy(),
        })
    }

    /// URL for one bucket and day, with two-digit month and day.
    pub fn url_for(&self, day: MonthDay, bucket: Bucket) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url,
            bucket.as_str(),
            day.month_str(),
            day.day_str()
        )
    }
}

#[async_trait]
impl FeedSource for WikipediaFeed {
    async fn fetch_bucket(&self, day: MonthDay, bucket: Bucket) -> HarvestResult<Vec<OtdItem>> {
        let url = self.url_for(day, bucket);
        log::debug!("GET {}", url);

        let http_client = &self.http;
        let url_ref = url.as_str();
        let payload: HashMap<String, serde_json::Value> = self
            .retry
            .run(SOURCE_NAME, move || async move {
                let response = http::send(
                    SOURCE_NAME,
                    http_client
                        .get(url_ref)
                        .header(reqwest::header::ACCEPT, "application/json"),
                )
                .await?;
                http::read_json(SOURCE_NAME, response).await
            })
            .await?;

        items_from_payload(payload, bucket)
    }
}

// ---------------------------------------------------------------------------
// Day fetch
// ---------------------------------------------------------------------------

/// Fetch every requested bucket for `day`, concurrently.
///
/// Items come back grouped in the order the buckets were requested,
/// regardless of which request finished first. A bucket answering with a
/// non-success status contributes zero items, except the umbrella bucket,
/// whose failure is fatal. Transport and parse failures are always fatal.
pub async fn fetch_day(
    source: Arc<dyn FeedSource>,
    day: MonthDay,
    buckets: &[Bucket],
) -> HarvestResult<Vec<OtdItem>> {
    let mut requested: Vec<Bucket> = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        if !requested.contains(bucket) {
            requested.push(*bucket);
        }
    }

    let mut tasks = JoinSet::new();
    for (position, bucket) in requested.iter().copied().enumerate() {
        let source = Arc::clone(&source);
        tasks.spawn(async move { (position, bucket, source.fetch_bucket(day, bucket).await) });
    }

    let mut results: Vec<(usize, Vec<OtdItem>)> = Vec::with_capacity(requested.len());
    while let Some(joined) = tasks.join_next().await {
        let (position, bucket, result) = joined?;
        match result {
            Ok(items) => {
                log::info!("Fetched {} {} items for {}", items.len(), bucket, day);
                results.push((position, items));
            }
            Err(e) if !bucket.is_umbrella() && e.http_status().is_some() => {
                log::warn!("Bucket {} contributed no items for {}: {}", bucket, day, e);
                results.push((position, Vec::new()));
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e);
            }
        }
    }

    results.sort_by_key(|(position, _)| *position);
    Ok(results.into_iter().flat_map(|(_, items)| items).collect())
}
