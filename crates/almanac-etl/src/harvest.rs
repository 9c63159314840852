//! The harvest run: feed → candidates → classification → records.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use almanac_core::taxonomy::{CalendarFilter, KeywordRules};
use almanac_core::{Bucket, Category, MonthDay, OtdItem, OutputRecord, Qid};

use crate::classify::BatchClassifier;
use crate::config::Config;
use crate::error::HarvestResult;
use crate::feed::{self, FeedSource, WikipediaFeed};

/// A page reference that may become a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position of the listing item in feed order.
    pub item: usize,
    pub qid: Qid,
    pub title: String,
    pub description: String,
    pub url: String,
    /// Text of the item the page was listed under.
    pub summary: String,
    pub year: Option<i32>,
    pub bucket: Bucket,
}

impl Candidate {
    /// Text the keyword fallback scans.
    pub fn keyword_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }

    fn into_record(self, day: MonthDay, category: Category) -> OutputRecord {
        OutputRecord {
            id: self.qid,
            date: day,
            title: self.title,
            summary: self.summary,
            url: self.url,
            category,
            year: self.year,
            bucket: self.bucket,
            times_seen: 0,
        }
    }
}

/// What happened during one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub items_fetched: usize,
    pub candidates: usize,
    pub unique_ids: usize,
    pub classified: usize,
    pub dropped_ids: Vec<Qid>,
    pub used_fallback: bool,
    pub records: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} items, {} candidates ({} unique), {} classified, {} dropped, {} records",
            self.items_fetched,
            self.candidates,
            self.unique_ids,
            self.classified,
            self.dropped_ids.len(),
            self.records
        )?;
        if self.used_fallback {
            f.write_str(" (keyword fallback)")?;
        }
        Ok(())
    }
}

/// Result of [`Harvester::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harvest {
    pub day: MonthDay,
    pub records: Vec<OutputRecord>,
    pub report: RunReport,
}

/// Pages with an entity id, in feed order, minus calendar pages.
pub fn collect_candidates(items: &[OtdItem], calendar: &CalendarFilter) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for (index, item) in items.iter().enumerate() {
        for (qid, page) in item.classifiable_pages() {
            let title = page.display_title();
            if calendar.is_calendar_page(&title) {
                log::debug!("Skipping calendar page {:?} ({})", title, qid);
                continue;
            }
            candidates.push(Candidate {
                item: index,
                qid,
                title,
                description: page.description().to_string(),
                url: page.url(),
                summary: item.text.clone(),
                year: item.year,
                bucket: item.bucket,
            });
        }
    }
    candidates
}

/// Turn categorized candidates into records, sorted by category, then
/// title, then id.
///
/// Each item contributes its first page that gets a category. Across items
/// an id is kept once, first occurrence winning.
pub fn build_records<F>(day: MonthDay, candidates: Vec<Candidate>, mut categorize: F) -> Vec<OutputRecord>
where
    F: FnMut(&Candidate) -> Option<Category>,
{
    let mut settled_items: HashSet<usize> = HashSet::new();
    let mut kept: HashSet<Qid> = HashSet::new();
    let mut records: Vec<OutputRecord> = Vec::new();

    for candidate in candidates {
        if settled_items.contains(&candidate.item) {
            continue;
        }
        let Some(category) = categorize(&candidate) else {
            continue;
        };
        settled_items.insert(candidate.item);
        if kept.insert(candidate.qid) {
            records.push(candidate.into_record(day, category));
        } else {
            log::debug!("Duplicate id {} under item {}", candidate.qid, candidate.item);
        }
    }

    records.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

/// Runs harvests against a feed and a classifier.
#[derive(Debug)]
pub struct Harvester {
    feed: Arc<dyn FeedSource>,
    classifier: BatchClassifier,
    keywords: KeywordRules,
    calendar: CalendarFilter,
}

impl Harvester {
    /// # Errors
    /// Returns an error if the built-in patterns fail to compile.
    pub fn new(feed: Arc<dyn FeedSource>, classifier: BatchClassifier) -> HarvestResult<Self> {
        Ok(Self {
            feed,
            classifier,
            keywords: KeywordRules::standard()?,
            calendar: CalendarFilter::new()?,
        })
    }

    /// Wire up the live Wikipedia feed and the configured backend.
    ///
    /// # Errors
    /// Returns an error if an HTTP client cannot be created.
    pub fn from_config(config: &Config) -> HarvestResult<Self> {
        let feed: Arc<dyn FeedSource> = Arc::new(WikipediaFeed::new(config)?);
        Self::new(feed, BatchClassifier::from_config(config)?)
    }

    pub fn classifier(&self) -> &BatchClassifier {
        &self.classifier
    }

    /// Run one harvest. An empty bucket list means every daily bucket.
    ///
    /// # Errors
    /// Fails only when the feed cannot be fetched. Classification problems
    /// drop ids and are listed in the report instead.
    pub async fn run(&self, day: MonthDay, buckets: &[Bucket]) -> HarvestResult<Harvest> {
        let buckets: &[Bucket] = if buckets.is_empty() { &Bucket::DAILY } else { buckets };
        log::info!(
            "Harvesting {} ({})",
            day,
            buckets.iter().map(Bucket::as_str).collect::<Vec<_>>().join(", ")
        );

        let items = feed::fetch_day(Arc::clone(&self.feed), day, buckets).await?;
        let candidates = collect_candidates(&items, &self.calendar);

        let mut seen = HashSet::new();
        let ids: Vec<Qid> = candidates
            .iter()
            .map(|c| c.qid)
            .filter(|q| seen.insert(*q))
            .collect();
        log::info!(
            "{} items, {} candidate pages, {} distinct ids",
            items.len(),
            candidates.len(),
            ids.len()
        );

        let mut report = RunReport {
            items_fetched: items.len(),
            candidates: candidates.len(),
            unique_ids: ids.len(),
            ..RunReport::default()
        };

        let classification = self.classifier.classify(&ids).await;
        report.classified = classification.len();
        report.dropped_ids.clone_from(&classification.report.dropped);

        let records = if classification.is_empty() {
            if !candidates.is_empty() {
                log::warn!("No ids classified; falling back to keyword matching");
            }
            report.used_fallback = true;
            build_records(day, candidates, |c| self.keywords.classify(&c.keyword_text()))
        } else {
            build_records(day, candidates, |c| classification.get(c.qid))
        };
        report.records = records.len();

        log::info!("Harvest for {}: {}", day, report);
        Ok(Harvest {
            day,
            records,
            report,
        })
    }
}
