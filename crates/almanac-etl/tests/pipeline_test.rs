//! End-to-end harvest runs against in-memory feed and classification fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use almanac_core::taxonomy::{ArtsRules, RuleLabel, RuleRef};
use almanac_core::{Bucket, Category, MonthDay, OtdItem, Page, Qid};
use almanac_etl::classify::RuleHit;
use almanac_etl::output::{self, OutputFormat, OutputTarget};
use almanac_etl::resilience::{RetryPolicy, Throttle};
use almanac_etl::{
    BatchClassifier, ClassificationBackend, FeedSource, HarvestError, HarvestResult, Harvester,
};

fn q(n: u64) -> Qid {
    Qid::from_number(n)
}

fn day() -> MonthDay {
    MonthDay::new(9, 21).unwrap()
}

fn page(title: &str, description: &str, qid: u64) -> Page {
    Page::new(title)
        .with_description(description)
        .with_qid(q(qid))
}

/// Serves fixed items per bucket; buckets without an entry answer 404.
#[derive(Debug, Default)]
struct FixedFeed {
    buckets: HashMap<Bucket, Vec<OtdItem>>,
}

impl FixedFeed {
    fn with(mut self, bucket: Bucket, items: Vec<OtdItem>) -> Self {
        self.buckets.insert(bucket, items);
        self
    }
}

#[async_trait]
impl FeedSource for FixedFeed {
    async fn fetch_bucket(&self, _day: MonthDay, bucket: Bucket) -> HarvestResult<Vec<OtdItem>> {
        self.buckets
            .get(&bucket)
            .cloned()
            .ok_or(HarvestError::Status {
                source_name: "Wikipedia".to_string(),
                status: 404,
            })
    }
}

/// Answers from a fixed id → rule table, optionally rate limiting the first
/// few calls.
#[derive(Debug, Default)]
struct FixedBackend {
    answers: HashMap<Qid, RuleRef>,
    rate_limit_first: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl ClassificationBackend for FixedBackend {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify_batch(&self, batch: &[Qid], _rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.rate_limit_first {
            return Err(HarvestError::RateLimited {
                source_name: "fixed".to_string(),
                retry_after: Some(Duration::from_millis(1)),
            });
        }
        Ok(batch
            .iter()
            .filter_map(|qid| self.answers.get(qid).map(|rule| (*qid, *rule)))
            .collect())
    }
}

fn first_rule(label: RuleLabel, occupation: bool) -> RuleRef {
    let rules = ArtsRules::standard();
    let table = if occupation {
        rules.occupation_rules()
    } else {
        rules.work_rules()
    };
    let index = table
        .iter()
        .position(|row| row.label == label)
        .unwrap();
    if occupation {
        RuleRef::occupation(index)
    } else {
        RuleRef::work(index)
    }
}

fn harvester(feed: FixedFeed, backend: Arc<FixedBackend>) -> Harvester {
    let classifier = BatchClassifier::new(
        backend,
        ArtsRules::standard(),
        25,
        RetryPolicy {
            max_retries: 5,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        Throttle::new(Duration::ZERO),
    );
    Harvester::new(Arc::new(feed), classifier).unwrap()
}

fn singer_feed() -> FixedFeed {
    FixedFeed::default()
        .with(
            Bucket::Births,
            vec![OtdItem::new(Bucket::Births, "SingerX, American singer")
                .with_year(1970)
                .with_page(page("Wikipedia:SingerX", "American singer", 100))],
        )
        .with(Bucket::Events, Vec::new())
}

#[tokio::test]
async fn test_singer_is_classified_as_music() {
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(100), first_rule(RuleLabel::Music, true))]),
        ..FixedBackend::default()
    });

    let harvest = harvester(singer_feed(), backend)
        .run(day(), &[Bucket::Births])
        .await
        .unwrap();

    assert_eq!(harvest.records.len(), 1);
    let record = &harvest.records[0];
    assert_eq!(record.id, q(100));
    assert_eq!(record.category, Category::Music);
    assert_eq!(record.title, "Wikipedia:SingerX");
    assert_eq!(record.summary, "SingerX, American singer");
    assert_eq!(record.year, Some(1970));
    assert_eq!(record.bucket, Bucket::Births);
    assert_eq!(record.url, "https://en.wikipedia.org/wiki/Wikipedia:SingerX");
    assert!(!harvest.report.used_fallback);
}

#[tokio::test]
async fn test_rate_limited_classification_still_succeeds() {
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(100), first_rule(RuleLabel::Music, true))]),
        rate_limit_first: 2,
        ..FixedBackend::default()
    });

    let harvest = harvester(singer_feed(), Arc::clone(&backend))
        .run(day(), &[Bucket::Births])
        .await
        .unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert_eq!(harvest.records.len(), 1);
    assert!(harvest.report.dropped_ids.is_empty());
}

#[test]
fn test_work_rule_beats_occupation_rule() {
    let rules = ArtsRules::standard();
    let resolved = rules.resolve([
        (q(1), first_rule(RuleLabel::Music, true)),
        (q(1), first_rule(RuleLabel::Books, false)),
    ]);
    assert_eq!(resolved[&q(1)], Category::Books);
}

#[tokio::test]
async fn test_same_entity_in_two_buckets_yields_one_record() {
    let feed = FixedFeed::default()
        .with(
            Bucket::Events,
            vec![OtdItem::new(Bucket::Events, "Album released")
                .with_year(1991)
                .with_page(page("Nevermind", "1991 studio album by Nirvana", 200))],
        )
        .with(
            Bucket::Selected,
            vec![OtdItem::new(Bucket::Selected, "Nevermind, a landmark album")
                .with_page(page("Nevermind", "1991 studio album by Nirvana", 200))],
        );
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(200), first_rule(RuleLabel::Music, false))]),
        ..FixedBackend::default()
    });

    let harvest = harvester(feed, backend)
        .run(day(), &[Bucket::Events, Bucket::Selected])
        .await
        .unwrap();

    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.records[0].bucket, Bucket::Events);
    assert_eq!(harvest.report.candidates, 2);
    assert_eq!(harvest.report.unique_ids, 1);
}

#[tokio::test]
async fn test_item_with_several_classified_pages_yields_one_record() {
    let feed = FixedFeed::default().with(
        Bucket::Events,
        vec![
            OtdItem::new(Bucket::Events, "The Beatles release Abbey Road")
                .with_year(1969)
                .with_page(page("Abbey_Road", "1969 studio album by the Beatles", 500))
                .with_page(page("The_Beatles", "English rock band", 501)),
            OtdItem::new(Bucket::Events, "The Beatles play their last concert")
                .with_year(1969)
                .with_page(page("The_Beatles", "English rock band", 501)),
        ],
    );
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([
            (q(500), first_rule(RuleLabel::Music, false)),
            (q(501), first_rule(RuleLabel::Music, false)),
        ]),
        ..FixedBackend::default()
    });

    let harvest = harvester(feed, backend)
        .run(day(), &[Bucket::Events])
        .await
        .unwrap();

    let found: Vec<(Qid, &str)> = harvest
        .records
        .iter()
        .map(|r| (r.id, r.summary.as_str()))
        .collect();
    assert_eq!(
        found,
        vec![
            (q(500), "The Beatles release Abbey Road"),
            (q(501), "The Beatles play their last concert"),
        ]
    );
}

#[tokio::test]
async fn test_item_falls_through_to_next_classified_page() {
    let feed = FixedFeed::default().with(
        Bucket::Events,
        vec![OtdItem::new(Bucket::Events, "Premiere in London")
            .with_page(page("London", "Capital of England", 84))
            .with_page(page("Some Film", "1999 film", 300))],
    );
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(300), first_rule(RuleLabel::FilmTv, false))]),
        ..FixedBackend::default()
    });

    let harvest = harvester(feed, backend)
        .run(day(), &[Bucket::Events])
        .await
        .unwrap();

    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.records[0].id, q(300));
}

#[tokio::test]
async fn test_items_without_usable_pages_are_excluded() {
    let feed = FixedFeed::default().with(
        Bucket::Events,
        vec![
            OtdItem::new(Bucket::Events, "No pages at all").with_year(1800),
            OtdItem::new(Bucket::Events, "Only an unlinked page")
                .with_page(Page::new("Unlinked_article").with_description("American singer")),
            OtdItem::new(Bucket::Events, "A linked film")
                .with_page(page("Some Film", "1999 film", 300)),
        ],
    );
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(300), first_rule(RuleLabel::FilmTv, false))]),
        ..FixedBackend::default()
    });

    let harvest = harvester(feed, backend)
        .run(day(), &[Bucket::Events])
        .await
        .unwrap();

    assert_eq!(harvest.report.items_fetched, 3);
    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.records[0].category, Category::FilmTv);
}

#[tokio::test]
async fn test_keyword_fallback_when_nothing_classifies() {
    let feed = FixedFeed::default().with(
        Bucket::Births,
        vec![
            OtdItem::new(Bucket::Births, "SingerX, American singer")
                .with_page(page("SingerX", "American singer", 100)),
            OtdItem::new(Bucket::Births, "A mayor")
                .with_page(page("Jane Doe", "American politician", 101)),
            OtdItem::new(Bucket::Births, "A novelist")
                .with_page(page("John Roe", "English novelist", 102)),
        ],
    );

    let harvest = harvester(feed, Arc::new(FixedBackend::default()))
        .run(day(), &[Bucket::Births])
        .await
        .unwrap();

    assert!(harvest.report.used_fallback);
    assert_eq!(harvest.report.classified, 0);
    let found: Vec<(Qid, Category)> = harvest
        .records
        .iter()
        .map(|r| (r.id, r.category))
        .collect();
    assert_eq!(
        found,
        vec![(q(100), Category::Music), (q(102), Category::Books)]
    );
}

#[tokio::test]
async fn test_fallback_never_supplements_a_classification() {
    let feed = FixedFeed::default().with(
        Bucket::Births,
        vec![
            OtdItem::new(Bucket::Births, "SingerX").with_page(page("SingerX", "American singer", 100)),
            OtdItem::new(Bucket::Births, "Painter").with_page(page("P. Ainter", "French painter", 103)),
        ],
    );
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(100), first_rule(RuleLabel::Music, true))]),
        ..FixedBackend::default()
    });

    let harvest = harvester(feed, backend)
        .run(day(), &[Bucket::Births])
        .await
        .unwrap();

    assert!(!harvest.report.used_fallback);
    assert_eq!(harvest.records.len(), 1);
    assert_eq!(harvest.records[0].id, q(100));
}

#[tokio::test]
async fn test_output_is_byte_identical_across_runs() {
    let make = || {
        let feed = FixedFeed::default()
            .with(
                Bucket::Events,
                vec![
                    OtdItem::new(Bucket::Events, "Film premiere")
                        .with_year(1977)
                        .with_page(page("Star Wars", "1977 film", 17_738)),
                    OtdItem::new(Bucket::Events, "Album released")
                        .with_year(1991)
                        .with_page(page("Nevermind", "1991 album", 200)),
                ],
            )
            .with(
                Bucket::Deaths,
                vec![OtdItem::new(Bucket::Deaths, "Novelist dies")
                    .with_page(page("Some Author", "novelist", 42))],
            );
        let backend = Arc::new(FixedBackend {
            answers: HashMap::from([
                (q(17_738), first_rule(RuleLabel::FilmTv, false)),
                (q(200), first_rule(RuleLabel::Music, false)),
                (q(42), first_rule(RuleLabel::Books, true)),
            ]),
            ..FixedBackend::default()
        });
        harvester(feed, backend)
    };

    let buckets = [Bucket::Deaths, Bucket::Events];
    let first = make().run(day(), &buckets).await.unwrap();
    let second = make().run(day(), &buckets).await.unwrap();

    for format in [OutputFormat::Json, OutputFormat::Csv] {
        assert_eq!(
            output::render(&first.records, format).unwrap(),
            output::render(&second.records, format).unwrap()
        );
    }

    let categories: Vec<Category> = first.records.iter().map(|r| r.category).collect();
    assert_eq!(
        categories,
        vec![Category::Music, Category::FilmTv, Category::Books]
    );

    let dir = tempfile::tempdir().unwrap();
    let path = output::default_path(dir.path(), day(), OutputFormat::Json);
    output::write_output(&first.records, OutputFormat::Json, &OutputTarget::File(path.clone()))
        .unwrap();
    let written = std::fs::read(&path).unwrap();
    assert_eq!(written, output::render(&second.records, OutputFormat::Json).unwrap());
    assert!(path.ends_with("09-21.json"));
}

#[tokio::test]
async fn test_missing_bucket_contributes_nothing() {
    let backend = Arc::new(FixedBackend {
        answers: HashMap::from([(q(100), first_rule(RuleLabel::Music, true))]),
        ..FixedBackend::default()
    });

    // Deaths is not served and answers 404.
    let harvest = harvester(singer_feed(), backend)
        .run(day(), &[Bucket::Deaths, Bucket::Births])
        .await
        .unwrap();

    assert_eq!(harvest.records.len(), 1);
}

#[tokio::test]
async fn test_umbrella_bucket_failure_is_fatal() {
    let result = harvester(singer_feed(), Arc::new(FixedBackend::default()))
        .run(day(), &[Bucket::All])
        .await;

    assert!(matches!(result, Err(HarvestError::Status { status: 404, .. })));
}
