//! Batching driver around a [`ClassificationBackend`].
//!
//! Ids are deduplicated and cut into batches that are processed in order
//! from an explicit work queue. Each batch is throttled, retried on
//! transient failures, and split in half when the backend rejects it as too
//! large. A rejected single id, or a batch that keeps failing, is dropped
//! and reported rather than failing the run.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use almanac_core::taxonomy::ArtsRules;
use almanac_core::{Category, Qid};

use super::{build_backend, ClassificationBackend, RuleHit};
use crate::config::Config;
use crate::error::HarvestResult;
use crate::resilience::{RetryPolicy, Throttle};

/// Counters for one [`BatchClassifier::classify`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    /// Distinct ids asked about.
    pub requested: usize,
    /// Batches that reached a final outcome (answered or dropped).
    pub batches: usize,
    /// Backend calls, retries included.
    pub attempts: usize,
    /// Batches split because they were rejected as too large.
    pub splits: usize,
    /// Ids excluded because their batch could not be classified.
    pub dropped: Vec<Qid>,
}

/// Outcome of classifying a set of ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub categories: BTreeMap<Qid, Category>,
    pub report: ClassificationReport,
}

impl Classification {
    pub fn get(&self, qid: Qid) -> Option<Category> {
        self.categories.get(&qid).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }
}

/// Drives a backend over arbitrarily many ids.
#[derive(Debug, Clone)]
pub struct BatchClassifier {
    backend: Arc<dyn ClassificationBackend>,
    rules: ArtsRules,
    max_batch_size: usize,
    retry: RetryPolicy,
    throttle: Throttle,
}

impl BatchClassifier {
    /// Create a classifier. The batch size is clamped to the backend's own
    /// limit and to at least one.
    pub fn new(
        backend: Arc<dyn ClassificationBackend>,
        rules: ArtsRules,
        max_batch_size: usize,
        retry: RetryPolicy,
        throttle: Throttle,
    ) -> Self {
        let limit = backend.batch_limit().unwrap_or(usize::MAX);
        Self {
            backend,
            rules,
            max_batch_size: max_batch_size.clamp(1, limit.max(1)),
            retry,
            throttle,
        }
    }

    /// Build the configured backend and wrap it.
    ///
    /// # Errors
    /// Returns an error if the backend's HTTP client cannot be created.
    pub fn from_config(config: &Config) -> HarvestResult<Self> {
        let throttle = Throttle::new(config.min_request_interval());
        let backend = build_backend(config, &throttle)?;
        Ok(Self::new(
            backend,
            ArtsRules::standard(),
            config.max_batch_size,
            config.retry_policy(),
            throttle,
        ))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn rules(&self) -> &ArtsRules {
        &self.rules
    }

    /// Classify `ids`, returning a category for every id that hit a rule.
    ///
    /// Never fails: ids whose batch cannot be answered are listed in
    /// [`ClassificationReport::dropped`].
    pub async fn classify(&self, ids: &[Qid]) -> Classification {
        let mut seen = HashSet::new();
        let unique: Vec<Qid> = ids.iter().copied().filter(|q| seen.insert(*q)).collect();

        let mut report = ClassificationReport {
            requested: unique.len(),
            ..ClassificationReport::default()
        };
        let mut hits: Vec<RuleHit> = Vec::new();

        let mut queue: VecDeque<(Vec<Qid>, usize)> = unique
            .chunks(self.max_batch_size)
            .map(|chunk| (chunk.to_vec(), 0))
            .collect();

        log::info!(
            "Classifying {} ids via {} in {} batch(es)",
            unique.len(),
            self.backend.name(),
            queue.len()
        );

        while let Some((batch, depth)) = queue.pop_front() {
            log::debug!("Batch of {} ids (split depth {})", batch.len(), depth);

            match self.attempt(&batch, &mut report).await {
                Ok(batch_hits) => {
                    report.batches += 1;
                    let members: HashSet<Qid> = batch.iter().copied().collect();
                    hits.extend(batch_hits.into_iter().filter(|(q, _)| members.contains(q)));
                }
                Err(e) if e.is_rejected() && batch.len() > 1 => {
                    report.splits += 1;
                    let mid = batch.len() / 2;
                    log::debug!(
                        "{} rejected {} ids ({}); splitting into {} + {}",
                        self.backend.name(),
                        batch.len(),
                        e,
                        mid,
                        batch.len() - mid
                    );
                    let (left, right) = batch.split_at(mid);
                    queue.push_front((right.to_vec(), depth + 1));
                    queue.push_front((left.to_vec(), depth + 1));
                }
                Err(e) => {
                    report.batches += 1;
                    log::warn!(
                        "Dropping {} id(s) that {} could not classify: {}",
                        batch.len(),
                        self.backend.name(),
                        e
                    );
                    report.dropped.extend(batch);
                }
            }
        }

        let categories = self.rules.resolve(hits);
        log::info!(
            "Classified {} of {} ids ({} dropped, {} split(s))",
            categories.len(),
            report.requested,
            report.dropped.len(),
            report.splits
        );

        Classification { categories, report }
    }

    async fn attempt(
        &self,
        batch: &[Qid],
        report: &mut ClassificationReport,
    ) -> HarvestResult<Vec<RuleHit>> {
        let attempts = std::sync::atomic::AtomicUsize::new(0);
        let attempts_ref = &attempts;
        let backend = &self.backend;
        let rules = &self.rules;
        let throttle = &self.throttle;

        let result = self
            .retry
            .run(backend.name(), move || async move {
                throttle.wait().await;
                attempts_ref.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                backend.classify_batch(batch, rules).await
            })
            .await;

        report.attempts += attempts.into_inner();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use almanac_core::taxonomy::{ClassRule, RuleLabel, RuleRef};

    use crate::error::HarvestError;

    fn q(n: u64) -> Qid {
        Qid::from_number(n)
    }

    fn rules() -> ArtsRules {
        ArtsRules::new(
            vec![
                ClassRule::new("music", RuleLabel::Music, &[1]),
                ClassRule::new("film", RuleLabel::FilmTv, &[2]),
            ],
            vec![ClassRule::new("musician", RuleLabel::Music, &[3])],
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn classifier(backend: Arc<FakeBackend>, size: usize) -> BatchClassifier {
        BatchClassifier::new(
            backend,
            rules(),
            size,
            fast_retry(),
            Throttle::new(Duration::ZERO),
        )
    }

    /// Every even id hits the film row, every id divisible by 3 also hits
    /// the music row. Records each batch it was asked about.
    #[derive(Debug, Default)]
    struct FakeBackend {
        calls: AtomicUsize,
        batches: Mutex<Vec<Vec<Qid>>>,
        fail_first: usize,
        reject_above: Option<usize>,
        reject_ids: Vec<Qid>,
        limit: Option<usize>,
    }

    #[async_trait]
    impl ClassificationBackend for FakeBackend {
        fn name(&self) -> &str {
            "fake"
        }

        fn batch_limit(&self) -> Option<usize> {
            self.limit
        }

        async fn classify_batch(&self, batch: &[Qid], _rules: &ArtsRules) -> HarvestResult<Vec<RuleHit>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(batch.to_vec());

            if n < self.fail_first {
                return Err(HarvestError::RateLimited {
                    source_name: "fake".to_string(),
                    retry_after: None,
                });
            }
            let too_big = self.reject_above.is_some_and(|max| batch.len() > max);
            if too_big || batch.iter().any(|q| self.reject_ids.contains(q)) {
                return Err(HarvestError::QueryRejected {
                    source_name: "fake".to_string(),
                    message: "too large".to_string(),
                    status: Some(413),
                });
            }

            let mut hits = Vec::new();
            for qid in batch {
                if qid.number() % 2 == 0 {
                    hits.push((*qid, RuleRef::work(1)));
                }
                if qid.number() % 3 == 0 {
                    hits.push((*qid, RuleRef::work(0)));
                }
            }
            // Out-of-batch noise must be ignored.
            hits.push((q(999_999), RuleRef::work(0)));
            Ok(hits)
        }
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success() {
        let backend = Arc::new(FakeBackend {
            fail_first: 2,
            ..FakeBackend::default()
        });
        let result = classifier(Arc::clone(&backend), 25).classify(&[q(2), q(5)]).await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.report.attempts, 3);
        assert_eq!(result.get(q(2)), Some(Category::FilmTv));
        assert_eq!(result.get(q(5)), None);
        assert!(result.report.dropped.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_batch_is_split_in_halves() {
        let backend = Arc::new(FakeBackend {
            reject_above: Some(20),
            ..FakeBackend::default()
        });
        let ids: Vec<Qid> = (1..=40).map(q).collect();
        let result = classifier(Arc::clone(&backend), 40).classify(&ids).await;

        let batches = backend.batches.lock().unwrap().clone();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![40, 20, 20]);
        assert_eq!(batches[1], ids[..20].to_vec());
        assert_eq!(batches[2], ids[20..].to_vec());

        assert_eq!(result.report.splits, 1);
        assert!(result.report.dropped.is_empty());
        // Evens and multiples of three, each exactly once.
        let expected = ids
            .iter()
            .filter(|q| q.number() % 2 == 0 || q.number() % 3 == 0)
            .count();
        assert_eq!(result.len(), expected);
        assert!(!result.categories.contains_key(&q(999_999)));
    }

    #[tokio::test]
    async fn test_priority_resolution_across_hits() {
        let backend = Arc::new(FakeBackend::default());
        let result = classifier(backend, 25).classify(&[q(6)]).await;
        // Q6 hits film (row 1) and music (row 0); music wins.
        assert_eq!(result.get(q(6)), Some(Category::Music));
    }

    #[tokio::test]
    async fn test_rejected_single_id_is_dropped() {
        let backend = Arc::new(FakeBackend {
            reject_ids: vec![q(4)],
            ..FakeBackend::default()
        });
        let result = classifier(backend, 4).classify(&[q(1), q(2), q(3), q(4)]).await;

        assert_eq!(result.report.dropped, vec![q(4)]);
        assert_eq!(result.get(q(2)), Some(Category::FilmTv));
        assert_eq!(result.get(q(3)), Some(Category::Music));
        assert_eq!(result.get(q(4)), None);
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_the_batch() {
        let backend = Arc::new(FakeBackend {
            fail_first: usize::MAX,
            ..FakeBackend::default()
        });
        let result = classifier(Arc::clone(&backend), 2).classify(&[q(2), q(4), q(6)]).await;

        assert!(result.is_empty());
        assert_eq!(result.report.dropped, vec![q(2), q(4), q(6)]);
        // Two batches, each tried once plus three retries.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_ids_are_deduplicated_and_batched() {
        let backend = Arc::new(FakeBackend::default());
        let ids = [q(1), q(2), q(1), q(3), q(2), q(4), q(5)];
        let result = classifier(Arc::clone(&backend), 2).classify(&ids).await;

        let batches = backend.batches.lock().unwrap().clone();
        assert_eq!(
            batches,
            vec![vec![q(1), q(2)], vec![q(3), q(4)], vec![q(5)]]
        );
        assert_eq!(result.report.requested, 5);
        assert_eq!(result.report.batches, 3);
    }

    #[tokio::test]
    async fn test_batch_size_respects_backend_limit() {
        let backend = Arc::new(FakeBackend {
            limit: Some(3),
            ..FakeBackend::default()
        });
        let classifier = classifier(backend, 25);
        assert_eq!(classifier.max_batch_size(), 3);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let backend = Arc::new(FakeBackend::default());
        let result = classifier(Arc::clone(&backend), 25).classify(&[]).await;
        assert!(result.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }
}
