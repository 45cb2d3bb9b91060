//! Concurrent extraction engine.
//!
//! Runs the classification port over every chunk of one or more levels with
//! a bounded worker pool. Guarantees: every chunk is scheduled exactly once
//! (retries re-attempt the same unit of work), results aggregate into a
//! deterministic order regardless of completion order, permanent failures
//! are recorded as skips rather than aborting the run, and cancellation
//! stops submitting new work while letting in-flight calls drain.
//!
//! The usage tracker is the only shared mutable state in the pipeline.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClassifyError, ExtractionError, Result};
use crate::pipeline::chunker::chunks_for;
use crate::traits::classifier::Classifier;
use crate::types::chunk::{Chunk, Level};
use crate::types::config::ExtractorConfig;
use crate::types::observation::RawObservation;
use crate::types::transcript::TranscriptUnit;
use crate::types::usage::{Usage, UsageTotals};

/// Engine knobs, extracted from [`ExtractorConfig`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrently in-flight classification calls.
    pub concurrency: usize,

    /// Attempt budget per chunk, including the first attempt.
    pub max_attempts: u32,

    /// Base delay for exponential backoff after a transient failure.
    pub backoff_base: Duration,

    /// Per-call timeout; timeouts count as transient failures.
    pub call_timeout: Option<Duration>,
}

impl From<&ExtractorConfig> for EngineConfig {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base,
            call_timeout: config.call_timeout,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&ExtractorConfig::default())
    }
}

/// Thread-safe accumulator for token usage.
///
/// Cloning shares the underlying totals. Updates go through one mutex and
/// only ever add integer token counts, so the final totals are identical
/// for any worker count.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    totals: Arc<Mutex<UsageTotals>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful call's usage.
    pub fn record(&self, usage: Usage) {
        self.totals
            .lock()
            .expect("usage tracker mutex poisoned")
            .record(usage);
    }

    /// Record usage consumed by a failed attempt.
    pub fn record_wasted(&self, usage: Usage) {
        self.totals
            .lock()
            .expect("usage tracker mutex poisoned")
            .record_wasted(usage);
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> UsageTotals {
        *self.totals.lock().expect("usage tracker mutex poisoned")
    }
}

/// A chunk that was permanently skipped, with enough context to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChunk {
    pub level: Level,
    pub chunk_index: usize,
    pub unit_range: Range<usize>,
    pub reason: String,
}

/// Complete result of classifying every chunk of the requested levels.
///
/// Observations are keyed by `(level, chunk_index)` for deterministic
/// iteration regardless of completion order.
#[derive(Debug, Default)]
pub struct LevelRun {
    pub observations: BTreeMap<(Level, usize), RawObservation>,
    pub skipped: Vec<SkippedChunk>,
}

impl LevelRun {
    /// Observations that passed the belief filter, in key order.
    pub fn beliefs(&self) -> impl Iterator<Item = &RawObservation> {
        self.observations.values().filter(|o| o.is_belief)
    }
}

enum ChunkOutcome {
    Succeeded(Box<RawObservation>),
    Skipped(SkippedChunk),
}

/// Bounded-concurrency classification runner.
pub struct ExtractionEngine<C> {
    classifier: Arc<C>,
    config: EngineConfig,
    tracker: UsageTracker,
    cancel: CancellationToken,
}

impl<C: Classifier + 'static> ExtractionEngine<C> {
    pub fn new(classifier: Arc<C>, config: EngineConfig) -> Self {
        Self {
            classifier,
            config,
            tracker: UsageTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (e.g. a global abort).
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle to the shared usage accumulator.
    pub fn tracker(&self) -> UsageTracker {
        self.tracker.clone()
    }

    /// Token that cancels this engine's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Classify every chunk of every requested level.
    pub async fn run_levels(&self, units: &[TranscriptUnit], levels: &[Level]) -> Result<LevelRun> {
        let mut run = LevelRun::default();
        for &level in levels {
            let level_result = self.run_level(units, level).await?;
            run.observations.extend(level_result.observations);
            run.skipped.extend(level_result.skipped);
        }
        Ok(run)
    }

    /// Classify every chunk of one level.
    ///
    /// Each chunk is submitted exactly once; transient failures re-attempt
    /// the same unit of work up to the attempt budget. On cancellation,
    /// chunks still waiting for a worker are recorded as skipped while
    /// in-flight calls drain to completion.
    pub async fn run_level(&self, units: &[TranscriptUnit], level: Level) -> Result<LevelRun> {
        let chunks = chunks_for(units, level);
        info!(level, chunks = chunks.len(), "classifying level");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks: JoinSet<ChunkOutcome> = JoinSet::new();
        let mut run = LevelRun::default();

        for chunk in chunks {
            if self.cancel.is_cancelled() {
                run.skipped.push(SkippedChunk {
                    level,
                    chunk_index: chunk.chunk_index,
                    unit_range: chunk.unit_range.clone(),
                    reason: "run cancelled before submission".to_string(),
                });
                continue;
            }

            let classifier = Arc::clone(&self.classifier);
            let semaphore = Arc::clone(&semaphore);
            let tracker = self.tracker.clone();
            let cancel = self.cancel.clone();
            let config = self.config.clone();

            tasks.spawn(async move {
                let acquired = tokio::select! {
                    acquired = semaphore.acquire_owned() => acquired,
                    _ = cancel.cancelled() => {
                        return ChunkOutcome::Skipped(skip(&chunk, "run cancelled while queued"));
                    }
                };
                let _permit = match acquired {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ChunkOutcome::Skipped(skip(&chunk, "worker pool closed"));
                    }
                };
                // The permit may have been granted after cancellation.
                if cancel.is_cancelled() {
                    return ChunkOutcome::Skipped(skip(&chunk, "run cancelled while queued"));
                }
                classify_chunk(&*classifier, &chunk, &config, &tracker, &cancel).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(|e| ExtractionError::Worker(e.to_string()))? {
                ChunkOutcome::Succeeded(observation) => {
                    let key = (observation.chunk_ref.level, observation.chunk_ref.chunk_index);
                    run.observations.insert(key, *observation);
                }
                ChunkOutcome::Skipped(skipped) => {
                    warn!(
                        level = skipped.level,
                        chunk_index = skipped.chunk_index,
                        reason = %skipped.reason,
                        "chunk skipped"
                    );
                    run.skipped.push(skipped);
                }
            }
        }

        run.skipped.sort_by_key(|s| (s.level, s.chunk_index));
        info!(
            level,
            succeeded = run.observations.len(),
            skipped = run.skipped.len(),
            "level complete"
        );
        Ok(run)
    }
}

fn skip(chunk: &Chunk, reason: impl Into<String>) -> SkippedChunk {
    SkippedChunk {
        level: chunk.level,
        chunk_index: chunk.chunk_index,
        unit_range: chunk.unit_range.clone(),
        reason: reason.into(),
    }
}

/// Classify one chunk with retry, backoff, and timeout handling.
///
/// Usage policy: only the successful attempt's usage enters the main
/// totals; usage reported by failed attempts goes to the wasted counters.
async fn classify_chunk<C: Classifier + ?Sized>(
    classifier: &C,
    chunk: &Chunk,
    config: &EngineConfig,
    tracker: &UsageTracker,
    cancel: &CancellationToken,
) -> ChunkOutcome {
    for attempt in 1..=config.max_attempts {
        let call = classifier.classify(chunk);
        let result = match config.call_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ClassifyError::transient("classification timed out")),
            },
            None => call.await,
        };

        match result {
            Ok(observation) => {
                tracker.record(observation.usage);
                return ChunkOutcome::Succeeded(Box::new(observation));
            }
            Err(err) => {
                if let Some(usage) = err.usage() {
                    tracker.record_wasted(usage);
                }

                if err.is_transient() && attempt < config.max_attempts {
                    // Doubling is capped so large attempt budgets cannot
                    // overflow the multiplier.
                    let backoff = config
                        .backoff_base
                        .saturating_mul(2u32.saturating_pow((attempt - 1).min(16)));
                    debug!(
                        chunk = %chunk.id(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => {
                            return ChunkOutcome::Skipped(skip(
                                chunk,
                                "run cancelled during backoff",
                            ));
                        }
                    }
                    continue;
                }

                let reason = if err.is_transient() {
                    format!("retry budget exhausted after {attempt} attempts: {err}")
                } else {
                    err.to_string()
                };
                return ChunkOutcome::Skipped(skip(chunk, reason));
            }
        }
    }

    // max_attempts >= 1 is validated; the loop always returns.
    ChunkOutcome::Skipped(skip(chunk, "no attempts configured"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClassifier;
    use crate::types::observation::{AtomicStatement, Certainty};

    fn units(n: usize) -> Vec<TranscriptUnit> {
        (0..n)
            .map(|i| {
                TranscriptUnit::new(
                    i,
                    "SPEAKER_A",
                    format!("00:00:{i:02}"),
                    format!("00:00:{:02}", i + 1),
                    format!("statement number {i}"),
                )
            })
            .collect()
    }

    fn engine(classifier: MockClassifier, concurrency: usize) -> ExtractionEngine<MockClassifier> {
        let config = EngineConfig {
            concurrency,
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            call_timeout: None,
        };
        ExtractionEngine::new(Arc::new(classifier), config)
    }

    #[tokio::test]
    async fn test_twelve_of_seventeen_chunks_are_beliefs() {
        let input = units(17);
        let mut classifier = MockClassifier::new();
        for unit in input.iter().take(12) {
            classifier = classifier.with_belief(
                &unit.text,
                vec![AtomicStatement::new(
                    format!("belief from {}", unit.text),
                    Certainty::Binary,
                )],
            );
        }

        let run = engine(classifier, 4).run_level(&input, 1).await.unwrap();

        assert_eq!(run.observations.len(), 17);
        assert_eq!(run.beliefs().count(), 12);
        assert!(run.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_every_chunk_classified_exactly_once() {
        let input = units(9);
        let classifier = MockClassifier::new();
        let engine = engine(classifier, 3);

        let run = engine.run_level(&input, 2).await.unwrap();

        assert_eq!(run.observations.len(), 5);
        let stage1_calls = engine.classifier.stage1_calls();
        assert_eq!(stage1_calls.len(), 5);
        let mut texts: Vec<_> = stage1_calls.clone();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), 5, "a chunk was classified more than once");
    }

    #[tokio::test]
    async fn test_cost_totals_invariant_under_concurrency() {
        let input = units(20);
        let mut baseline: Option<UsageTotals> = None;

        for workers in [1usize, 4, 10, 20, 50] {
            let mut classifier = MockClassifier::new();
            for unit in &input {
                classifier = classifier.with_belief(
                    &unit.text,
                    vec![AtomicStatement::new(&unit.text, Certainty::Binary)],
                );
            }

            let engine = engine(classifier, workers);
            let run = engine.run_levels(&input, &[1, 4]).await.unwrap();
            assert_eq!(run.skipped.len(), 0);

            let totals = engine.tracker().snapshot();
            match &baseline {
                None => baseline = Some(totals),
                Some(expected) => assert_eq!(
                    totals, *expected,
                    "totals diverged at {workers} workers"
                ),
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_worker_count() {
        let input = units(30);
        let classifier = MockClassifier::new().with_call_delay(Duration::from_millis(5));
        let engine = engine(classifier, 4);

        engine.run_level(&input, 1).await.unwrap();

        assert!(
            engine.classifier.max_in_flight() <= 4,
            "observed {} concurrent calls",
            engine.classifier.max_in_flight()
        );
    }

    #[tokio::test]
    async fn test_retry_then_succeed_within_budget() {
        let input = units(1);
        let classifier = MockClassifier::new()
            .with_belief(
                &input[0].text,
                vec![AtomicStatement::new("it recovers", Certainty::Binary)],
            )
            .fail_transient(&input[0].text, 2, Some(Usage::new(40, 0)));

        let engine = engine(classifier, 1);
        let run = engine.run_level(&input, 1).await.unwrap();

        assert_eq!(run.observations.len(), 1);
        assert!(run.skipped.is_empty());

        // Only the successful attempt counts toward the main totals; the
        // two failed attempts land in the wasted counters.
        let totals = engine.tracker().snapshot();
        assert_eq!(totals.calls, 1);
        assert_eq!(totals.wasted_attempts, 2);
        assert_eq!(totals.wasted_prompt_tokens, 80);
    }

    #[tokio::test]
    async fn test_transient_budget_exhaustion_skips() {
        let input = units(2);
        let classifier =
            MockClassifier::new().fail_transient(&input[0].text, u32::MAX, None);

        let engine = engine(classifier, 2);
        let run = engine.run_level(&input, 1).await.unwrap();

        assert_eq!(run.observations.len(), 1);
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].chunk_index, 0);
        assert!(run.skipped[0].reason.contains("retry budget exhausted"));
    }

    #[tokio::test]
    async fn test_large_attempt_budget_does_not_overflow_backoff() {
        let input = units(1);
        let classifier = MockClassifier::new().fail_transient(&input[0].text, u32::MAX, None);
        let config = EngineConfig {
            concurrency: 1,
            max_attempts: 40,
            backoff_base: Duration::ZERO,
            call_timeout: None,
        };
        let engine = ExtractionEngine::new(Arc::new(classifier), config);

        let run = engine.run_level(&input, 1).await.unwrap();

        assert!(run.observations.is_empty());
        assert_eq!(run.skipped.len(), 1);
        assert!(run.skipped[0].reason.contains("after 40 attempts"));
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_without_retry() {
        let input = units(3);
        let classifier = MockClassifier::new().fail_permanent(&input[1].text);
        let engine = engine(classifier, 2);

        let run = engine.run_level(&input, 1).await.unwrap();

        assert_eq!(run.observations.len(), 2);
        assert_eq!(run.skipped.len(), 1);
        assert_eq!(run.skipped[0].unit_range, 1..2);
        // Permanent failures are not retried.
        assert_eq!(
            engine
                .classifier
                .stage1_calls()
                .iter()
                .filter(|t| **t == input[1].text)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancellation_skips_unsubmitted_chunks() {
        let input = units(10);
        let classifier = MockClassifier::new();
        let engine = engine(classifier, 2);

        engine.cancellation_token().cancel();
        let run = engine.run_level(&input, 1).await.unwrap();

        assert!(run.observations.is_empty());
        assert_eq!(run.skipped.len(), 10);
        assert_eq!(engine.tracker().snapshot(), UsageTotals::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_level_cancellation_skips_queued_chunks() {
        let input = units(8);
        let classifier = MockClassifier::new().with_call_delay(Duration::from_millis(30));
        let engine = engine(classifier, 1);

        // One worker, 30 ms per call: the first call finishes at 30 ms and
        // the second is in flight when the cancel lands at 45 ms. The
        // in-flight call drains; everything still queued must be skipped.
        let cancel = engine.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(45)).await;
            cancel.cancel();
        });

        let run = engine.run_level(&input, 1).await.unwrap();

        assert_eq!(run.observations.len(), 2);
        assert_eq!(run.skipped.len(), 6);
        assert!(run
            .skipped
            .iter()
            .all(|s| s.reason.contains("cancelled")));
        // Queued chunks never reached the classifier.
        assert_eq!(engine.classifier.stage1_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_treated_as_transient_and_retried() {
        let input = units(1);
        // First two calls hang far longer than the timeout, third is fast.
        let classifier = MockClassifier::new()
            .with_belief(
                &input[0].text,
                vec![AtomicStatement::new("slow truth", Certainty::Hedged)],
            )
            .with_slow_calls(&input[0].text, 2, Duration::from_secs(30));

        let config = EngineConfig {
            concurrency: 1,
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
            call_timeout: Some(Duration::from_millis(20)),
        };
        let engine = ExtractionEngine::new(Arc::new(classifier), config);

        let run = engine.run_level(&input, 1).await.unwrap();
        assert_eq!(run.observations.len(), 1);
        assert_eq!(engine.tracker().snapshot().calls, 1);
    }
}
