//! End-to-end extraction orchestrator.
//!
//! Wires the stages together in their fixed order: chunk and classify every
//! level concurrently, flatten belief observations into records, merge
//! near-duplicates, resolve parent hints, compute metrics, and assemble
//! the final graph.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::engine::{EngineConfig, ExtractionEngine, SkippedChunk};
use crate::pipeline::link::{BeliefLinker, LinkReport};
use crate::pipeline::merge::{BeliefMerger, MergeReport};
use crate::pipeline::metrics::build_graph;
use crate::traits::classifier::Classifier;
use crate::types::belief::BeliefRecord;
use crate::types::config::ExtractorConfig;
use crate::types::graph::BeliefGraph;
use crate::types::transcript::TranscriptUnit;
use crate::types::usage::UsageTotals;

/// Everything one extraction run produced.
#[derive(Debug)]
pub struct ExtractionOutcome {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,

    /// The final belief graph: canonical records, metrics, parent edges.
    pub graph: BeliefGraph,

    /// Token usage across all classification calls.
    pub usage: UsageTotals,

    /// Chunks that could not be classified.
    pub skipped: Vec<SkippedChunk>,

    pub merge: MergeReport,
    pub links: LinkReport,
}

/// The full pipeline behind one entry point.
pub struct BeliefExtractor<C> {
    classifier: Arc<C>,
    config: ExtractorConfig,
    cancel: CancellationToken,
}

impl<C: Classifier + 'static> BeliefExtractor<C> {
    pub fn new(classifier: Arc<C>, config: ExtractorConfig) -> Self {
        Self {
            classifier,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels a running extraction.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline over a transcript.
    ///
    /// Fails fast on an invalid configuration, before any classification
    /// call is made. Chunks that exhaust their retry budget or fail
    /// permanently are reported in the outcome rather than aborting the
    /// run. `episode_id` scopes merging and linking alongside the speaker.
    pub async fn extract(
        &self,
        units: &[TranscriptUnit],
        episode_id: Option<&str>,
    ) -> Result<ExtractionOutcome> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        info!(
            %run_id,
            units = units.len(),
            levels = ?self.config.levels,
            "starting extraction run"
        );

        let engine = ExtractionEngine::new(
            Arc::clone(&self.classifier),
            EngineConfig::from(&self.config),
        )
        .with_cancellation(self.cancel.clone());

        let run = engine.run_levels(units, &self.config.levels).await?;

        let mut next_id = 1usize;
        let records: Vec<BeliefRecord> = run
            .beliefs()
            .flat_map(|obs| BeliefRecord::flatten(obs, episode_id, &mut next_id))
            .collect();

        let merger = BeliefMerger::new(self.config.dedup_threshold);
        let (mut records, merge) = merger.merge(records);

        let linker = BeliefLinker::new(self.config.link_threshold);
        let links = linker.link(&mut records);

        let graph = build_graph(records);
        let usage = engine.tracker().snapshot();

        let outcome = ExtractionOutcome {
            run_id,
            started_at,
            duration: clock.elapsed(),
            graph,
            usage,
            skipped: run.skipped,
            merge,
            links,
        };
        info!(
            %run_id,
            beliefs = outcome.graph.len(),
            skipped = outcome.skipped.len(),
            calls = outcome.usage.calls,
            cost = outcome.usage.cost(&self.config.cost_rates),
            duration_ms = outcome.duration.as_millis() as u64,
            "extraction run complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::testing::MockClassifier;
    use crate::types::observation::{AtomicStatement, Certainty};

    fn unit(index: usize, text: &str) -> TranscriptUnit {
        TranscriptUnit::new(
            index,
            "SPEAKER_A",
            format!("00:0{index}:00"),
            format!("00:0{}:00", index + 1),
            text,
        )
    }

    fn statement(text: &str) -> Vec<AtomicStatement> {
        vec![AtomicStatement::new(text, Certainty::Binary)]
    }

    #[tokio::test]
    async fn test_full_pipeline_merges_and_links() {
        let units = vec![
            unit(0, "bitcoin keeps going up"),
            unit(1, "anyway nice weather today"),
            unit(2, "mathematical laws govern markets"),
            unit(3, "thanks for listening"),
        ];

        // Level 1 sees each unit alone; level 2 sees pairs. The first
        // level-2 chunk re-discovers the same atomic belief as unit 0,
        // which must merge into one reinforced record.
        let classifier = MockClassifier::new()
            .with_belief(
                "bitcoin keeps going up",
                statement("Bitcoin follows a power law"),
            )
            .with_parent_hint("bitcoin keeps going up", "mathematical laws govern markets")
            .with_belief(
                "mathematical laws govern markets",
                statement("mathematical laws govern markets"),
            )
            .with_belief(
                "bitcoin keeps going up\nanyway nice weather today",
                statement("Bitcoin follows a power law"),
            )
            .with_parent_hint(
                "bitcoin keeps going up\nanyway nice weather today",
                "mathematical laws govern markets",
            );

        let config = ExtractorConfig::default()
            .with_levels([1, 2])
            .with_concurrency(4);
        let extractor = BeliefExtractor::new(Arc::new(classifier), config);

        let outcome = extractor.extract(&units, Some("e_001")).await.unwrap();

        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.graph.len(), 2);
        assert_eq!(outcome.merge.clusters, 1);
        assert_eq!(outcome.links.linked, 1);

        let reinforced = outcome
            .graph
            .nodes()
            .find(|n| n.record.atomic_belief == "Bitcoin follows a power law")
            .unwrap();
        assert_eq!(reinforced.record.reinforcement_count, 2);
        assert_eq!(
            reinforced.record.reinforcement_levels,
            std::collections::BTreeSet::from([1, 2])
        );

        let foundation = outcome
            .graph
            .nodes()
            .find(|n| n.record.atomic_belief == "mathematical laws govern markets")
            .unwrap();
        assert_eq!(
            reinforced.record.parent_belief_id.as_deref(),
            Some(foundation.record.belief_id.as_str())
        );
        assert_eq!(foundation.metrics.child_count, 1);
        assert!(outcome.graph.is_acyclic());

        // 4 level-1 chunks + 2 level-2 chunks, all classified.
        assert_eq!(outcome.usage.calls, 6);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_before_any_call() {
        let classifier = Arc::new(MockClassifier::new());
        let config = ExtractorConfig::default().with_levels([]);
        let extractor = BeliefExtractor::new(Arc::clone(&classifier), config);

        let err = extractor.extract(&[unit(0, "hi")], None).await.unwrap_err();

        assert!(matches!(err, ExtractionError::Config { .. }));
        assert!(classifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_permanent_failures_reported_not_fatal() {
        let units = vec![unit(0, "garbled audio segment"), unit(1, "taxes are theft")];
        let classifier = MockClassifier::new()
            .fail_permanent("garbled audio segment")
            .with_belief("taxes are theft", statement("taxes are theft"));

        let config = ExtractorConfig::default().with_levels([1]);
        let extractor = BeliefExtractor::new(Arc::new(classifier), config);

        let outcome = extractor.extract(&units, None).await.unwrap();

        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].unit_range, 0..1);
        assert_eq!(outcome.graph.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_yields_empty_graph() {
        let units = vec![unit(0, "a"), unit(1, "b")];
        let extractor = BeliefExtractor::new(
            Arc::new(MockClassifier::new()),
            ExtractorConfig::default().with_levels([1]),
        );

        extractor.cancellation_token().cancel();
        let outcome = extractor.extract(&units, None).await.unwrap();

        assert!(outcome.graph.is_empty());
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(outcome.usage, UsageTotals::default());
    }

    #[tokio::test]
    async fn test_empty_transcript_yields_empty_outcome() {
        let extractor = BeliefExtractor::new(
            Arc::new(MockClassifier::new()),
            ExtractorConfig::default().with_levels([1, 2]),
        );

        let outcome = extractor.extract(&[], None).await.unwrap();

        assert!(outcome.graph.is_empty());
        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.usage.calls, 0);
    }
}
