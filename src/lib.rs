//! Multi-Level Belief Extraction Library
//!
//! Extracts discrete belief statements from long, speaker-labeled
//! transcripts by classifying the same text at multiple granularities,
//! then reconciling the observations into a deduplicated, hierarchically
//! linked belief graph with derived analytic scores.
//!
//! # Design Philosophy
//!
//! **"Classify wide, reconcile once"**
//!
//! - The classifier is a port; the pipeline never knows which model backs it
//! - Every chunk is classified exactly once per level, concurrently
//! - Failures degrade to reported skips, never to a lost run
//! - Token accounting is integer-exact regardless of worker count
//! - Absent scores stay absent; no metric is silently zero
//!
//! # Usage
//!
//! ```rust,ignore
//! use belief_extraction::{BeliefExtractor, ExtractorConfig};
//! use belief_extraction::testing::MockClassifier;
//! use std::sync::Arc;
//!
//! let units = belief_extraction::parser::parse_file("transcript.txt")?;
//! let config = ExtractorConfig::default().with_levels([1, 2, 4, 8]);
//! let extractor = BeliefExtractor::new(Arc::new(MockClassifier::new()), config);
//!
//! let outcome = extractor.extract(&units, Some("episode_42")).await?;
//! for node in outcome.graph.nodes() {
//!     println!("{}: {:?}", node.record.atomic_belief, node.metrics.belief_strength);
//! }
//! ```
//!
//! # Modules
//!
//! - [`traits`] - The classification port the pipeline runs against
//! - [`types`] - Transcript, chunk, observation, record, and graph types
//! - [`pipeline`] - Chunking, concurrent extraction, merging, linking, metrics
//! - [`parser`] - Diarized transcript parsing
//! - [`testing`] - Mock classifier for tests

pub mod error;
pub mod parser;
pub mod pipeline;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{ClassifyError, ExtractionError, ParseError};
pub use traits::classifier::Classifier;
pub use types::{
    belief::BeliefRecord,
    chunk::{Chunk, ChunkRef, Level},
    config::{ExtractorConfig, EXPONENTIAL_LEVELS},
    graph::{BeliefGraph, BeliefMetrics, BeliefNode, GraphStats},
    observation::{AtomicStatement, BeliefDetail, Certainty, RawObservation, StageOneVerdict},
    transcript::TranscriptUnit,
    usage::{CostRates, Usage, UsageTotals},
};

// Re-export pipeline components
pub use pipeline::{
    // Chunking
    chunks_for,
    // Concurrent engine
    EngineConfig, ExtractionEngine, LevelRun, SkippedChunk, UsageTracker,
    // Orchestrator
    BeliefExtractor, ExtractionOutcome,
    // Reconciliation
    BeliefLinker, BeliefMerger, LinkReport, MergeReport,
    // Metrics and graph assembly
    build_graph, compute_metrics,
    // Similarity
    cosine_similarity,
};
