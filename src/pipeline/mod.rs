//! The extraction pipeline.
//!
//! Stages run strictly forward:
//! chunking → concurrent classification → merge → link → metrics/graph.

pub mod chunker;
pub mod engine;
pub mod extractor;
pub mod link;
pub mod merge;
pub mod metrics;
pub mod similarity;

pub use chunker::chunks_for;
pub use engine::{EngineConfig, ExtractionEngine, LevelRun, SkippedChunk, UsageTracker};
pub use extractor::{BeliefExtractor, ExtractionOutcome};
pub use link::{BeliefLinker, LinkReport};
pub use merge::{BeliefMerger, MergeReport};
pub use metrics::{build_graph, compute_metrics};
pub use similarity::cosine_similarity;
