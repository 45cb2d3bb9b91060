//! The classification port: the abstract interface to the external
//! two-stage belief classifier.
//!
//! Stage 1 filters chunks for belief content; stage 2 produces the full
//! structured classification. Implementations wrap a specific LLM provider
//! and parse its responses through the wire types below, so downstream
//! stages never see untyped payloads. Calls are assumed side-effect free
//! and safe to retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, ClassifyResult};
use crate::types::chunk::Chunk;
use crate::types::observation::{
    AtomicStatement, BeliefDetail, Certainty, RawObservation, StageOneVerdict,
};
use crate::types::usage::Usage;

/// Two-stage belief classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Stage 1: is this chunk a belief statement at all?
    async fn classify_stage1(&self, chunk: &Chunk) -> ClassifyResult<StageOneVerdict>;

    /// Stage 2: full structured classification. Only called for chunks
    /// that passed stage 1.
    async fn classify_stage2(&self, chunk: &Chunk) -> ClassifyResult<BeliefDetail>;

    /// Run both stages, short-circuiting non-beliefs after stage 1 and
    /// summing the usage of both stages.
    async fn classify(&self, chunk: &Chunk) -> ClassifyResult<RawObservation> {
        let verdict = self.classify_stage1(chunk).await?;
        if !verdict.is_belief {
            return Ok(RawObservation::non_belief(chunk, verdict));
        }

        match self.classify_stage2(chunk).await {
            Ok(detail) => Ok(RawObservation::belief(chunk, verdict, detail)),
            // Stage-1 tokens were already spent; surface them on the error
            // so the engine can account the attempt.
            Err(err) => Err(attach_usage(err, verdict.usage)),
        }
    }
}

fn attach_usage(err: ClassifyError, prior: Usage) -> ClassifyError {
    let merge = |usage: Option<Usage>| Some(prior.add(usage.unwrap_or_default()));
    match err {
        ClassifyError::Transient { reason, usage } => ClassifyError::Transient {
            reason,
            usage: merge(usage),
        },
        ClassifyError::Permanent { reason, usage } => ClassifyError::Permanent {
            reason,
            usage: merge(usage),
        },
    }
}

/// Loosely-typed stage-1 payload as an LLM returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStageOneResponse {
    pub is_belief: bool,

    #[serde(default)]
    pub confidence: Option<f64>,

    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RawStageOneResponse {
    /// Validate into the typed verdict or fail permanently.
    pub fn validate(self, usage: Usage) -> ClassifyResult<StageOneVerdict> {
        let confidence = self.confidence.unwrap_or(0.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ClassifyError::Permanent {
                reason: format!("stage-1 confidence out of range: {confidence}"),
                usage: Some(usage),
            });
        }
        Ok(StageOneVerdict {
            is_belief: self.is_belief,
            confidence,
            usage,
        })
    }
}

/// One atomic belief entry in a stage-2 payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAtomicBelief {
    pub belief: String,

    #[serde(default)]
    pub certainty: Option<String>,
}

/// Loosely-typed stage-2 payload as an LLM returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStageTwoResponse {
    #[serde(default)]
    pub atomic_beliefs: Vec<RawAtomicBelief>,

    #[serde(default)]
    pub conviction_score: Option<f64>,

    #[serde(default)]
    pub stability_score: Option<f64>,

    #[serde(default)]
    pub importance: Option<u8>,

    #[serde(default)]
    pub tier_name: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub parent_hint: Option<String>,

    #[serde(default)]
    pub defines_outgroup: Option<bool>,
}

impl RawStageTwoResponse {
    /// Validate into the typed detail or fail permanently.
    ///
    /// Score fields outside [0, 1] and importance outside 1..=10 are
    /// rejected rather than clamped; unrecognized certainty labels are
    /// dropped to `None`, matching the tolerant reading the original
    /// classifier applied to its payloads.
    pub fn validate(self, usage: Usage) -> ClassifyResult<BeliefDetail> {
        for (name, value) in [
            ("conviction_score", self.conviction_score),
            ("stability_score", self.stability_score),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ClassifyError::Permanent {
                        reason: format!("stage-2 {name} out of range: {v}"),
                        usage: Some(usage),
                    });
                }
            }
        }
        if let Some(importance) = self.importance {
            if !(1..=10).contains(&importance) {
                return Err(ClassifyError::Permanent {
                    reason: format!("stage-2 importance out of range: {importance}"),
                    usage: Some(usage),
                });
            }
        }

        let statements = self
            .atomic_beliefs
            .into_iter()
            .filter(|a| !a.belief.trim().is_empty())
            .map(|a| {
                let certainty = match a.certainty.as_deref() {
                    Some("binary") => Certainty::Binary,
                    _ => Certainty::Hedged,
                };
                AtomicStatement::new(a.belief.trim(), certainty)
            })
            .collect();

        Ok(BeliefDetail {
            statements,
            conviction_score: self.conviction_score,
            stability_score: self.stability_score,
            importance: self.importance,
            tier: self.tier_name,
            category: self.category,
            parent_hint: self.parent_hint,
            defines_outgroup: self.defines_outgroup,
            usage,
        })
    }
}

/// Parse a stage-1 JSON payload. Malformed JSON is a permanent failure.
pub fn parse_stage1_response(json: &str, usage: Usage) -> ClassifyResult<StageOneVerdict> {
    let raw: RawStageOneResponse =
        serde_json::from_str(json).map_err(|e| ClassifyError::malformed(e, Some(usage)))?;
    raw.validate(usage)
}

/// Parse a stage-2 JSON payload. Malformed JSON is a permanent failure.
pub fn parse_stage2_response(json: &str, usage: Usage) -> ClassifyResult<BeliefDetail> {
    let raw: RawStageTwoResponse =
        serde_json::from_str(json).map_err(|e| ClassifyError::malformed(e, Some(usage)))?;
    raw.validate(usage)
}
