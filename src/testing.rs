//! Testing utilities including a mock classification port.
//!
//! Useful for exercising the pipeline without real LLM calls: responses
//! are deterministic and scriptable, including transient/permanent failure
//! scripts and artificial latency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ClassifyError, ClassifyResult};
use crate::traits::classifier::Classifier;
use crate::types::chunk::Chunk;
use crate::types::observation::{AtomicStatement, BeliefDetail, StageOneVerdict};
use crate::types::usage::Usage;

/// Record of a call made to the mock classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Stage1 { text: String },
    Stage2 { text: String },
}

#[derive(Debug, Clone)]
struct FailureScript {
    remaining: u32,
    usage: Option<Usage>,
}

#[derive(Debug, Clone)]
struct SlowScript {
    remaining: u32,
    delay: Duration,
}

/// A mock two-stage classifier with deterministic, scriptable behavior.
///
/// Chunks are matched by their concatenated text. Unscripted chunks are
/// judged non-beliefs. Every stage-1 call reports the same usage, as does
/// every stage-2 call, which makes usage totals predictable in tests.
pub struct MockClassifier {
    /// Scripted belief details by chunk text.
    beliefs: RwLock<HashMap<String, BeliefDetail>>,

    /// Transient failures to serve before succeeding, by chunk text.
    transient: RwLock<HashMap<String, FailureScript>>,

    /// Chunk texts that always fail permanently.
    permanent: RwLock<HashMap<String, ()>>,

    /// Calls to slow down before responding normally, by chunk text.
    slow: RwLock<HashMap<String, SlowScript>>,

    /// Artificial latency applied to every call.
    call_delay: Option<Duration>,

    stage1_usage: Usage,
    stage2_usage: Usage,

    /// Call log for assertions.
    calls: RwLock<Vec<MockCall>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self {
            beliefs: RwLock::new(HashMap::new()),
            transient: RwLock::new(HashMap::new()),
            permanent: RwLock::new(HashMap::new()),
            slow: RwLock::new(HashMap::new()),
            call_delay: None,
            stage1_usage: Usage::new(100, 10),
            stage2_usage: Usage::new(200, 40),
            calls: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a chunk as a belief with the given atomic statements and
    /// default scores (conviction 0.8, stability 0.6, importance 5).
    pub fn with_belief(
        self,
        chunk_text: impl Into<String>,
        statements: Vec<AtomicStatement>,
    ) -> Self {
        let detail = BeliefDetail {
            statements,
            conviction_score: Some(0.8),
            stability_score: Some(0.6),
            importance: Some(5),
            tier: Some("Worldview".to_string()),
            category: Some("general".to_string()),
            parent_hint: None,
            defines_outgroup: Some(false),
            usage: Usage::default(),
        };
        self.beliefs
            .write()
            .unwrap()
            .insert(chunk_text.into(), detail);
        self
    }

    /// Script a chunk as a belief with a fully custom detail.
    pub fn with_detail(self, chunk_text: impl Into<String>, detail: BeliefDetail) -> Self {
        self.beliefs
            .write()
            .unwrap()
            .insert(chunk_text.into(), detail);
        self
    }

    /// Override scores on an already scripted belief.
    pub fn with_scores(
        self,
        chunk_text: &str,
        conviction: f64,
        stability: f64,
        importance: u8,
    ) -> Self {
        if let Some(detail) = self.beliefs.write().unwrap().get_mut(chunk_text) {
            detail.conviction_score = Some(conviction);
            detail.stability_score = Some(stability);
            detail.importance = Some(importance);
        }
        self
    }

    /// Set the parent hint on an already scripted belief.
    pub fn with_parent_hint(self, chunk_text: &str, hint: impl Into<String>) -> Self {
        if let Some(detail) = self.beliefs.write().unwrap().get_mut(chunk_text) {
            detail.parent_hint = Some(hint.into());
        }
        self
    }

    /// Fail the first `times` stage-1 calls for a chunk transiently,
    /// optionally reporting usage consumed by each failed attempt.
    pub fn fail_transient(
        self,
        chunk_text: impl Into<String>,
        times: u32,
        usage: Option<Usage>,
    ) -> Self {
        self.transient.write().unwrap().insert(
            chunk_text.into(),
            FailureScript {
                remaining: times,
                usage,
            },
        );
        self
    }

    /// Always fail stage 1 for a chunk permanently.
    pub fn fail_permanent(self, chunk_text: impl Into<String>) -> Self {
        self.permanent.write().unwrap().insert(chunk_text.into(), ());
        self
    }

    /// Delay the first `times` calls for a chunk by `delay`.
    pub fn with_slow_calls(self, chunk_text: impl Into<String>, times: u32, delay: Duration) -> Self {
        self.slow.write().unwrap().insert(
            chunk_text.into(),
            SlowScript {
                remaining: times,
                delay,
            },
        );
        self
    }

    /// Apply an artificial latency to every call.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// All calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.read().unwrap().clone()
    }

    /// Chunk texts of stage-1 calls, in call order.
    pub fn stage1_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Stage1 { text } => Some(text),
                MockCall::Stage2 { .. } => None,
            })
            .collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> FlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        FlightGuard { owner: self }
    }

    async fn apply_delays(&self, chunk_text: &str) {
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = {
            let mut slow = self.slow.write().unwrap();
            match slow.get_mut(chunk_text) {
                Some(script) if script.remaining > 0 => {
                    script.remaining -= 1;
                    Some(script.delay)
                }
                _ => None,
            }
        };
        if let Some(delay) = scripted {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Tracks in-flight calls; decrements even when a future is dropped by a
/// timeout.
struct FlightGuard<'a> {
    owner: &'a MockClassifier,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.owner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify_stage1(&self, chunk: &Chunk) -> ClassifyResult<StageOneVerdict> {
        let _guard = self.enter();
        self.calls.write().unwrap().push(MockCall::Stage1 {
            text: chunk.text.clone(),
        });

        self.apply_delays(&chunk.text).await;

        if self.permanent.read().unwrap().contains_key(&chunk.text) {
            return Err(ClassifyError::permanent("scripted permanent failure"));
        }

        let failure = {
            let mut transient = self.transient.write().unwrap();
            match transient.get_mut(&chunk.text) {
                Some(script) if script.remaining > 0 => {
                    script.remaining -= 1;
                    Some(script.usage)
                }
                _ => None,
            }
        };
        if let Some(usage) = failure {
            return Err(ClassifyError::Transient {
                reason: "scripted transient failure".to_string(),
                usage,
            });
        }

        let is_belief = self.beliefs.read().unwrap().contains_key(&chunk.text);
        Ok(StageOneVerdict {
            is_belief,
            confidence: if is_belief { 0.9 } else { 0.8 },
            usage: self.stage1_usage,
        })
    }

    async fn classify_stage2(&self, chunk: &Chunk) -> ClassifyResult<BeliefDetail> {
        let _guard = self.enter();
        self.calls.write().unwrap().push(MockCall::Stage2 {
            text: chunk.text.clone(),
        });

        self.apply_delays(&chunk.text).await;

        match self.beliefs.read().unwrap().get(&chunk.text) {
            Some(detail) => {
                let mut detail = detail.clone();
                detail.usage = self.stage2_usage;
                Ok(detail)
            }
            None => Err(ClassifyError::permanent("no scripted stage-2 detail")),
        }
    }
}
