//! Configuration for the extraction pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;
use crate::types::chunk::Level;
use crate::types::usage::CostRates;

/// Default exponential level ladder (utterances per chunk).
pub const EXPONENTIAL_LEVELS: [Level; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 256, 512];

/// Configuration consumed by the extraction pipeline.
///
/// Validated up front; an invalid value fails the whole run before any
/// classification work starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Chunk-size granularities to process.
    pub levels: Vec<Level>,

    /// Maximum concurrently in-flight classification calls.
    pub concurrency: usize,

    /// Similarity threshold for merging near-duplicate beliefs.
    ///
    /// Monotonic knob: lower merges more aggressively (fewer, larger
    /// clusters). Default 0.85.
    pub dedup_threshold: f64,

    /// Similarity threshold for resolving parent hints. Default 0.6.
    pub link_threshold: f64,

    /// Per-call classification timeout. A timeout is treated as a
    /// transient failure and retried. `None` disables the timeout.
    #[serde(default, with = "humantime_opt")]
    pub call_timeout: Option<Duration>,

    /// Attempt budget per chunk, including the first attempt.
    pub max_attempts: u32,

    /// Base delay for exponential backoff after a transient failure.
    #[serde(with = "humantime_ms")]
    pub backoff_base: Duration,

    /// Rate table for deriving monetary cost from token totals.
    pub cost_rates: CostRates,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            levels: EXPONENTIAL_LEVELS.to_vec(),
            concurrency: 8,
            dedup_threshold: 0.85,
            link_threshold: 0.6,
            call_timeout: Some(Duration::from_secs(60)),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            cost_rates: CostRates::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the levels to process.
    pub fn with_levels(mut self, levels: impl IntoIterator<Item = Level>) -> Self {
        self.levels = levels.into_iter().collect();
        self
    }

    /// Set worker concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the deduplication threshold.
    pub fn with_dedup_threshold(mut self, threshold: f64) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    /// Set the parent-linking threshold.
    pub fn with_link_threshold(mut self, threshold: f64) -> Self {
        self.link_threshold = threshold;
        self
    }

    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Validate all values, failing fast on the first problem.
    pub fn validate(&self) -> Result<(), ExtractionError> {
        let fail = |reason: String| Err(ExtractionError::Config { reason });

        if self.levels.is_empty() {
            return fail("at least one level is required".to_string());
        }
        if let Some(&level) = self.levels.iter().find(|&&l| l == 0) {
            return fail(format!("level must be positive, got {level}"));
        }
        if self.concurrency == 0 {
            return fail("concurrency must be at least 1".to_string());
        }
        if self.max_attempts == 0 {
            return fail("max_attempts must be at least 1".to_string());
        }
        for (name, value) in [
            ("dedup_threshold", self.dedup_threshold),
            ("link_threshold", self.link_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) || value.is_nan() {
                return fail(format!("{name} must be in [0, 1], got {value}"));
            }
        }
        Ok(())
    }
}

/// Serde helpers for `Duration` fields as milliseconds.
mod humantime_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod humantime_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
