//! Token usage accounting and cost derivation.
//!
//! Totals accumulate integer token counters only. Monetary cost is derived
//! from the summed counters via a [`CostRates`] table, so the totals for a
//! fixed input are identical no matter how many workers ran the calls or in
//! what order they finished.

use serde::{Deserialize, Serialize};

/// Token usage reported by a single classification call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Sum of two usages (stage 1 + stage 2 of one classification).
    pub fn add(self, other: Usage) -> Usage {
        Usage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
        }
    }

    /// Monetary cost of this usage under the given rates.
    pub fn cost(&self, rates: &CostRates) -> f64 {
        rates.cost(self.prompt_tokens, self.completion_tokens)
    }
}

/// Per-1k-token prices used to convert token counts into money.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostRates {
    /// Price per 1000 prompt tokens.
    pub prompt_per_1k: f64,

    /// Price per 1000 completion tokens.
    pub completion_per_1k: f64,
}

impl CostRates {
    fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 * self.prompt_per_1k / 1000.0)
            + (completion_tokens as f64 * self.completion_per_1k / 1000.0)
    }
}

impl Default for CostRates {
    /// gpt-4o-mini pricing.
    fn default() -> Self {
        Self {
            prompt_per_1k: 0.000_15,
            completion_per_1k: 0.000_6,
        }
    }
}

/// Accumulated usage across a run.
///
/// `calls` and the main token counters reflect successful classification
/// calls only. Usage consumed by failed attempts (retried or skipped) is
/// tracked in the `wasted_*` counters so it is visible but never inflates
/// the primary totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Number of successful classification calls.
    pub calls: u64,

    /// Prompt tokens across successful calls.
    pub prompt_tokens: u64,

    /// Completion tokens across successful calls.
    pub completion_tokens: u64,

    /// Number of failed attempts that reported usage.
    pub wasted_attempts: u64,

    /// Prompt tokens consumed by failed attempts.
    pub wasted_prompt_tokens: u64,

    /// Completion tokens consumed by failed attempts.
    pub wasted_completion_tokens: u64,
}

impl UsageTotals {
    /// Record the usage of a successful call.
    pub fn record(&mut self, usage: Usage) {
        self.calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    /// Record usage consumed by a failed attempt.
    pub fn record_wasted(&mut self, usage: Usage) {
        self.wasted_attempts += 1;
        self.wasted_prompt_tokens += usage.prompt_tokens;
        self.wasted_completion_tokens += usage.completion_tokens;
    }

    /// Total tokens across successful calls.
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }

    /// Cost of successful calls under the given rates. Derived from the
    /// integer totals, never summed call-by-call.
    pub fn cost(&self, rates: &CostRates) -> f64 {
        rates.cost(self.prompt_tokens, self.completion_tokens)
    }

    /// Cost of failed attempts under the given rates.
    pub fn wasted_cost(&self, rates: &CostRates) -> f64 {
        rates.cost(self.wasted_prompt_tokens, self.wasted_completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_add() {
        let combined = Usage::new(100, 20).add(Usage::new(50, 30));
        assert_eq!(combined, Usage::new(150, 50));
        assert_eq!(combined.total_tokens(), 200);
    }

    #[test]
    fn test_totals_separate_wasted_usage() {
        let mut totals = UsageTotals::default();
        totals.record(Usage::new(100, 10));
        totals.record_wasted(Usage::new(40, 0));

        assert_eq!(totals.calls, 1);
        assert_eq!(totals.total_tokens(), 110);
        assert_eq!(totals.wasted_attempts, 1);
        assert_eq!(totals.wasted_prompt_tokens, 40);
    }

    #[test]
    fn test_cost_derived_from_totals() {
        let mut totals = UsageTotals::default();
        totals.record(Usage::new(1000, 1000));

        let rates = CostRates::default();
        let expected = 0.000_15 + 0.000_6;
        assert!((totals.cost(&rates) - expected).abs() < 1e-12);
        assert_eq!(totals.wasted_cost(&rates), 0.0);
    }
}
