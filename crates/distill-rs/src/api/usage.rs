//! Run identifiers and token/cost accounting for reducer calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique id for one summarization run.
pub fn generate_run_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts:x}-{count:04x}")
}

/// Per-model pricing for cost estimation (USD per 1M tokens).
#[derive(Debug, Clone)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    pub fn estimate_cost(&self, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_million: 1.0,
            output_per_million: 4.0,
        }
    }
}

/// Approximate pricing for a model id such as `"google/gemini-flash-1.5"`.
///
/// Only the segment after the last `/` is matched. Figures are rough; they
/// exist to make a runaway collapse loop visible, not for billing.
pub fn pricing_for_model(model: &str) -> ModelPricing {
    let name = model.rsplit('/').next().unwrap_or(model).to_lowercase();

    let (input, output) = if name.contains("gemini") && name.contains("flash") {
        (0.075, 0.30)
    } else if name.contains("gemini") {
        (1.25, 5.0)
    } else if name.contains("haiku") {
        (0.25, 1.25)
    } else if name.contains("sonnet") {
        (3.0, 15.0)
    } else if name.contains("opus") {
        (15.0, 75.0)
    } else if name.contains("4o-mini") {
        (0.15, 0.60)
    } else if name.contains("gpt-4") {
        (2.50, 10.0)
    } else if name.contains("deepseek") {
        (0.27, 1.10)
    } else {
        let d = ModelPricing::default();
        (d.input_per_million, d.output_per_million)
    };

    ModelPricing {
        input_per_million: input,
        output_per_million: output,
    }
}

/// Cumulative usage across every reducer call of a run.
#[derive(Debug, Default)]
pub struct UsageTracker {
    pub calls: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record token usage for one call.
    pub fn record(&mut self, prompt_tokens: u32, completion_tokens: u32, pricing: &ModelPricing) {
        self.calls += 1;
        self.total_prompt_tokens += prompt_tokens as u64;
        self.total_completion_tokens += completion_tokens as u64;
        self.estimated_cost_usd += pricing.estimate_cost(prompt_tokens, completion_tokens);
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        format!(
            "{} calls, tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.calls,
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_unique() {
        let a = generate_run_id();
        let b = generate_run_id();
        assert_ne!(a, b);
        assert!(a.starts_with("run-"));
    }

    #[test]
    fn cost_estimation() {
        let pricing = ModelPricing {
            input_per_million: 3.0,
            output_per_million: 15.0,
        };
        let cost = pricing.estimate_cost(1_000_000, 100_000);
        assert!((cost - 4.5).abs() < 0.01);
    }

    #[test]
    fn tracker_accumulates() {
        let mut tracker = UsageTracker::new();
        let pricing = ModelPricing::default();
        tracker.record(1000, 500, &pricing);
        tracker.record(2000, 1000, &pricing);
        assert_eq!(tracker.calls, 2);
        assert_eq!(tracker.total_prompt_tokens, 3000);
        assert_eq!(tracker.total_tokens(), 4500);
        assert!(tracker.estimated_cost_usd > 0.0);
        assert!(tracker.summary().starts_with("2 calls"));
    }

    #[test]
    fn flash_is_cheaper_than_pro() {
        let flash = pricing_for_model("google/gemini-flash-1.5");
        let pro = pricing_for_model("google/gemini-pro-1.5");
        assert!(flash.input_per_million < pro.input_per_million);
    }

    #[test]
    fn org_prefix_is_ignored() {
        let p = pricing_for_model("sonnet-labs/custom-model");
        assert_eq!(p.input_per_million, ModelPricing::default().input_per_million);
    }
}
