//! Typed failures of a summarization run.

use thiserror::Error;

use crate::pipeline::{PipelineStage, SummaryOutput};
use crate::reduce::ReduceStage;

/// Outcome of one run, produced exactly once.
pub type RunResult = Result<SummaryOutput, SummarizeError>;

/// Errors that terminate a summarization run.
///
/// Partial progress is discarded on every variant; the caller only ever sees
/// a complete, budget-compliant summary or one of these.
#[derive(Debug, Clone, Error)]
pub enum SummarizeError {
    /// The reducer kept producing output over budget until the attempt cap.
    #[error(
        "{stage} output did not fit the budget: {tokens} tokens > {budget} after {attempts} attempts"
    )]
    ConvergenceFailure {
        stage: ReduceStage,
        tokens: usize,
        budget: usize,
        attempts: u32,
    },

    /// The collapse loop ran more rounds than allowed.
    #[error("collapse loop exceeded {limit} rounds")]
    RecursionLimitExceeded { limit: u32 },

    /// The reducer failed (or timed out) and retries did not recover it.
    #[error("{stage} reducer failed after {attempts} attempts: {message}")]
    UpstreamGeneration {
        stage: ReduceStage,
        attempts: u32,
        message: String,
    },

    /// No input text to summarize.
    #[error("nothing to summarize: input is empty")]
    EmptyInput,

    /// Budget must be positive.
    #[error("invalid token budget: {budget}")]
    InvalidBudget { budget: usize },

    #[error("illegal pipeline transition {from} -> {to}")]
    IllegalTransition {
        from: PipelineStage,
        to: PipelineStage,
    },

    /// A collapse round shrank neither the document count nor the token total.
    #[error("collapse made no progress: {documents} documents, {tokens} tokens")]
    CollapseStalled { documents: usize, tokens: usize },

    /// A spawned task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SummarizeError {
    /// Short machine-readable name, used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConvergenceFailure { .. } => "convergence_failure",
            Self::RecursionLimitExceeded { .. } => "recursion_limit_exceeded",
            Self::UpstreamGeneration { .. } => "upstream_generation",
            Self::EmptyInput => "empty_input",
            Self::InvalidBudget { .. } => "invalid_budget",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::CollapseStalled { .. } => "collapse_stalled",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether the run failed because output would not shrink to fit.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(
            self,
            Self::ConvergenceFailure { .. }
                | Self::RecursionLimitExceeded { .. }
                | Self::CollapseStalled { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_numbers() {
        let err = SummarizeError::ConvergenceFailure {
            stage: ReduceStage::Map,
            tokens: 2000,
            budget: 1000,
            attempts: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("map"));
        assert!(msg.contains("2000"));
        assert!(msg.contains("5 attempts"));
    }

    #[test]
    fn classification() {
        assert!(SummarizeError::RecursionLimitExceeded { limit: 10 }.is_convergence_failure());
        assert!(!SummarizeError::EmptyInput.is_convergence_failure());
        assert_eq!(SummarizeError::InvalidBudget { budget: 0 }.kind(), "invalid_budget");
    }

    #[test]
    fn illegal_transition_names_both_stages() {
        let err = SummarizeError::IllegalTransition {
            from: PipelineStage::Done,
            to: PipelineStage::Mapping,
        };
        assert_eq!(err.to_string(), "illegal pipeline transition done -> mapping");
    }
}
