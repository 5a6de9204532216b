//! Pipeline state machine: explicit stages and legal transition guards.
//!
//! ```text
//! Start      → Mapping | Collecting
//! Mapping    → Collecting
//! Collecting → Routing
//! Routing    → Collapsing | Finalizing
//! Collapsing → Routing
//! Finalizing → Done
//! any non-terminal → Failed
//! ```

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use super::document::WorkingSet;
use crate::error::SummarizeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    /// Chunking inputs and summarizing every chunk.
    Mapping,
    /// Fan-in barrier: merging map outputs into the working set.
    Collecting,
    /// Comparing the working set against the budget.
    Routing,
    /// Reducing budget-sized bins of the working set.
    Collapsing,
    /// Producing the single final summary.
    Finalizing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Mapping => "mapping",
            Self::Collecting => "collecting",
            Self::Routing => "routing",
            Self::Collapsing => "collapsing",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

pub fn is_legal_transition(from: PipelineStage, to: PipelineStage) -> bool {
    use PipelineStage::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Start, Mapping)
            | (Start, Collecting)
            | (Mapping, Collecting)
            | (Collecting, Routing)
            | (Routing, Collapsing)
            | (Collapsing, Routing)
            | (Routing, Finalizing)
            | (Finalizing, Done)
    )
}

/// A single recorded transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionRecord {
    pub from: PipelineStage,
    pub to: PipelineStage,
    /// Collapse iteration at the time of the transition.
    pub iteration: u32,
    /// Milliseconds since the run started.
    pub elapsed_ms: u64,
}

/// Mutable state of one run. Owned by the orchestrator and dropped when the
/// run terminates.
#[derive(Debug)]
pub struct PipelineState {
    pub run_id: String,
    /// Raw input documents, drained when mapping starts.
    pub inputs: Vec<String>,
    pub budget: usize,
    pub summaries: WorkingSet,
    pub iteration: u32,
    /// Total number of chunks produced by the mapping stage.
    pub chunks: usize,
    stage: PipelineStage,
    transitions: Vec<TransitionRecord>,
    started: Instant,
}

impl PipelineState {
    pub fn new(run_id: impl Into<String>, inputs: Vec<String>, budget: usize) -> Self {
        Self {
            run_id: run_id.into(),
            inputs,
            budget,
            summaries: WorkingSet::default(),
            iteration: 0,
            chunks: 0,
            stage: PipelineStage::Start,
            transitions: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Move to `to`, recording the transition. Illegal moves leave the
    /// state unchanged.
    pub fn advance(&mut self, to: PipelineStage) -> Result<PipelineStage, SummarizeError> {
        let from = self.stage;
        if !is_legal_transition(from, to) {
            return Err(SummarizeError::IllegalTransition { from, to });
        }
        self.transitions.push(TransitionRecord {
            from,
            to,
            iteration: self.iteration,
            elapsed_ms: self.elapsed_ms(),
        });
        self.stage = to;
        info!(
            "[{}] {from} -> {to} (iteration {})",
            self.run_id, self.iteration
        );
        Ok(from)
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineStage::*;

    #[test]
    fn happy_path_is_legal() {
        let mut state = PipelineState::new("run-test", vec![], 100);
        for to in [Mapping, Collecting, Routing, Collapsing, Routing, Finalizing, Done] {
            state.advance(to).unwrap();
        }
        assert_eq!(state.stage(), Done);
        assert_eq!(state.transitions().len(), 7);
        assert_eq!(state.transitions()[0].from, Start);
    }

    #[test]
    fn combine_enters_at_collecting() {
        assert!(is_legal_transition(Start, Collecting));
    }

    #[test]
    fn skipping_stages_is_illegal() {
        assert!(!is_legal_transition(Start, Routing));
        assert!(!is_legal_transition(Mapping, Finalizing));
        assert!(!is_legal_transition(Collapsing, Finalizing));
        assert!(!is_legal_transition(Finalizing, Routing));
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!is_legal_transition(Done, Failed));
        assert!(!is_legal_transition(Failed, Failed));
        assert!(!is_legal_transition(Done, Mapping));
    }

    #[test]
    fn any_live_stage_can_fail() {
        for from in [Start, Mapping, Collecting, Routing, Collapsing, Finalizing] {
            assert!(is_legal_transition(from, Failed), "{from} -> failed");
        }
    }

    #[test]
    fn illegal_advance_is_an_error_and_not_recorded() {
        let mut state = PipelineState::new("run-test", vec![], 100);
        let err = state.advance(Done).unwrap_err();
        assert!(matches!(err, SummarizeError::IllegalTransition { from: Start, to: Done }));
        assert_eq!(state.stage(), Start);
        assert!(state.transitions().is_empty());
    }

    #[test]
    fn stage_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Finalizing).unwrap(), "\"finalizing\"");
    }
}
