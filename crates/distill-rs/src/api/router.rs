//! Per-stage model routing.
//!
//! Per-chunk map summaries are the bulk of the calls and can go to a cheap,
//! fast model; the single final reduction can go to a more capable one.

use crate::reduce::ReduceStage;

/// Which model handles which reduction stage.
#[derive(Debug, Clone)]
pub enum ModelRouting {
    /// Use a single model for every stage.
    Single(String),
    /// Pick a model per stage.
    Staged {
        map_model: String,
        collapse_model: String,
        final_model: String,
    },
}

impl ModelRouting {
    /// Cheap model for map and collapse, a separate one for the final pass.
    pub fn cheap_map(cheap: impl Into<String>, final_model: impl Into<String>) -> Self {
        let cheap = cheap.into();
        ModelRouting::Staged {
            map_model: cheap.clone(),
            collapse_model: cheap,
            final_model: final_model.into(),
        }
    }

    /// Get the model to use for a given stage.
    pub fn model_for_stage(&self, stage: ReduceStage) -> &str {
        match self {
            ModelRouting::Single(model) => model,
            ModelRouting::Staged {
                map_model,
                collapse_model,
                final_model,
            } => match stage {
                ReduceStage::Map => map_model,
                ReduceStage::Collapse => collapse_model,
                ReduceStage::Final => final_model,
            },
        }
    }
}

impl Default for ModelRouting {
    fn default() -> Self {
        ModelRouting::Single(crate::DEFAULT_MODEL.to_string())
    }
}
