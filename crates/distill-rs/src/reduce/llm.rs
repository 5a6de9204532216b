//! LLM-backed reducer over the OpenRouter chat completions API.

use std::sync::Mutex;

use tracing::{debug, warn};

use super::{ReduceFuture, ReduceRequest, ReduceStage, Reducer};
use crate::api::client::{ChatRequest, Message, OpenRouterClient};
use crate::api::router::ModelRouting;
use crate::api::usage::{UsageTracker, pricing_for_model};

const SYSTEM_PROMPT: &str = "You are a careful summarizer. You only restate what the \
provided text says. You reply with the summary itself and nothing else.";

/// Configuration for [`LlmReducer`].
#[derive(Debug, Clone)]
pub struct LlmReducerConfig {
    /// Model selection per stage.
    pub routing: ModelRouting,
    /// Sampling temperature. Zero keeps retries close to deterministic.
    pub temperature: f32,
    /// `max_tokens` sent to the API is `budget * output_headroom`. Above 1.0
    /// so the model is not cut off mid-sentence; the pipeline enforces the
    /// real budget by re-measuring.
    pub output_headroom: f64,
}

impl Default for LlmReducerConfig {
    fn default() -> Self {
        Self {
            routing: ModelRouting::default(),
            temperature: 0.0,
            output_headroom: 1.5,
        }
    }
}

impl LlmReducerConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.routing = ModelRouting::Single(model.into());
        self
    }

    pub fn with_routing(mut self, routing: ModelRouting) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Reducer that prompts a chat model with a stage-specific template.
pub struct LlmReducer {
    client: OpenRouterClient,
    config: LlmReducerConfig,
    usage: Mutex<UsageTracker>,
}

impl LlmReducer {
    pub fn new(client: OpenRouterClient, config: LlmReducerConfig) -> Self {
        Self {
            client,
            config,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    /// Human-readable usage and cost summary across all calls so far.
    pub fn usage_summary(&self) -> String {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .summary()
    }

    fn max_tokens(&self, budget: usize) -> u32 {
        let scaled = (budget as f64 * self.config.output_headroom.max(1.0)).ceil();
        scaled.clamp(1.0, u32::MAX as f64) as u32
    }

    fn record_usage(&self, model: &str, prompt: u32, completion: u32) {
        let pricing = pricing_for_model(model);
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(prompt, completion, &pricing);
    }
}

impl Reducer for LlmReducer {
    fn reduce(&self, request: ReduceRequest) -> ReduceFuture<'_> {
        Box::pin(async move {
            let model = self.config.routing.model_for_stage(request.stage).to_string();
            let body = ChatRequest {
                model: Some(model.clone()),
                messages: vec![
                    Message::system(SYSTEM_PROMPT),
                    Message::user(build_prompt(&request)),
                ],
                max_tokens: self.max_tokens(request.budget),
                temperature: self.config.temperature,
            };

            debug!(
                "{} reduction: {} texts, budget {} via {}",
                request.stage,
                request.texts.len(),
                request.budget,
                model
            );
            let completion = self.client.chat(&body).await?;

            if let Some(usage) = &completion.usage {
                self.record_usage(
                    &model,
                    usage.prompt_tokens.unwrap_or(0),
                    usage.completion_tokens.unwrap_or(0),
                );
            }
            if completion.finish_reason.as_deref() == Some("length") {
                warn!("{} reduction hit max_tokens; output is truncated", request.stage);
            }

            match completion.content {
                Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
                _ => Err("empty LLM response".to_string()),
            }
        })
    }

    fn name(&self) -> &str {
        "llm"
    }
}

/// Render the user prompt for one reduction.
fn build_prompt(request: &ReduceRequest) -> String {
    let words = (request.budget / 4 * 3).max(1);
    let target = format!(
        "at most {} tokens (roughly {words} words)",
        request.budget
    );
    let joined = request.texts.join("\n\n");

    match request.stage {
        ReduceStage::Map => format!(
            "The following is a set of documents:\n\n{joined}\n\n\
             Based on this list of docs, identify the main themes and write a \
             concise summary of them using {target}."
        ),
        ReduceStage::Collapse | ReduceStage::Final => format!(
            "The following is a set of summaries:\n\n{joined}\n\n\
             Take these and distill them into a final, consolidated summary of \
             the main themes using {target}. Do not exceed this length."
        ),
    }
}
