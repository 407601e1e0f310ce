use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generation parameters sent with a request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelParameters {
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ModelParameters {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    pub const fn with_top_p(self, top_p: f32) -> Self {
        Self {
            top_p: Some(top_p),
            ..self
        }
    }

    /// Latency-oriented variant used by the hosted-inference path: output is
    /// capped at 600 tokens and light repetition penalties are added.
    pub fn speed_optimized(&self) -> Self {
        Self {
            max_tokens: self.max_tokens.min(HOSTED_MAX_TOKENS_CAP),
            frequency_penalty: Some(HOSTED_PENALTY),
            presence_penalty: Some(HOSTED_PENALTY),
            ..*self
        }
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        DEFAULT_PARAMETERS
    }
}

pub const DEFAULT_PARAMETERS: ModelParameters = ModelParameters::new(0.7, 1000);
pub const HOSTED_MAX_TOKENS_CAP: u32 = 600;
pub const HOSTED_PENALTY: f32 = 0.1;

const BUILTIN_PARAMETERS: &[(&str, ModelParameters)] = &[
    ("gpt-4o", ModelParameters::new(0.7, 4096).with_top_p(1.0)),
    ("gpt-4o-mini", ModelParameters::new(0.7, 4096).with_top_p(1.0)),
    ("o3-mini", ModelParameters::new(1.0, 8192)),
    ("DeepSeek-R1", ModelParameters::new(0.6, 4096).with_top_p(0.95)),
    ("Llama-3.3-70B-Instruct", ModelParameters::new(0.8, 2048).with_top_p(0.9)),
    ("Phi-4", ModelParameters::new(0.7, 2048)),
    ("Codestral-2501", ModelParameters::new(0.2, 4096)),
    ("llama-3.3-70b-versatile", ModelParameters::new(0.7, 2048)),
    ("llama-3.1-8b-instant", ModelParameters::new(0.7, 1024)),
    ("deepseek-r1-distill-llama-70b", ModelParameters::new(0.6, 4096).with_top_p(0.95)),
    ("qwen-qwq-32b", ModelParameters::new(0.6, 4096).with_top_p(0.95)),
    ("gemma2-9b-it", ModelParameters::new(0.7, 1024)),
    ("gemini-flash", ModelParameters::new(0.9, 2048).with_top_p(1.0)),
    ("gemini-2.0-flash", ModelParameters::new(0.9, 2048).with_top_p(1.0)),
    ("gemini-1.5-pro", ModelParameters::new(0.9, 4096).with_top_p(1.0)),
];

/// Maps model ids to generation parameters, falling back to
/// `{temperature: 0.7, maxTokens: 1000}`.
#[derive(Debug, Clone)]
pub struct ParameterResolver {
    table: HashMap<String, ModelParameters>,
}

impl ParameterResolver {
    pub fn builtin() -> Self {
        Self::with_overrides(HashMap::new())
    }

    /// Built-in table with configured entries layered on top.
    pub fn with_overrides(overrides: HashMap<String, ModelParameters>) -> Self {
        let mut table: HashMap<String, ModelParameters> = BUILTIN_PARAMETERS
            .iter()
            .map(|(id, params)| (id.to_string(), *params))
            .collect();
        table.extend(overrides);
        Self { table }
    }

    pub fn resolve_parameters(&self, model_id: &str) -> ModelParameters {
        self.table.get(model_id).copied().unwrap_or(DEFAULT_PARAMETERS)
    }
}

impl Default for ParameterResolver {
    fn default() -> Self {
        Self::builtin()
    }
}
