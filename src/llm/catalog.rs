use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upstream provider family a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Groq's OpenAI-compatible low-latency API
    #[serde(rename = "groq")]
    FastInference,
    /// Google generative-language REST API
    #[serde(rename = "gemini")]
    Gemini,
    /// GitHub-hosted models (OpenAI-style chat completions)
    #[serde(rename = "github-hosted")]
    HostedInference,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::FastInference => "groq",
            ProviderKind::Gemini => "gemini",
            ProviderKind::HostedInference => "github-hosted",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" | "fast" => Ok(ProviderKind::FastInference),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "github-hosted" | "github" | "hosted" => Ok(ProviderKind::HostedInference),
            _ => Err(format!("Invalid provider kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "provider")]
    pub provider_kind: ProviderKind,
    pub context_window_tokens: u32,
    #[serde(default)]
    pub reasoning_capable: bool,
    #[serde(default)]
    pub vision_capable: bool,
    /// Model-specific system prompt, used when no override is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

struct BuiltinModel {
    id: &'static str,
    display_name: &'static str,
    provider: ProviderKind,
    context_window: u32,
    reasoning: bool,
    vision: bool,
    prompt: Option<&'static str>,
}

const REASONING_PROMPT: &str = "You are a careful assistant. Think through the problem step by step, then give a clear and concise final answer.";
const CODE_PROMPT: &str = "You are an expert programming assistant. Prefer short, correct code samples and explain only what is needed.";

const BUILTIN_MODELS: &[BuiltinModel] = &[
    // GitHub-hosted models
    BuiltinModel {
        id: "gpt-4o",
        display_name: "GPT-4o",
        provider: ProviderKind::HostedInference,
        context_window: 128_000,
        reasoning: false,
        vision: true,
        prompt: None,
    },
    BuiltinModel {
        id: "gpt-4o-mini",
        display_name: "GPT-4o mini",
        provider: ProviderKind::HostedInference,
        context_window: 128_000,
        reasoning: false,
        vision: true,
        prompt: None,
    },
    BuiltinModel {
        id: "o3-mini",
        display_name: "OpenAI o3-mini",
        provider: ProviderKind::HostedInference,
        context_window: 200_000,
        reasoning: true,
        vision: false,
        prompt: Some(REASONING_PROMPT),
    },
    BuiltinModel {
        id: "DeepSeek-R1",
        display_name: "DeepSeek R1",
        provider: ProviderKind::HostedInference,
        context_window: 128_000,
        reasoning: true,
        vision: false,
        prompt: Some(REASONING_PROMPT),
    },
    BuiltinModel {
        id: "Llama-3.3-70B-Instruct",
        display_name: "Llama 3.3 70B Instruct",
        provider: ProviderKind::HostedInference,
        context_window: 128_000,
        reasoning: false,
        vision: false,
        prompt: None,
    },
    BuiltinModel {
        id: "Phi-4",
        display_name: "Phi-4",
        provider: ProviderKind::HostedInference,
        context_window: 16_384,
        reasoning: false,
        vision: false,
        prompt: None,
    },
    BuiltinModel {
        id: "Codestral-2501",
        display_name: "Codestral 25.01",
        provider: ProviderKind::HostedInference,
        context_window: 256_000,
        reasoning: false,
        vision: false,
        prompt: Some(CODE_PROMPT),
    },
    // Groq
    BuiltinModel {
        id: "llama-3.3-70b-versatile",
        display_name: "Llama 3.3 70B (Groq)",
        provider: ProviderKind::FastInference,
        context_window: 128_000,
        reasoning: false,
        vision: false,
        prompt: None,
    },
    BuiltinModel {
        id: "llama-3.1-8b-instant",
        display_name: "Llama 3.1 8B Instant (Groq)",
        provider: ProviderKind::FastInference,
        context_window: 128_000,
        reasoning: false,
        vision: false,
        prompt: None,
    },
    BuiltinModel {
        id: "deepseek-r1-distill-llama-70b",
        display_name: "DeepSeek R1 Distill Llama 70B (Groq)",
        provider: ProviderKind::FastInference,
        context_window: 128_000,
        reasoning: true,
        vision: false,
        prompt: Some(REASONING_PROMPT),
    },
    BuiltinModel {
        id: "qwen-qwq-32b",
        display_name: "Qwen QwQ 32B (Groq)",
        provider: ProviderKind::FastInference,
        context_window: 128_000,
        reasoning: true,
        vision: false,
        prompt: Some(REASONING_PROMPT),
    },
    BuiltinModel {
        id: "gemma2-9b-it",
        display_name: "Gemma 2 9B (Groq)",
        provider: ProviderKind::FastInference,
        context_window: 8_192,
        reasoning: false,
        vision: false,
        prompt: None,
    },
    // Gemini
    BuiltinModel {
        id: "gemini-flash",
        display_name: "Gemini Flash",
        provider: ProviderKind::Gemini,
        context_window: 1_048_576,
        reasoning: false,
        vision: true,
        prompt: None,
    },
    BuiltinModel {
        id: "gemini-2.0-flash",
        display_name: "Gemini 2.0 Flash",
        provider: ProviderKind::Gemini,
        context_window: 1_048_576,
        reasoning: false,
        vision: true,
        prompt: None,
    },
    BuiltinModel {
        id: "gemini-1.5-pro",
        display_name: "Gemini 1.5 Pro",
        provider: ProviderKind::Gemini,
        context_window: 2_097_152,
        reasoning: false,
        vision: true,
        prompt: None,
    },
];

/// Registry of known models, looked up by id.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelCatalog {
    /// Catalog holding only the built-in table.
    pub fn builtin() -> Self {
        Self::with_custom(Vec::new())
    }

    /// Built-in table plus extra descriptors; a custom entry replaces a
    /// built-in one with the same id.
    pub fn with_custom(custom: Vec<ModelDescriptor>) -> Self {
        let mut catalog = Self {
            models: Vec::with_capacity(BUILTIN_MODELS.len() + custom.len()),
            index: HashMap::new(),
        };

        for m in BUILTIN_MODELS {
            catalog.insert(ModelDescriptor {
                id: m.id.to_string(),
                display_name: m.display_name.to_string(),
                provider_kind: m.provider,
                context_window_tokens: m.context_window,
                reasoning_capable: m.reasoning,
                vision_capable: m.vision,
                system_prompt: m.prompt.map(str::to_string),
            });
        }

        for descriptor in custom {
            catalog.insert(descriptor);
        }

        catalog
    }

    fn insert(&mut self, descriptor: ModelDescriptor) {
        match self.index.get(&descriptor.id) {
            Some(&pos) => self.models[pos] = descriptor,
            None => {
                self.index.insert(descriptor.id.clone(), self.models.len());
                self.models.push(descriptor);
            }
        }
    }

    pub fn lookup_model(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.index.get(model_id).map(|&pos| &self.models[pos])
    }

    /// Provider family for a model id. Unknown ids are pass-through
    /// identifiers for the hosted-inference provider.
    pub fn provider_for(&self, model_id: &str) -> ProviderKind {
        self.lookup_model(model_id)
            .map(|m| m.provider_kind)
            .unwrap_or(ProviderKind::HostedInference)
    }

    pub fn is_reasoning_capable(&self, model_id: &str) -> bool {
        self.lookup_model(model_id)
            .map(|m| m.reasoning_capable)
            .unwrap_or(false)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_models() {
        let catalog = ModelCatalog::builtin();

        let gpt = catalog.lookup_model("gpt-4o").unwrap();
        assert_eq!(gpt.provider_kind, ProviderKind::HostedInference);
        assert!(gpt.vision_capable);

        let qwq = catalog.lookup_model("qwen-qwq-32b").unwrap();
        assert_eq!(qwq.provider_kind, ProviderKind::FastInference);
        assert!(qwq.reasoning_capable);

        assert_eq!(catalog.provider_for("gemini-flash"), ProviderKind::Gemini);
    }

    #[test]
    fn test_unknown_model_defaults_to_hosted() {
        let catalog = ModelCatalog::builtin();
        assert!(catalog.lookup_model("my-custom-finetune").is_none());
        assert_eq!(
            catalog.provider_for("my-custom-finetune"),
            ProviderKind::HostedInference
        );
        assert!(!catalog.is_reasoning_capable("my-custom-finetune"));
    }

    #[test]
    fn test_each_builtin_id_resolves_to_one_provider() {
        let catalog = ModelCatalog::builtin();
        assert_eq!(catalog.len(), BUILTIN_MODELS.len());

        for entry in BUILTIN_MODELS {
            let families: std::collections::HashSet<ProviderKind> = BUILTIN_MODELS
                .iter()
                .filter(|m| m.id == entry.id)
                .map(|m| m.provider)
                .collect();
            assert_eq!(families.len(), 1, "{} listed under several providers", entry.id);
            assert_eq!(catalog.provider_for(entry.id), entry.provider);
        }
    }

    #[test]
    fn test_custom_model_replaces_builtin() {
        let catalog = ModelCatalog::with_custom(vec![
            ModelDescriptor {
                id: "gpt-4o".to_string(),
                display_name: "GPT-4o (Groq mirror)".to_string(),
                provider_kind: ProviderKind::FastInference,
                context_window_tokens: 8_192,
                reasoning_capable: false,
                vision_capable: false,
                system_prompt: None,
            },
            ModelDescriptor {
                id: "mixtral-8x7b-32768".to_string(),
                display_name: "Mixtral 8x7B".to_string(),
                provider_kind: ProviderKind::FastInference,
                context_window_tokens: 32_768,
                reasoning_capable: false,
                vision_capable: false,
                system_prompt: None,
            },
        ]);

        assert_eq!(catalog.len(), BUILTIN_MODELS.len() + 1);
        assert_eq!(catalog.provider_for("gpt-4o"), ProviderKind::FastInference);
        assert_eq!(
            catalog.provider_for("mixtral-8x7b-32768"),
            ProviderKind::FastInference
        );
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!(
            "groq".parse::<ProviderKind>().unwrap(),
            ProviderKind::FastInference
        );
        assert_eq!(
            "GitHub".parse::<ProviderKind>().unwrap(),
            ProviderKind::HostedInference
        );
        assert!("openai".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let catalog = ModelCatalog::builtin();
        let json = serde_json::to_value(catalog.lookup_model("gemini-flash").unwrap()).unwrap();
        assert_eq!(json["provider"], "gemini");
        assert_eq!(json["contextWindowTokens"], 1_048_576);
        assert_eq!(json["visionCapable"], true);
    }
}
