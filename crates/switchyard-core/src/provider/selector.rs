//! Provider selection for a model identifier.
//!
//! Two ordered passes, first match wins in each:
//! 1. keyword rules, matched as case-insensitive substrings of the model;
//! 2. a fixed fallback priority list, used when no keyword matched a
//!    provider that actually has a key.
//!
//! Declaration order is the tie-break policy. `"qwen-gpt"` resolves to
//! openai because `gpt` is listed before `qwen`.

use tracing::debug;

use super::registry::{ProviderKind, ProviderRegistry};
use crate::config::ProviderConfig;

/// `(keyword, provider)` rules, evaluated top to bottom.
pub const KEYWORD_RULES: &[(&str, ProviderKind)] = &[
    ("aihubmix", ProviderKind::AiHubMix),
    ("openrouter", ProviderKind::OpenRouter),
    ("together", ProviderKind::Together),
    ("deepseek", ProviderKind::DeepSeek),
    ("anthropic", ProviderKind::Anthropic),
    ("claude", ProviderKind::Anthropic),
    ("openai", ProviderKind::OpenAi),
    ("gpt", ProviderKind::OpenAi),
    ("gemini", ProviderKind::Gemini),
    ("zhipu", ProviderKind::Zhipu),
    ("glm", ProviderKind::Zhipu),
    ("zai", ProviderKind::Zhipu),
    ("dashscope", ProviderKind::DashScope),
    ("qwen", ProviderKind::DashScope),
    ("moonshot", ProviderKind::Moonshot),
    ("kimi", ProviderKind::Moonshot),
    ("groq", ProviderKind::Groq),
    ("vllm", ProviderKind::Vllm),
];

/// Priority order when no keyword rule yields a usable provider.
pub const FALLBACK_ORDER: &[ProviderKind] = &[
    ProviderKind::OpenRouter,
    ProviderKind::AiHubMix,
    ProviderKind::Together,
    ProviderKind::DeepSeek,
    ProviderKind::Anthropic,
    ProviderKind::OpenAi,
    ProviderKind::Gemini,
    ProviderKind::Zhipu,
    ProviderKind::DashScope,
    ProviderKind::Moonshot,
    ProviderKind::Vllm,
    ProviderKind::Groq,
];

/// A chosen provider and its configuration record.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub kind: ProviderKind,
    pub config: &'a ProviderConfig,
    /// `true` when chosen by the fallback list rather than a keyword.
    pub fallback: bool,
}

/// Choose the provider configuration for `model`, or `None` if no provider has a key.
pub fn select<'a>(registry: &'a ProviderRegistry, model: &str) -> Option<Selection<'a>> {
    let model_lower = model.to_lowercase();

    let by_keyword = KEYWORD_RULES
        .iter()
        .filter(|(keyword, _)| model_lower.contains(keyword))
        .find_map(|(_, kind)| {
            registry.usable(*kind).map(|config| Selection {
                kind: *kind,
                config,
                fallback: false,
            })
        });

    let selection = by_keyword.or_else(|| {
        FALLBACK_ORDER.iter().find_map(|kind| {
            registry.usable(*kind).map(|config| Selection {
                kind: *kind,
                config,
                fallback: true,
            })
        })
    });

    match &selection {
        Some(s) => debug!(model, provider = %s.kind, fallback = s.fallback, "Selected provider"),
        None => debug!(model, "No provider with a usable key"),
    }
    selection
}
