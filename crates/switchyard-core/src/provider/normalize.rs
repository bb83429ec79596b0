//! Model identifier normalization.
//!
//! Rewrites a model identifier into the routing-prefix convention the
//! selected upstream expects (`openrouter/…`, `together_ai/…`,
//! `hosted_vllm/…`, `zai/…`, …). Each rule leaves alone a name that
//! already carries its prefix, so `openrouter/foo` stays `openrouter/foo`.
//!
//! The prefixes are routing keys. When talking to a provider directly,
//! [`wire_model`] strips them again before the name goes on the wire.

use super::registry::{Credentials, ProviderKind};

/// Prefixes this module may add. Stripped for direct transport.
const ROUTING_PREFIXES: &[&str] = &[
    "openrouter/",
    "together_ai/",
    "hosted_vllm/",
    "zai/",
    "dashscope/",
    "moonshot/",
    "gemini/",
];

/// Leading segments that exempt a model from the `together_ai/` prefix.
const TOGETHER_KNOWN_PREFIXES: &[&str] = &[
    "openrouter",
    "anthropic",
    "openai",
    "gemini",
    "zhipu",
    "zai",
    "hosted_vllm",
    "together_ai",
];

/// `(keywords, prefix, exempt prefixes)` rules for direct mode. First match wins.
const PREFIX_RULES: &[(&[&str], &str, &[&str])] = &[
    (
        &["glm", "zhipu"],
        "zai",
        &["zhipu/", "zai/", "openrouter/", "hosted_vllm/"],
    ),
    (&["qwen", "dashscope"], "dashscope", &["dashscope/", "openrouter/"]),
    (&["moonshot", "kimi"], "moonshot", &["moonshot/", "openrouter/"]),
    (&["gemini"], "gemini", &["gemini/"]),
];

/// Models that only accept `temperature = 1.0`.
const FIXED_TEMPERATURE_MODELS: &[(&str, f64)] = &[("kimi-k2.5", 1.0)];

/// How the selected upstream expects model identifiers to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    OpenRouter,
    Together,
    /// Custom OpenAI-compatible endpoint (vLLM and friends).
    Vllm,
    Direct,
}

impl ProviderMode {
    /// Derive the mode from the request's credentials and model.
    pub fn detect(credentials: &Credentials, model: &str) -> Self {
        let base = credentials.api_base.as_deref();
        let base_contains = |needle: &str| base.is_some_and(|b| b.contains(needle));

        let is_openrouter = credentials.provider == ProviderKind::OpenRouter
            || credentials.api_key.starts_with("sk-or-")
            || base_contains("openrouter");
        let is_together = credentials.provider == ProviderKind::Together
            || base_contains("together")
            || model.starts_with("together_ai/");

        if is_openrouter {
            Self::OpenRouter
        } else if is_together {
            Self::Together
        } else if credentials.provider == ProviderKind::Vllm || base.is_some() {
            Self::Vllm
        } else {
            Self::Direct
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::Together => "together",
            Self::Vllm => "vllm",
            Self::Direct => "direct",
        }
    }
}

/// Result of normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedModel {
    pub model: String,
    /// Forced temperature for models that reject anything else.
    pub temperature_override: Option<f64>,
}

/// Rewrite `model` for `mode`.
pub fn normalize(model: &str, mode: ProviderMode) -> NormalizedModel {
    let mut model = match mode {
        ProviderMode::Vllm => prefixed_unless(model, "hosted_vllm", &["hosted_vllm/"]),
        ProviderMode::OpenRouter => prefixed_unless(model, "openrouter", &["openrouter/"]),
        ProviderMode::Together => {
            let leading = model.split('/').next().unwrap_or_default();
            if model.starts_with("together_ai/") || TOGETHER_KNOWN_PREFIXES.contains(&leading) {
                model.to_string()
            } else {
                format!("together_ai/{model}")
            }
        }
        ProviderMode::Direct => apply_prefix_rules(model),
    };

    // Safety net for gemini regardless of mode.
    if model.to_lowercase().contains("gemini") && !model.starts_with("gemini/") {
        model = format!("gemini/{model}");
    }

    let lower = model.to_lowercase();
    let temperature_override = FIXED_TEMPERATURE_MODELS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, temperature)| *temperature);

    NormalizedModel {
        model,
        temperature_override,
    }
}

fn prefixed_unless(model: &str, prefix: &str, exempt: &[&str]) -> String {
    if exempt.iter().any(|p| model.starts_with(p)) {
        model.to_string()
    } else {
        format!("{prefix}/{model}")
    }
}

fn apply_prefix_rules(model: &str) -> String {
    let lower = model.to_lowercase();
    PREFIX_RULES
        .iter()
        .find(|(keywords, _, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, prefix, exempt)| prefixed_unless(model, prefix, exempt))
        .unwrap_or_else(|| model.to_string())
}

/// Model name to send when calling the provider directly: all leading
/// routing prefixes removed.
pub fn wire_model(model: &str) -> &str {
    let mut rest = model;
    while let Some(stripped) = ROUTING_PREFIXES.iter().find_map(|p| rest.strip_prefix(p)) {
        rest = stripped;
    }
    rest
}

/// Drop a leading `<provider>/` segment the caller wrote for the provider
/// being called directly (`anthropic/claude-3` to Anthropic becomes `claude-3`).
pub fn strip_provider_prefix(model: &str, provider: ProviderKind) -> &str {
    model
        .strip_prefix(provider.as_str())
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn creds(provider: ProviderKind, key: &str, base: Option<&str>) -> Credentials {
        Credentials::new(
            provider,
            &ProviderConfig {
                api_key: key.into(),
                api_base: base.map(str::to_string),
                ..Default::default()
            },
        )
    }

    fn norm(model: &str, mode: ProviderMode) -> String {
        normalize(model, mode).model
    }

    #[test]
    fn test_detect_modes() {
        let detect = |c: &Credentials, m: &str| ProviderMode::detect(c, m);
        assert_eq!(detect(&creds(ProviderKind::OpenRouter, "x", None), "m"), ProviderMode::OpenRouter);
        assert_eq!(detect(&creds(ProviderKind::AiHubMix, "sk-or-v1", None), "m"), ProviderMode::OpenRouter);
        assert_eq!(detect(&creds(ProviderKind::Together, "x", None), "m"), ProviderMode::Together);
        assert_eq!(
            detect(&creds(ProviderKind::OpenAi, "x", Some("https://api.together.xyz/v1")), "m"),
            ProviderMode::Together
        );
        assert_eq!(detect(&creds(ProviderKind::OpenAi, "x", None), "together_ai/m"), ProviderMode::Together);
        assert_eq!(
            detect(&creds(ProviderKind::OpenAi, "x", Some("http://gpu:8000/v1")), "m"),
            ProviderMode::Vllm
        );
        assert_eq!(detect(&creds(ProviderKind::Vllm, "x", None), "m"), ProviderMode::Vllm);
        // Built-in gateway default is not an explicit base.
        assert_eq!(detect(&creds(ProviderKind::Moonshot, "x", None), "kimi"), ProviderMode::Direct);
    }

    #[test]
    fn test_openrouter_prefix_is_idempotent() {
        let once = norm("anthropic/claude-3", ProviderMode::OpenRouter);
        assert_eq!(once, "openrouter/anthropic/claude-3");
        assert_eq!(norm(&once, ProviderMode::OpenRouter), once);
        assert_eq!(norm("openrouter/foo", ProviderMode::OpenRouter), "openrouter/foo");
    }

    #[test]
    fn test_together_respects_known_prefixes() {
        assert_eq!(
            norm("meta-llama/Llama-3-70b", ProviderMode::Together),
            "together_ai/meta-llama/Llama-3-70b"
        );
        assert_eq!(norm("openai/gpt-4o", ProviderMode::Together), "openai/gpt-4o");
        assert_eq!(norm("together_ai/foo", ProviderMode::Together), "together_ai/foo");
    }

    #[test]
    fn test_vllm_prefixes_over_existing_prefix() {
        assert_eq!(norm("openai/llama-3", ProviderMode::Vllm), "hosted_vllm/openai/llama-3");
        assert_eq!(norm("hosted_vllm/llama-3", ProviderMode::Vllm), "hosted_vllm/llama-3");
    }

    #[test]
    fn test_direct_prefix_rules() {
        assert_eq!(norm("glm-4", ProviderMode::Direct), "zai/glm-4");
        assert_eq!(norm("zhipu/glm-4", ProviderMode::Direct), "zhipu/glm-4");
        assert_eq!(norm("qwen-max", ProviderMode::Direct), "dashscope/qwen-max");
        assert_eq!(norm("openrouter/qwen-max", ProviderMode::Direct), "openrouter/qwen-max");
        assert_eq!(norm("kimi-latest", ProviderMode::Direct), "moonshot/kimi-latest");
        assert_eq!(norm("gemini-2.0-flash", ProviderMode::Direct), "gemini/gemini-2.0-flash");
        assert_eq!(norm("gpt-4o", ProviderMode::Direct), "gpt-4o");
    }

    #[test]
    fn test_first_prefix_rule_wins() {
        // Matches both the glm and qwen rules; glm is declared first.
        assert_eq!(norm("glm-qwen-merge", ProviderMode::Direct), "zai/glm-qwen-merge");
    }

    #[test]
    fn test_gemini_safety_net() {
        assert_eq!(
            norm("google/gemini-pro", ProviderMode::OpenRouter),
            "gemini/openrouter/google/gemini-pro"
        );
        let once = norm("Gemini-Pro", ProviderMode::Direct);
        assert_eq!(once, "gemini/Gemini-Pro");
        assert_eq!(norm(&once, ProviderMode::Direct), once);
    }

    #[test]
    fn test_kimi_k25_forces_temperature() {
        let n = normalize("moonshotai/Kimi-K2.5", ProviderMode::Direct);
        assert_eq!(n.model, "moonshot/moonshotai/Kimi-K2.5");
        assert_eq!(n.temperature_override, Some(1.0));

        assert_eq!(normalize("kimi-k2", ProviderMode::Direct).temperature_override, None);
    }

    #[test]
    fn test_wire_model_strips_routing_prefixes() {
        assert_eq!(wire_model("openrouter/anthropic/claude-3"), "anthropic/claude-3");
        assert_eq!(wire_model("gemini/openrouter/google/gemini-pro"), "google/gemini-pro");
        assert_eq!(wire_model("hosted_vllm/openai/llama-3"), "openai/llama-3");
        assert_eq!(wire_model("dashscope/qwen-max"), "qwen-max");
        assert_eq!(wire_model("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn test_strip_provider_prefix() {
        assert_eq!(strip_provider_prefix("anthropic/claude-opus-4-5", ProviderKind::Anthropic), "claude-opus-4-5");
        assert_eq!(strip_provider_prefix("deepseek/deepseek-chat", ProviderKind::DeepSeek), "deepseek-chat");
        assert_eq!(strip_provider_prefix("zhipu/glm-4", ProviderKind::Zhipu), "glm-4");
        // Only the selected provider's own segment is removed.
        assert_eq!(strip_provider_prefix("anthropic/claude-3", ProviderKind::OpenRouter), "anthropic/claude-3");
        assert_eq!(strip_provider_prefix("openai-compat/gpt-4o", ProviderKind::OpenAi), "openai-compat/gpt-4o");
        assert_eq!(strip_provider_prefix("gpt-4o", ProviderKind::OpenAi), "gpt-4o");
    }
}
