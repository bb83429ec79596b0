//! Provider registry: one immutable configuration record per named upstream.
//!
//! Built once from [`ProvidersConfig`] at startup and shared behind an `Arc`.
//! Requests never write to it. The credentials for a chosen provider are
//! copied out into a [`Credentials`] value and passed explicitly to the
//! transport.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::{ProviderConfig, ProvidersConfig};

/// Gateway providers and their default base URLs.
const GATEWAY_URLS: &[(ProviderKind, &str)] = &[
    (ProviderKind::OpenRouter, "https://openrouter.ai/api/v1"),
    (ProviderKind::Together, "https://api.together.xyz/v1"),
    (ProviderKind::Moonshot, "https://api.moonshot.cn/v1"),
    (ProviderKind::AiHubMix, "https://aihubmix.com/v1"),
];

/// OpenAI-compatible endpoints for providers called directly.
const NATIVE_URLS: &[(ProviderKind, &str)] = &[
    (ProviderKind::OpenAi, "https://api.openai.com/v1"),
    (ProviderKind::Anthropic, "https://api.anthropic.com/v1"),
    (ProviderKind::DeepSeek, "https://api.deepseek.com/v1"),
    (ProviderKind::Groq, "https://api.groq.com/openai/v1"),
    (
        ProviderKind::Gemini,
        "https://generativelanguage.googleapis.com/v1beta/openai",
    ),
    (ProviderKind::Zhipu, "https://open.bigmodel.cn/api/paas/v4"),
    (
        ProviderKind::DashScope,
        "https://dashscope.aliyuncs.com/compatible-mode/v1",
    ),
    (ProviderKind::Vllm, "http://localhost:8000/v1"),
];

/// Used when nothing more specific is known.
const DEFAULT_URL: &str = "https://api.openai.com/v1";

/// A named upstream LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenRouter,
    AiHubMix,
    Together,
    DeepSeek,
    Anthropic,
    OpenAi,
    Gemini,
    Zhipu,
    DashScope,
    Moonshot,
    Vllm,
    Groq,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 12] = [
        Self::OpenRouter,
        Self::AiHubMix,
        Self::Together,
        Self::DeepSeek,
        Self::Anthropic,
        Self::OpenAi,
        Self::Gemini,
        Self::Zhipu,
        Self::DashScope,
        Self::Moonshot,
        Self::Vllm,
        Self::Groq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::AiHubMix => "aihubmix",
            Self::Together => "together",
            Self::DeepSeek => "deepseek",
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Zhipu => "zhipu",
            Self::DashScope => "dashscope",
            Self::Moonshot => "moonshot",
            Self::Vllm => "vllm",
            Self::Groq => "groq",
        }
    }

    /// Default base URL for gateway-style providers.
    pub fn gateway_base(&self) -> Option<&'static str> {
        lookup(GATEWAY_URLS, *self)
    }

    /// Base URL used when the config does not name one.
    pub fn default_endpoint(&self) -> &'static str {
        self.gateway_base()
            .or_else(|| lookup(NATIVE_URLS, *self))
            .unwrap_or(DEFAULT_URL)
    }
}

fn lookup(table: &[(ProviderKind, &'static str)], kind: ProviderKind) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == kind).map(|(_, url)| *url)
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| format!("unknown provider: {s}"))
    }
}

/// Read-only set of provider configurations.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: HashMap<ProviderKind, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn new(entries: impl IntoIterator<Item = (ProviderKind, ProviderConfig)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn from_config(providers: &ProvidersConfig) -> Self {
        Self::new(
            ProviderKind::ALL
                .into_iter()
                .filter_map(|kind| providers.get(kind).map(|entry| (kind, entry.clone()))),
        )
    }

    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.entries.get(&kind)
    }

    /// Config for `kind` only if it carries a non-empty API key.
    pub fn usable(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.get(kind).filter(|entry| entry.has_key())
    }

    /// Providers with a usable key, in canonical order.
    pub fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.usable(*kind).is_some())
            .collect()
    }
}

/// Credential context for one request: who to call and with what.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub provider: ProviderKind,
    pub api_key: String,
    /// Base URL set explicitly in the config (not a built-in default).
    pub api_base: Option<String>,
    pub extra_headers: HashMap<String, String>,
}

impl Credentials {
    pub fn new(provider: ProviderKind, entry: &ProviderConfig) -> Self {
        Self {
            provider,
            api_key: entry.api_key.clone(),
            api_base: entry.api_base.clone().filter(|base| !base.is_empty()),
            extra_headers: entry.extra_headers.clone(),
        }
    }

    /// Base URL requests are sent to, without a trailing slash.
    pub fn endpoint(&self) -> String {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
            .trim_end_matches('/')
            .to_string()
    }
}

// Keep keys out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("extra_headers", &self.extra_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
