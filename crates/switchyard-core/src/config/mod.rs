//! Configuration module for switchyard.
//!
//! Loads typed configuration from `~/.switchyard/config.json`, then applies
//! `SWITCHYARD_*` environment overrides. The result is read once at startup
//! and never mutated afterwards; the router works from an immutable
//! [`ProviderRegistry`] built from it.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::provider::registry::{ProviderKind, ProviderRegistry};
use crate::provider::selector;

/// Prefix for environment overrides, e.g. `SWITCHYARD_PROVIDERS__OPENAI__API_KEY`.
const ENV_PREFIX: &str = "SWITCHYARD_";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub providers: ProvidersConfig,
    pub agents: AgentsConfig,
    #[serde(alias = "litellmSettings")]
    pub llm_settings: LlmSettings,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when the file is absent, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_or_default(&Self::default_path())
    }

    /// Load `path` (defaults when the file is absent), then apply
    /// environment overrides.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Config::default()
        };
        config.apply_env_overrides(std::env::vars());
        Ok(config)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".switchyard")
    }

    /// Write the default config template to `path`, creating parent directories.
    pub fn write_default_template(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = serde_json::json!({
            "providers": {
                "openrouter": {
                    "apiKey": "sk-or-v1-YOUR_KEY_HERE"
                }
            },
            "agents": {
                "defaults": {
                    "model": AgentDefaults::default().model
                }
            },
            "llmSettings": {
                "allowedOpenaiParams": [],
                "dropParams": null
            }
        });

        std::fs::write(path, serde_json::to_string_pretty(&template)?)?;
        Ok(())
    }

    /// Apply `SWITCHYARD_*` overrides from the given variables.
    ///
    /// Recognized keys (nested with `__`):
    /// `PROVIDERS__<NAME>__API_KEY`, `PROVIDERS__<NAME>__API_BASE`,
    /// `AGENTS__DEFAULTS__{MODEL,MAX_TOKENS,TEMPERATURE}`. Anything else is ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let parts: Vec<String> = path.split("__").map(|p| p.to_ascii_lowercase()).collect();
            match parts.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["providers", name, field] => {
                    let Ok(kind) = name.parse::<ProviderKind>() else {
                        warn!(key = %key, "Unknown provider in environment override");
                        continue;
                    };
                    let entry = self.providers.slot_mut(kind).get_or_insert_with(ProviderConfig::default);
                    match *field {
                        "api_key" => entry.api_key = value,
                        "api_base" => entry.api_base = Some(value),
                        _ => warn!(key = %key, "Unsupported provider field in environment override"),
                    }
                }
                ["agents", "defaults", field] => {
                    let defaults = &mut self.agents.defaults;
                    let applied = match *field {
                        "model" => {
                            defaults.model = value;
                            true
                        }
                        "max_tokens" => value.parse::<u32>().map(|v| defaults.max_tokens = v).is_ok(),
                        "temperature" => value.parse::<f64>().map(|v| defaults.temperature = v).is_ok(),
                        _ => false,
                    };
                    if !applied {
                        warn!(key = %key, "Ignoring invalid agent default override");
                    }
                }
                _ => {}
            }
        }
    }

    /// Build the immutable provider registry the router reads from.
    pub fn registry(&self) -> ProviderRegistry {
        ProviderRegistry::from_config(&self.providers)
    }

    /// Matched provider for a model (default model when `None`).
    pub fn provider_for(&self, model: Option<&str>) -> Option<(ProviderKind, ProviderConfig)> {
        let model = model.unwrap_or(&self.agents.defaults.model);
        let registry = self.registry();
        selector::select(&registry, model).map(|s| (s.kind, s.config.clone()))
    }

    /// API key for a model. Falls back to the first available key.
    pub fn api_key_for(&self, model: Option<&str>) -> Option<String> {
        self.provider_for(model).map(|(_, entry)| entry.api_key)
    }

    /// API base URL for a model: the explicit `apiBase`, else the gateway
    /// default for gateway providers, else `None`.
    pub fn api_base_for(&self, model: Option<&str>) -> Option<String> {
        let (kind, entry) = self.provider_for(model)?;
        entry
            .api_base
            .or_else(|| kind.gateway_base().map(str::to_string))
    }
}

// ── Provider Configuration ──────────────────────────────────────────

/// Credentials and endpoint for one named provider.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_key: String,
    pub api_base: Option<String>,
    pub extra_headers: HashMap<String, String>,
}

impl ProviderConfig {
    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openrouter: Option<ProviderConfig>,
    pub aihubmix: Option<ProviderConfig>,
    pub together: Option<ProviderConfig>,
    pub deepseek: Option<ProviderConfig>,
    pub anthropic: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    pub gemini: Option<ProviderConfig>,
    pub zhipu: Option<ProviderConfig>,
    pub dashscope: Option<ProviderConfig>,
    pub moonshot: Option<ProviderConfig>,
    pub vllm: Option<ProviderConfig>,
    pub groq: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        match kind {
            ProviderKind::OpenRouter => self.openrouter.as_ref(),
            ProviderKind::AiHubMix => self.aihubmix.as_ref(),
            ProviderKind::Together => self.together.as_ref(),
            ProviderKind::DeepSeek => self.deepseek.as_ref(),
            ProviderKind::Anthropic => self.anthropic.as_ref(),
            ProviderKind::OpenAi => self.openai.as_ref(),
            ProviderKind::Gemini => self.gemini.as_ref(),
            ProviderKind::Zhipu => self.zhipu.as_ref(),
            ProviderKind::DashScope => self.dashscope.as_ref(),
            ProviderKind::Moonshot => self.moonshot.as_ref(),
            ProviderKind::Vllm => self.vllm.as_ref(),
            ProviderKind::Groq => self.groq.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: ProviderKind) -> &mut Option<ProviderConfig> {
        match kind {
            ProviderKind::OpenRouter => &mut self.openrouter,
            ProviderKind::AiHubMix => &mut self.aihubmix,
            ProviderKind::Together => &mut self.together,
            ProviderKind::DeepSeek => &mut self.deepseek,
            ProviderKind::Anthropic => &mut self.anthropic,
            ProviderKind::OpenAi => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Zhipu => &mut self.zhipu,
            ProviderKind::DashScope => &mut self.dashscope,
            ProviderKind::Moonshot => &mut self.moonshot,
            ProviderKind::Vllm => &mut self.vllm,
            ProviderKind::Groq => &mut self.groq,
        }
    }
}

// ── Agent Configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-opus-4-5".into(),
            max_tokens: 8192,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

// ── LLM Settings ────────────────────────────────────────────────────

/// Global request-shaping settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LlmSettings {
    /// Parameter names exempted from dropping. A single string is accepted.
    #[serde(deserialize_with = "one_or_many")]
    pub allowed_openai_params: Vec<String>,
    /// `Some(true)` silently drops unsupported parameters, `Some(false)` passes them through.
    pub drop_params: Option<bool>,
    /// Send requests to a LiteLLM-compatible proxy with the full routed model name.
    pub use_litellm_proxy: bool,
    pub proxy_base: Option<String>,
    /// Additional body parameters merged into every request.
    pub extra_params: Map<String, Value>,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(name)) => vec![name],
        Some(OneOrMany::Many(names)) => names,
        None => Vec::new(),
    })
}
