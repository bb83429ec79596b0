//! Chat dispatch: selection → normalization → request assembly → one
//! upstream call → parsing.
//!
//! [`LlmRouter`] is the `LlmProvider` most callers want. It never fails at
//! the type level; every error comes back as an `LlmResponse` whose
//! `finish_reason` is `"error"`.
//!
//! In direct transport the model name is sent without routing prefixes
//! and without a leading `<provider>/` for the provider being called.
//! Gateways (openrouter, together, vllm) keep vendor segments such as
//! `anthropic/claude-3`, which they need to pick the model.
//!
//! Parameter dropping is per mode, not per model. With no `dropParams`
//! setting and an empty allow-list, Together mode strips `tools`,
//! `tool_choice` and `parallel_tool_calls` for every model, including
//! models that do support tool calling. Add those names to
//! `allowedOpenaiParams` (or set `dropParams: false`) to send them.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::normalize::{normalize, strip_provider_prefix, wire_model, ProviderMode};
use super::parse::parse_completion;
use super::registry::{Credentials, ProviderKind, ProviderRegistry};
use super::selector::select;
use super::transport::{ChatTransport, HttpTransport, OutboundRequest};
use super::types::{ChatMessage, LlmResponse, ToolDefinition};
use super::LlmProvider;
use crate::config::{Config, LlmSettings};
use crate::error::{LlmError, Result};

/// Optional OpenAI parameters that pass untouched when dropping is on.
const STANDARD_OPTIONAL_PARAMS: &[&str] = &[
    "tools",
    "tool_choice",
    "parallel_tool_calls",
    "top_p",
    "stop",
    "seed",
    "n",
    "user",
    "presence_penalty",
    "frequency_penalty",
    "logit_bias",
    "response_format",
];

/// Together rejects tool parameters for many hosted models.
const TOGETHER_UNSUPPORTED_PARAMS: &[&str] = &["tools", "tool_choice", "parallel_tool_calls"];

/// Body keys extra params may not override.
const RESERVED_PARAMS: &[&str] = &["model", "messages", "max_tokens", "temperature"];

/// Everything decided about a request before any I/O happens.
#[derive(Debug, Clone)]
pub struct Route {
    pub provider: ProviderKind,
    pub mode: ProviderMode,
    /// Normalized identifier, routing prefix included.
    pub model: String,
    /// Identifier placed in the request body.
    pub wire_model: String,
    pub temperature: f64,
    pub endpoint: String,
    pub credentials: Credentials,
    /// Chosen by the fallback priority list rather than a keyword.
    pub fallback: bool,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f64,
    #[serde(flatten)]
    params: Map<String, Value>,
}

/// Multi-provider chat dispatcher.
///
/// Holds only read-only state, so one router can serve any number of
/// concurrent requests.
pub struct LlmRouter<T = HttpTransport> {
    registry: Arc<ProviderRegistry>,
    settings: LlmSettings,
    default_model: String,
    transport: T,
}

impl LlmRouter<HttpTransport> {
    /// HTTP-backed router using the config's providers, settings and default model.
    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(
            Arc::new(config.registry()),
            config.llm_settings.clone(),
            &config.agents.defaults.model,
            HttpTransport::new(client),
        )
    }
}

impl<T: ChatTransport> LlmRouter<T> {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        settings: LlmSettings,
        default_model: &str,
        transport: T,
    ) -> Self {
        Self {
            registry,
            settings,
            default_model: default_model.to_string(),
            transport,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Plan a request: pick the provider, detect its mode, normalize the
    /// model name and resolve the endpoint. Pure; no I/O.
    pub fn route(&self, model: Option<&str>, temperature: f64) -> Result<Route> {
        let model = model.unwrap_or(&self.default_model);
        let selection = select(&self.registry, model).ok_or_else(|| LlmError::NotConfigured {
            model: model.to_string(),
        })?;

        let credentials = Credentials::new(selection.kind, selection.config);
        let mode = ProviderMode::detect(&credentials, model);
        let normalized = normalize(model, mode);

        let (endpoint, wire) = if self.settings.use_litellm_proxy {
            let endpoint = match self.settings.proxy_base.as_deref() {
                Some(base) => base.trim_end_matches('/').to_string(),
                None => credentials.endpoint(),
            };
            (endpoint, normalized.model.clone())
        } else {
            let mut wire = wire_model(&normalized.model);
            if mode == ProviderMode::Direct {
                wire = strip_provider_prefix(wire, selection.kind);
            }
            (credentials.endpoint(), wire.to_string())
        };

        Ok(Route {
            provider: selection.kind,
            mode,
            model: normalized.model,
            wire_model: wire,
            temperature: normalized.temperature_override.unwrap_or(temperature),
            endpoint,
            credentials,
            fallback: selection.fallback,
        })
    }

    /// Whether unsupported optional parameters are stripped for `mode`.
    fn drop_params(&self, mode: ProviderMode) -> bool {
        self.settings.drop_params.unwrap_or(
            self.settings.allowed_openai_params.is_empty() && mode == ProviderMode::Together,
        )
    }

    fn is_allowed(&self, param: &str) -> bool {
        self.settings.allowed_openai_params.iter().any(|p| p == param)
    }

    /// Strip optional parameters the upstream would reject, unless allow-listed.
    fn filter_params(&self, route: &Route, optional: Map<String, Value>) -> Map<String, Value> {
        if !self.drop_params(route.mode) {
            return optional;
        }
        let mut kept = Map::new();
        let mut dropped = Vec::new();
        for (name, value) in optional {
            let unsupported = !STANDARD_OPTIONAL_PARAMS.contains(&name.as_str())
                || (route.mode == ProviderMode::Together
                    && TOGETHER_UNSUPPORTED_PARAMS.contains(&name.as_str()));
            if unsupported && !self.is_allowed(&name) {
                dropped.push(name);
            } else {
                kept.insert(name, value);
            }
        }
        if !dropped.is_empty() {
            debug!(provider = %route.provider, ?dropped, "Dropped unsupported parameters");
        }
        kept
    }

    /// Assemble the outbound request for `route`.
    pub fn build_request(
        &self,
        route: &Route,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<OutboundRequest> {
        let mut optional = Map::new();
        if !tools.is_empty() {
            let tools = serde_json::to_value(tools).map_err(|e| LlmError::Request(e.to_string()))?;
            optional.insert("tools".into(), tools);
            optional.insert("tool_choice".into(), Value::String("auto".into()));
        }
        for (name, value) in &self.settings.extra_params {
            if !RESERVED_PARAMS.contains(&name.as_str()) {
                optional.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }

        let params = if self.settings.use_litellm_proxy {
            let mut params = optional;
            if let Some(drop) = self.settings.drop_params {
                params.insert("drop_params".into(), Value::Bool(drop));
            }
            if !self.settings.allowed_openai_params.is_empty() {
                params.insert(
                    "allowed_openai_params".into(),
                    Value::from(self.settings.allowed_openai_params.clone()),
                );
            }
            params
        } else {
            self.filter_params(route, optional)
        };

        let body = CompletionRequest {
            model: &route.wire_model,
            messages,
            max_tokens,
            temperature: route.temperature,
            params,
        };
        let body = serde_json::to_value(&body).map_err(|e| LlmError::Request(e.to_string()))?;

        Ok(OutboundRequest {
            credentials: route.credentials.clone(),
            endpoint: route.endpoint.clone(),
            body,
        })
    }

    /// Same as [`LlmProvider::chat`] but with the failure kept as an error.
    pub async fn try_chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<LlmResponse> {
        let route = self.route(model, temperature)?;
        let request = self.build_request(&route, messages, tools, max_tokens)?;

        info!(
            provider = %route.provider,
            mode = route.mode.as_str(),
            model = %route.model,
            msg_count = messages.len(),
            tools = tools.len(),
            "Dispatching chat completion"
        );

        let body = self.transport.complete(request).await?;
        parse_completion(&body)
    }
}

#[async_trait]
impl<T: ChatTransport> LlmProvider for LlmRouter<T> {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f64,
    ) -> LlmResponse {
        match self.try_chat(messages, tools, model, max_tokens, temperature).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, auth = e.is_auth(), "LLM call failed");
                LlmResponse::error(e)
            }
        }
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
