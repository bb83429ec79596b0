//! switchyard-core: multi-provider LLM routing.
//!
//! One chat interface in front of many OpenAI-compatible upstreams:
//!
//! - [`config`] — Typed configuration loading from JSON plus environment overrides
//! - [`provider`] — Provider selection, model normalization, transport and parsing
//! - [`error`] — Error type shared by the routing stages
//!
//! # Quick Start
//!
//! ```no_run
//! use switchyard_core::config::Config;
//! use switchyard_core::provider::{ChatMessage, LlmProvider, LlmRouter};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let router = LlmRouter::from_config(&config, reqwest::Client::new());
//!
//! let messages = [ChatMessage::user("What is the capital of France?")];
//! let response = router.chat(&messages, &[], Some("qwen-max"), 1024, 0.7).await;
//! if response.is_error() {
//!     eprintln!("{}", response.content.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod provider;
