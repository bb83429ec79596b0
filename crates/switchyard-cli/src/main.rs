//! switchyard CLI: chat through the router, inspect routing decisions.
//!
//! Usage:
//!   switchyard chat [PROMPT]   — One-shot prompt, or an interactive session
//!   switchyard route MODEL     — Show where a model would be sent
//!   switchyard onboard         — Create a default configuration
//!   switchyard status          — Show configured providers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use switchyard_core::config::Config;
use switchyard_core::provider::types::Role;
use switchyard_core::provider::{
    ChatMessage, LlmProvider, LlmResponse, LlmRouter, ProviderKind, ToolDefinition,
};

#[derive(Parser)]
#[command(
    name = "switchyard",
    version,
    about = "Route chat completions across LLM providers",
    long_about = "switchyard picks a provider for each model name, rewrites the name the way that \
                  provider expects and speaks the OpenAI chat-completions protocol to it."
)]
struct Cli {
    /// Config file (default: ~/.switchyard/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt, or start an interactive session when none is given
    Chat {
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt prepended to the conversation
        #[arg(short, long)]
        system: Option<String>,

        /// JSON file with an array of tool definitions
        #[arg(long)]
        tools: Option<PathBuf>,

        /// Prompt for a one-shot request
        prompt: Option<String>,
    },

    /// Show the routing decision for a model without calling it
    Route {
        model: String,

        /// Requested temperature
        #[arg(short, long)]
        temperature: Option<f64>,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Some(Commands::Chat {
            model,
            system,
            tools,
            prompt,
        }) => {
            let config = load_config(&config_path)?;
            let tools = match tools {
                Some(path) => load_tools(&path)?,
                None => Vec::new(),
            };
            cmd_chat(&config, model.as_deref(), system.as_deref(), &tools, prompt.as_deref()).await?
        }
        Some(Commands::Route { model, temperature }) => cmd_route(&config_path, &model, temperature)?,
        Some(Commands::Onboard) => cmd_onboard(&config_path)?,
        Some(Commands::Status) => cmd_status(&config_path)?,
        None => {
            let config = load_config(&config_path)?;
            cmd_chat(&config, None, None, &[], None).await?
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("failed to load {}", path.display()))
}

fn load_tools(path: &Path) -> Result<Vec<ToolDefinition>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tools file {}", path.display()))?;
    let tools: Vec<ToolDefinition> = serde_json::from_str(&content)
        .with_context(|| format!("invalid tool definitions in {}", path.display()))?;
    debug!(count = tools.len(), "Loaded tool definitions");
    Ok(tools)
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(
    config: &Config,
    model_override: Option<&str>,
    system: Option<&str>,
    tools: &[ToolDefinition],
    prompt: Option<&str>,
) -> Result<()> {
    let router = LlmRouter::from_config(config, reqwest::Client::new());
    let model = model_override.unwrap_or(router.default_model()).to_string();
    let defaults = &config.agents.defaults;

    let mut history: Vec<ChatMessage> = system.map(ChatMessage::system).into_iter().collect();

    if let Some(prompt) = prompt {
        history.push(ChatMessage::user(prompt));
        let response = router
            .chat(&history, tools, Some(&model), defaults.max_tokens, defaults.temperature)
            .await;
        print_response(&response);
        if response.is_error() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let route = router.route(Some(&model), defaults.temperature);

    // Print header
    println!();
    println!("  🔀 switchyard v{}", env!("CARGO_PKG_VERSION"));
    match &route {
        Ok(route) => println!("  Provider: {} ({}) | Model: {}", route.provider, route.mode.as_str(), route.model),
        Err(e) => println!("  ⚠️  {e}"),
    }
    if !tools.is_empty() {
        println!("  {} tools loaded", tools.len());
    }
    println!();
    println!("  Type your message, /clear to reset, or /quit to exit.");
    println!("  ─────────────────────────────────────");
    println!();

    // Interactive loop
    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye! 👋");
                break;
            }
            "/clear" => {
                history.retain(|m| m.role == Role::System);
                println!("  Conversation cleared.");
                continue;
            }
            _ => {}
        }

        history.push(ChatMessage::user(input));
        println!();
        let response = router
            .chat(&history, tools, Some(&model), defaults.max_tokens, defaults.temperature)
            .await;
        print_response(&response);

        if response.is_error() {
            history.pop();
        } else if response.has_tool_calls() {
            // Tools are only shown, never run here.
            history.push(ChatMessage::assistant_with_tool_calls(&response.tool_calls));
            for call in &response.tool_calls {
                history.push(ChatMessage::tool_result(&call.id, &call.name, "not executed"));
            }
        } else {
            history.push(ChatMessage::assistant(response.content.as_deref().unwrap_or_default()));
        }
    }

    Ok(())
}

fn print_response(response: &LlmResponse) {
    if response.is_error() {
        eprintln!("  \x1b[31m{}\x1b[0m\n", response.content.as_deref().unwrap_or_default());
        return;
    }

    for call in &response.tool_calls {
        println!(
            "  🔧 {} [{}] {}",
            call.name,
            call.id,
            serde_json::Value::Object(call.arguments.clone())
        );
    }
    if let Some(content) = &response.content {
        println!("  \x1b[32m{}\x1b[0m", content);
    }
    if let Some(usage) = response.usage {
        println!(
            "  \x1b[2m{} prompt + {} completion = {} tokens ({})\x1b[0m",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens, response.finish_reason
        );
    }
    println!();
}

// ── Route Command ───────────────────────────────────────────────────

fn cmd_route(config_path: &Path, model: &str, temperature: Option<f64>) -> Result<()> {
    let config = load_config(config_path)?;
    let router = LlmRouter::from_config(&config, reqwest::Client::new());
    let requested = temperature.unwrap_or(config.agents.defaults.temperature);
    let route = router.route(Some(model), requested)?;

    println!();
    println!("  Model:       {}", model);
    println!(
        "  Provider:    {}{}",
        route.provider,
        if route.fallback { " (fallback)" } else { "" }
    );
    println!("  Mode:        {}", route.mode.as_str());
    println!("  Routed as:   {}", route.model);
    println!("  Sent as:     {}", route.wire_model);
    println!("  Endpoint:    {}", route.endpoint);
    if route.temperature != requested {
        println!("  Temperature: {} (forced, requested {})", route.temperature, requested);
    } else {
        println!("  Temperature: {}", route.temperature);
    }
    println!();
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard(path: &Path) -> Result<()> {
    Config::write_default_template(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Edit the config file and add your API key");
    println!("  2. Run `switchyard route <model>` to check where it goes");
    println!("  3. Run `switchyard chat` to start chatting");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!();
    println!("  🔀 switchyard status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:    {}", config_path.display());
    } else {
        println!("  Config:    ❌ Not found (run `switchyard onboard`)");
    }

    let registry = config.registry();
    let configured = registry.configured();
    if configured.is_empty() {
        println!("  Providers: ❌ No provider configured");
    } else {
        for kind in ProviderKind::ALL {
            let Some(entry) = registry.get(kind) else {
                continue;
            };
            let base = entry.api_base.as_deref().unwrap_or(kind.default_endpoint());
            let mark = if entry.has_key() { "✅" } else { "⚠️  no key" };
            println!("  {:<10} {} {}", kind.as_str(), mark, base);
        }
    }

    println!("  Model:     {}", config.agents.defaults.model);
    match config.provider_for(None) {
        Some((kind, _)) => println!("  Routes to: {}", kind),
        None => println!("  Routes to: ❌ nothing (no usable key)"),
    }

    let settings = &config.llm_settings;
    if settings.use_litellm_proxy {
        println!(
            "  Proxy:     {}",
            settings.proxy_base.as_deref().unwrap_or("provider endpoint")
        );
    }
    if !settings.allowed_openai_params.is_empty() {
        println!("  Allowed:   {}", settings.allowed_openai_params.join(", "));
    }

    println!();
    Ok(())
}
