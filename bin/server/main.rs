//! NIM Proxy Server
//!
//! Runs the OpenAI-compatible chat completions proxy in front of NVIDIA NIM.

use anyhow::Result;
use clap::Parser;
use nim_proxy::config::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS, NOT_CONFIGURED};
use nim_proxy::ProxyConfig;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nim-proxy")]
#[command(about = "OpenAI-compatible chat completions proxy for NVIDIA NIM")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "5000", env = "PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// NVIDIA NIM API key
    #[arg(long, default_value = NOT_CONFIGURED, env = "NIM_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Upstream API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "NIM_BASE_URL")]
    base_url: String,

    /// Upstream timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "NIM_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// Model used when a request does not name one
    #[arg(long, default_value = DEFAULT_MODEL, env = "NIM_DEFAULT_MODEL")]
    default_model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nim_proxy=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = ProxyConfig::new(args.api_key, args.base_url)
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_default_model(args.default_model);

    info!("Starting server on port {}", args.port);
    info!("API Key configured: {}", config.has_api_key());

    nim_proxy::run_server(config, &args.host, args.port).await
}
