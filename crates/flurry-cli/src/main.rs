//! # Flurry Broker Entry Point
//!
//! Starts the rendezvous broker that pairs censored clients with volunteer
//! WebRTC proxies for a single signaling exchange.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:8080, 30s proxy budget, 10s client budget)
//! flurry
//!
//! # Custom bind address and budgets
//! flurry -b 127.0.0.1:9090 --proxy-timeout 60 --client-timeout 20
//! ```
//!
//! Set `RUST_LOG` to adjust log verbosity (defaults to `info`).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;

use flurry_broker::{BrokerConfig, BrokerContext};
use flurry_server::BrokerServer;

/// Parses a bind address string into a socket address.
///
/// # Arguments
///
/// * `bind` - The address string to parse (e.g., "0.0.0.0:8080")
///
/// # Returns
///
/// `Ok(SocketAddr)` if the address is valid, `Err` otherwise
///
/// # Errors
///
/// Returns an error if the string is not a valid `host:port` socket address
fn parse_bind_addr(bind: &str) -> Result<SocketAddr> {
    bind.parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}: {}", bind, e))
}

/// flurry - rendezvous broker for snowflake proxies
#[derive(FromArgs)]
struct Cli {
    /// address to bind the broker's HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// seconds a polling proxy waits for a client offer
    #[argh(option, long = "proxy-timeout", default = "30")]
    proxy_timeout_secs: u64,

    /// seconds a matched client waits for the proxy's answer
    #[argh(option, long = "client-timeout", default = "10")]
    client_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level to INFO, but allow RUST_LOG to override.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    run_broker(cli).await
}

/// Runs the broker with the parsed arguments.
///
/// This function:
/// 1. Validates the bind address
/// 2. Builds the timeout configuration from the CLI budgets
/// 3. Starts the broker context and serves HTTP until shutdown
///
/// # Arguments
///
/// * `cli` - Parsed command-line arguments
///
/// # Errors
///
/// Returns an error if:
/// - The bind address is invalid
/// - The server fails to bind or serve
async fn run_broker(cli: Cli) -> Result<()> {
    let addr = parse_bind_addr(&cli.bind)?;

    let config = BrokerConfig {
        proxy_timeout: Duration::from_secs(cli.proxy_timeout_secs),
        client_timeout: Duration::from_secs(cli.client_timeout_secs),
    };

    tracing::info!(
        "starting flurry broker (proxy budget {}s, client budget {}s)",
        cli.proxy_timeout_secs,
        cli.client_timeout_secs
    );

    let ctx = BrokerContext::new(config);
    let server = BrokerServer::new(ctx);
    server.run(addr).await?;

    Ok(())
}
