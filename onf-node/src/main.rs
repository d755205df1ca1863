//! onf-node: drive an OnFinality node toward a declared configuration.
//!
//! The binary keeps one node in a local state file and:
//! - creates it when the state file is empty
//! - refreshes it from the control plane before every change
//! - applies changes one at a time, waiting for each to settle
//! - imports existing nodes by `<workspace_id>:<node_id>`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use onf_node::clients::http::DEFAULT_ENDPOINT;
use onf_node::host::load_config;
use onf_node::{ClientConfig, HttpNodeClient, NodeHost, NodeKey, NodeReconciler, Waiter};

/// OnFinality node reconciler
#[derive(Parser, Debug)]
#[command(name = "onf-node", version, about)]
struct Args {
    /// API endpoint
    #[arg(long, env = "ONF_API_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    api_endpoint: String,

    /// API access key
    #[arg(long, env = "ONF_ACCESS_KEY")]
    access_key: String,

    /// API secret key
    #[arg(long, env = "ONF_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    /// Seconds between status polls while waiting for a change to settle
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u64).range(1..=86400))]
    poll_interval_secs: u64,

    /// Give up waiting for a change after this many seconds
    #[arg(long, default_value = "1800", value_parser = clap::value_parser!(u64).range(1..))]
    wait_timeout_secs: u64,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout_secs: u64,

    /// State file tracking the managed node
    #[arg(long, default_value = "onf-node.state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update the node to match a JSON config file
    Apply {
        /// Node config file
        #[arg(long)]
        config: PathBuf,
    },
    /// Re-read the tracked node from the API
    Refresh,
    /// Track an existing node, given as <workspace_id>:<node_id>
    Import { key: NodeKey },
    /// Terminate the tracked node
    Destroy,
    /// Print the tracked node
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onf_node=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("API endpoint: {}", args.api_endpoint);

    let mut config = ClientConfig::new(&args.api_endpoint, &args.access_key, &args.secret_key);
    config.request_timeout = Duration::from_secs(args.request_timeout_secs);
    let client = Arc::new(HttpNodeClient::new(config).context("Failed to build API client")?);

    // Ctrl-C aborts any wait in progress
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling wait");
            signal_token.cancel();
        }
    });

    let waiter = Waiter::new(Duration::from_secs(args.poll_interval_secs))
        .with_timeout(Duration::from_secs(args.wait_timeout_secs))
        .with_cancellation(cancel);

    let host = NodeHost::new(NodeReconciler::new(client, waiter), args.state);

    match args.command {
        Command::Apply { config } => {
            let desired = load_config(&config).await?;
            let state = host.apply(&desired).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Refresh => match host.refresh().await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => info!("No node tracked"),
        },
        Command::Import { key } => {
            let state = host.import(key).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Destroy => {
            if let Some(key) = host.destroy().await? {
                println!("{key}");
            }
        }
        Command::Show => match host.current().await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => info!("No node tracked in {}", host.state_path().display()),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["onf-node", "--access-key", "a", "--secret-key", "s"];
        argv.extend_from_slice(extra);
        argv.push("show");
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_wait_defaults() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.poll_interval_secs, 3);
        assert_eq!(args.wait_timeout_secs, 1800);
    }

    #[test]
    fn test_rejects_zero_durations() {
        assert!(parse(&["--poll-interval-secs", "0"]).is_err());
        assert!(parse(&["--wait-timeout-secs", "0"]).is_err());
        assert!(parse(&["--poll-interval-secs", "86401"]).is_err());
        assert_eq!(
            parse(&["--wait-timeout-secs", "60"]).unwrap().wait_timeout_secs,
            60
        );
    }
}
