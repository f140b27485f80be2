//! WolfHACtl - Command line tool for inspecting a WolfHA node
//!
//! Usage:
//!   wolfhactl status              - Show local node role and leader
//!   wolfhactl list servers        - Show every known node
//!   wolfhactl data get            - Print the local node's data
//!   wolfhactl data set '<json>'   - Replace the local node's data
//!   wolfhactl lock <hostname>     - Exempt a node from pruning

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use wolfha::config::{WolfHaConfig, DEFAULT_CONFIG_PATH};

/// WolfHA Cluster Control Tool
#[derive(Parser)]
#[command(name = "wolfhactl")]
#[command(about = "Inspect and manage a WolfHA node", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// API endpoint to connect to (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show status of the local node
    Status,
    /// List cluster servers
    List {
        #[command(subcommand)]
        what: ListSubcommand,
    },
    /// Read or replace the local node's broadcast data
    Data {
        #[command(subcommand)]
        action: DataSubcommand,
    },
    /// Keep a node in the membership view even when it goes silent
    Lock {
        hostname: String,
    },
    /// Allow a locked node to be pruned again
    Unlock {
        hostname: String,
    },
    /// Check configuration file for errors
    CheckConfig {
        /// Path to config file to check (defaults to --config path)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ListSubcommand {
    /// Show all known servers
    Servers,
}

#[derive(Subcommand)]
enum DataSubcommand {
    /// Print the current data
    Get,
    /// Replace the data with a JSON document
    Set {
        json: String,
    },
}

// ============ API Response Types ============

#[derive(Debug, Deserialize)]
struct StatusResponse {
    hostname: String,
    role: String,
    #[serde(default)]
    eligible: bool,
    #[serde(default)]
    leader: Option<String>,
    #[serde(default)]
    uptime_seconds: u64,
    #[serde(default)]
    members: Vec<NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    hostname: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    is_master: bool,
    #[serde(default)]
    is_eligible: bool,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    uptime_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

// ============ Main ============

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let endpoint = cli
        .endpoint
        .clone()
        .unwrap_or_else(|| endpoint_from_config(&cli.config));
    let client = reqwest::Client::new();

    let result = match &cli.command {
        Commands::Status => show_status(&client, &endpoint).await,
        Commands::List { what } => match what {
            ListSubcommand::Servers => list_servers(&client, &endpoint).await,
        },
        Commands::Data { action } => match action {
            DataSubcommand::Get => get_data(&client, &endpoint).await,
            DataSubcommand::Set { json } => set_data(&client, &endpoint, json).await,
        },
        Commands::Lock { hostname } => set_lock(&client, &endpoint, hostname, true).await,
        Commands::Unlock { hostname } => set_lock(&client, &endpoint, hostname, false).await,
        Commands::CheckConfig { file } => check_config(file.as_deref().unwrap_or(&cli.config)),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// API base URL derived from the config file, or the default local address
fn endpoint_from_config(path: &Path) -> String {
    let bind = WolfHaConfig::from_file(path)
        .map(|config| config.api.bind_address)
        .unwrap_or_else(|_| "127.0.0.1:3015".to_string());

    // A wildcard bind is reachable on loopback
    match bind.strip_prefix("0.0.0.0:") {
        Some(port) => format!("http://127.0.0.1:{}", port),
        None => format!("http://{}", bind),
    }
}

async fn check_response(response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match response.json::<ErrorResponse>().await {
        Ok(body) => bail!("API error ({}): {}", status, body.error),
        Err(_) => bail!("API error: {}", status),
    }
}

// ============ Commands ============

async fn show_status(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let response = client
        .get(format!("{}/status", endpoint))
        .send()
        .await
        .with_context(|| format!("cannot reach {}", endpoint))?;
    let status: StatusResponse = check_response(response).await?.json().await?;

    println!();
    println!("Node Status");
    println!("===========");
    println!();
    println!("Hostname:     {}", status.hostname);
    println!("Role:         {}", status.role.to_uppercase());
    println!("Eligible:     {}", status.eligible);
    println!("Master:       {}", status.leader.as_deref().unwrap_or("NONE"));
    println!("Cluster Size: {}", status.members.len());
    println!("Uptime:       {}s", status.uptime_seconds);
    println!();

    Ok(())
}

async fn list_servers(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let response = client
        .get(format!("{}/cluster/nodes", endpoint))
        .send()
        .await
        .with_context(|| format!("cannot reach {}", endpoint))?;
    let nodes: Vec<NodeInfo> = check_response(response).await?.json().await?;

    println!();
    println!("WolfHA Cluster (wolfhactl v{})", env!("CARGO_PKG_VERSION"));
    println!("==============================");
    println!();

    println!(
        "{:<24} {:<18} {:<10} {:<10} {:<10}",
        "HOSTNAME", "ADDRESS", "ROLE", "ELIGIBLE", "UPTIME"
    );
    println!("{}", "-".repeat(76));

    for node in &nodes {
        // Pad before adding color codes
        let role_padded = format!("{:<10}", if node.is_master { "MASTER" } else { "-" });
        let role = if node.is_master {
            format!("\x1b[1;34m{}\x1b[0m", role_padded)
        } else {
            role_padded
        };

        let mut name = node.hostname.clone();
        if node.is_self {
            name.push_str(" *");
        }
        if node.locked {
            name.push_str(" [locked]");
        }

        println!(
            "{:<24} {:<18} {} {:<10} {:<10}",
            name,
            node.address,
            role,
            if node.is_eligible { "yes" } else { "no" },
            format!("{}s", node.uptime_seconds)
        );
    }
    println!();

    Ok(())
}

async fn get_data(client: &reqwest::Client, endpoint: &str) -> anyhow::Result<()> {
    let response = client
        .get(format!("{}/data", endpoint))
        .send()
        .await
        .with_context(|| format!("cannot reach {}", endpoint))?;
    let data: serde_json::Value = check_response(response).await?.json().await?;

    println!("{}", serde_json::to_string_pretty(&data)?);
    Ok(())
}

async fn set_data(client: &reqwest::Client, endpoint: &str, json: &str) -> anyhow::Result<()> {
    let value: serde_json::Value = serde_json::from_str(json).context("data is not valid JSON")?;

    let response = client
        .put(format!("{}/data", endpoint))
        .json(&value)
        .send()
        .await
        .with_context(|| format!("cannot reach {}", endpoint))?;
    check_response(response).await?;

    println!("\x1b[1;32m✓\x1b[0m Data updated; it will be sent with the next heartbeat");
    Ok(())
}

async fn set_lock(
    client: &reqwest::Client,
    endpoint: &str,
    hostname: &str,
    locked: bool,
) -> anyhow::Result<()> {
    let action = if locked { "lock" } else { "unlock" };
    let response = client
        .post(node_url(endpoint, hostname, action)?)
        .send()
        .await
        .with_context(|| format!("cannot reach {}", endpoint))?;
    check_response(response).await?;

    println!("\x1b[1;32m✓\x1b[0m {} {}ed", hostname, action);
    Ok(())
}

/// `/cluster/nodes/<hostname>/<action>` with the hostname percent-encoded
fn node_url(endpoint: &str, hostname: &str, action: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(endpoint)
        .with_context(|| format!("invalid endpoint {}", endpoint))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("endpoint {} cannot carry a path", endpoint))?
        .pop_if_empty()
        .extend(["cluster", "nodes", hostname, action]);
    Ok(url)
}

fn check_config(path: &Path) -> anyhow::Result<()> {
    println!();
    println!("WolfHA Configuration Check");
    println!("==========================");
    println!();

    if !path.exists() {
        bail!("config file not found: {}", path.display());
    }
    println!("\x1b[1;32m✓\x1b[0m Config file: {}", path.display());

    let config = WolfHaConfig::from_file(path).context("configuration is invalid")?;
    println!("\x1b[1;32m✓\x1b[0m Configuration is valid");
    println!("  Hostname:   {}", config.hostname()?);
    println!("  Eligible:   {}", config.node.eligible);
    println!(
        "  Tick/Tock:  {}s / {}s",
        config.heartbeat_interval().as_secs(),
        config.tock_interval().as_secs()
    );

    if config.node.address.is_none() {
        println!("\x1b[1;33m⚠\x1b[0m  [node] address not set, the LAN interface address will be used");
    }
    if config.cluster.exit_on_conflict {
        println!("\x1b[1;33m⚠\x1b[0m  exit_on_conflict is set; the process exits if a higher priority master appears");
    }
    println!();

    Ok(())
}
