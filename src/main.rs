//! WolfHA - LAN Master Election Daemon
//!
//! Elects a single master among the nodes on a broadcast segment and keeps
//! a live membership view, announcing role changes and joins/departures.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfha::api::HttpServer;
use wolfha::cluster::{ClusterManager, ClusterOptions};
use wolfha::config::{WolfHaConfig, DEFAULT_CONFIG_PATH};
use wolfha::error::Result;
use wolfha::network::{lan_interface, UdpTransport};
use wolfha::state::ClusterEvent;

/// Exit status used when a master conflict requires the process to stop
const CONFLICT_EXIT_CODE: i32 = 2;

/// WolfHA - LAN Master Election Daemon
#[derive(Parser)]
#[command(name = "wolfha")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WolfHA node
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,

        /// Node hostname (defaults to the system hostname at runtime)
        #[arg(long)]
        hostname: Option<String>,

        /// Never become master
        #[arg(long)]
        ineligible: bool,
    },

    /// Validate configuration file
    Validate,

    /// Show node information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            let config = WolfHaConfig::from_file(&cli.config).map_err(|e| {
                eprintln!("Failed to load configuration from {:?}: {}", cli.config, e);
                e
            })?;
            init_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));
            run_start(config).await
        }
        Commands::Init {
            output,
            hostname,
            ineligible,
        } => run_init(output, hostname, ineligible),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve the advertised address and the broadcast destination
fn resolve_addresses(config: &WolfHaConfig) -> Result<(String, Ipv4Addr)> {
    let lan = lan_interface();
    match &lan {
        Some(iface) => tracing::info!(
            "Using interface {} ({}/{})",
            iface.name,
            iface.address,
            iface.netmask
        ),
        None => tracing::warn!("No LAN interface found, falling back to loopback/limited broadcast"),
    }

    let address = config
        .node
        .address
        .clone()
        .or_else(|| lan.as_ref().map(|iface| iface.address.to_string()))
        .unwrap_or_else(|| Ipv4Addr::LOCALHOST.to_string());

    let broadcast = match config.broadcast_ip()? {
        Some(ip) => ip,
        None => lan
            .as_ref()
            .map(|iface| iface.broadcast())
            .unwrap_or(Ipv4Addr::BROADCAST),
    };

    Ok((address, broadcast))
}

/// Start the WolfHA node
async fn run_start(config: WolfHaConfig) -> Result<()> {
    tracing::info!("Starting WolfHA node...");

    let (address, broadcast) = resolve_addresses(&config)?;
    let options = ClusterOptions::from_config(&config, address)?;

    let transport = match UdpTransport::bind(config.cluster.comm_port, broadcast).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!("Cannot bind cluster port {}: {}", config.cluster.comm_port, e);
            return Err(e);
        }
    };

    tracing::info!(
        "Node {} advertising {} on port {} (broadcast {})",
        options.hostname,
        options.address,
        config.cluster.comm_port,
        broadcast
    );

    let manager = Arc::new(ClusterManager::new(options, transport.clone()));

    // Log every notification; a deployment hooks its own actions here
    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClusterEvent::AddServer(node)) => {
                    tracing::info!("Server added: {} ({})", node.hostname, node.address)
                }
                Ok(ClusterEvent::DeleteServer(node)) => {
                    tracing::info!("Server removed: {} ({})", node.hostname, node.address)
                }
                Ok(event) => tracing::info!("Role event: {}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Event logger lagged, {} events skipped", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let listener = transport.spawn_listener(manager.clone(), manager.shutdown_signal());
    let (ticks, tocks) = manager.start();

    let http_server = HttpServer::new(config.api.clone(), Arc::clone(&manager));
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http_server.start().await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    let mut exit = manager.exit_signal();
    let conflict_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            false
        }
        _ = exit.wait_for(|requested| *requested) => {
            tracing::error!("Exiting because a higher priority master is active");
            true
        }
    };

    manager.shutdown().await;

    for handle in [listener, ticks, tocks, http_handle] {
        if let Err(e) = handle.await {
            tracing::warn!("Task ended abnormally: {}", e);
        }
    }

    tracing::info!("WolfHA shutdown complete");

    if conflict_exit {
        std::process::exit(CONFLICT_EXIT_CODE);
    }
    Ok(())
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, hostname: Option<String>, ineligible: bool) -> Result<()> {
    let hostname_line = match hostname {
        Some(name) => format!("hostname = \"{}\"", name),
        None => "# hostname = \"db1\"".to_string(),
    };

    let config_content = format!(
        r#"# WolfHA Configuration
# Generated configuration file

[node]
{hostname_line}
# address = "192.168.1.10"
eligible = {eligible}
# data = {{ vip = "192.168.1.100" }}

[cluster]
comm_port = 3014
heartbeat_freq = 20
check_beats = 3
exit_on_conflict = false
# broadcast_ip = "192.168.1.255"
max_data_bytes = 8192

[api]
enabled = true
bind_address = "127.0.0.1:3015"

[logging]
level = "info"
"#,
        eligible = !ineligible
    );

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file to configure your node.");
    println!("Then start with: wolfha --config {} start", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WolfHaConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Hostname: {}", config.hostname()?);
            println!("  Eligible: {}", config.node.eligible);
            println!("  Port: {}", config.cluster.comm_port);
            println!(
                "  Tick/Tock: {}s / {}s",
                config.heartbeat_interval().as_secs(),
                config.tock_interval().as_secs()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show node information
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = WolfHaConfig::from_file(&config_path)?;
    let lan = lan_interface();

    println!("WolfHA Node Information");
    println!("=======================");
    println!();
    println!("Hostname:         {}", config.hostname()?);
    println!(
        "Address:          {}",
        config
            .node
            .address
            .clone()
            .or_else(|| lan.as_ref().map(|i| i.address.to_string()))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!("Eligible:         {}", config.node.eligible);
    println!("Data:             {}", config.initial_data()?.as_str());
    println!();
    println!("Network:");
    match &lan {
        Some(iface) => println!("  Interface:      {} ({}/{})", iface.name, iface.address, iface.netmask),
        None => println!("  Interface:      (none)"),
    }
    println!(
        "  Broadcast:      {}",
        config
            .broadcast_ip()?
            .or_else(|| lan.as_ref().map(|i| i.broadcast()))
            .unwrap_or(Ipv4Addr::BROADCAST)
    );
    println!("  Port:           {}", config.cluster.comm_port);
    println!();
    println!("Election:");
    println!("  Heartbeat:      {} s", config.cluster.heartbeat_freq);
    println!("  Check Beats:    {}", config.cluster.check_beats);
    println!("  Stale After:    {} s", config.tock_interval().as_secs());
    println!("  On Conflict:    {}", if config.cluster.exit_on_conflict { "exit" } else { "relinquish" });
    println!();
    println!("API:");
    println!("  Enabled:        {}", config.api.enabled);
    println!("  Bind Address:   {}", config.api.bind_address);

    Ok(())
}
