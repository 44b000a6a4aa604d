// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tsk::config::Settings;
use tsk::constants::TOKIO_WORKER_THREADS;
use tsk::stack::{get_stack, Stack};

/// Deploy a Tailscale DNS forwarder into Kubernetes.
#[derive(Parser, Debug)]
#[command(name = "tsk", author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Directory holding stack state [default: $HOME/.tsk]
    #[arg(long, global = true, env = "TSK_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Tailscale ephemeral auth key used by the node to join the tailnet
    #[arg(
        long,
        global = true,
        env = "TSK_EPHEMERAL_KEY",
        hide_env_values = true,
        default_value = ""
    )]
    ephemeral_key: String,

    /// Tailscale API key
    #[arg(long, global = true, env = "TSK_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Tailnet name, e.g. example.ts.net
    #[arg(short = 'N', long, global = true, env = "TSK_TAILNET", default_value = "")]
    tailnet: String,

    /// Hostname the node registers under
    #[arg(short = 'H', long, global = true, env = "TSK_HOSTNAME", default_value = "")]
    hostname: String,

    /// Kubernetes username owning the node [default: $USER]
    #[arg(short = 'u', long, global = true, env = "TSK_USERNAME")]
    username: Option<String>,

    /// Kubernetes namespace to deploy into
    #[arg(short = 'n', long, global = true, env = "TSK_NAMESPACE", default_value = "default")]
    namespace: String,

    /// Kubernetes service CIDR advertised to the tailnet
    #[arg(long = "cidr", global = true, env = "TSK_CIDR", default_value = "")]
    service_cidr: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Deploy the node and configure tailnet DNS
    Up,
    /// Show what `up` would change
    Plan {
        /// List changed fields per resource
        #[arg(short, long)]
        verbose: bool,
    },
    /// Resync recorded state with the cluster and tailnet
    Refresh,
    /// Remove the node and its tailnet DNS settings
    Down,
    /// Print the recorded stack state
    Stack,
}

impl GlobalArgs {
    fn into_settings(self) -> Settings {
        let storage_dir = self.storage_dir.unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".tsk")
        });
        let username = self
            .username
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_default();

        Settings {
            storage_dir,
            ephemeral_key: self.ephemeral_key,
            api_key: self.api_key,
            tailnet: self.tailnet,
            hostname: self.hostname,
            username,
            namespace: self.namespace,
            service_cidr: self.service_cidr,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("tsk")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_tracing() {
    // RUST_LOG selects the level (default info), RUST_LOG_FORMAT=json switches to JSON output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_tracing();
    debug!(command = ?cli.command, "Logging initialized");

    let config = cli.global.into_settings().validate()?;
    let stack = get_stack(&config).await?;

    tokio::select! {
        result = run_command(&stack, &cli.command) => {
            if let Err(e) = &result {
                error!("{} failed: {e:#}", command_name(&cli.command));
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Received Ctrl+C, aborting; state is recorded up to the last realized resource");
            anyhow::bail!("interrupted")
        }
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Up => "up",
        Command::Plan { .. } => "plan",
        Command::Refresh => "refresh",
        Command::Down => "down",
        Command::Stack => "stack",
    }
}

async fn run_command(stack: &Stack, command: &Command) -> Result<()> {
    match command {
        Command::Up => {
            let result = stack.up().await?;
            info!(summary = %result.summary, "Node deployed");
            if result.dns_configured() {
                println!("Your tailscale node is up and tailnet DNS is configured.");
            } else {
                println!(
                    "Your tailscale node has been deployed, but DNS isn't set up yet. \
                     Try running 'tsk up' again."
                );
            }
        }
        Command::Plan { verbose } => {
            let plan = stack.preview(*verbose).await?;
            println!("{plan}");
        }
        Command::Refresh => {
            let summary = stack.refresh().await?;
            println!("Refresh complete: {summary}");
        }
        Command::Down => {
            let summary = stack.destroy().await?;
            println!("Node removed: {summary}");
        }
        Command::Stack => {
            let state = stack.export().await?;
            println!("{}", state.to_pretty_json()?);
        }
    }
    Ok(())
}
