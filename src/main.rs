use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use gig_escrow::cli::{parse_command_line, InteractiveCommand, HELP};
use gig_escrow::config::{ClientConfig, DEFAULT_CONFIG_PATH};
use gig_escrow::controller::{ConnectionState, ControlFlow, ControllerRuntime, JobForm, Message};
use gig_escrow::provider::{JsonRpcWalletProvider, WalletProvider};
use gig_escrow::telemetry;

#[derive(Parser)]
#[command(author, version, about = "Client for the Solidity Gigs job escrow")]
struct Cli {
    /// Client configuration file; built-in defaults are used when it is missing
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default client configuration file
    GenerateConfig {
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        path: PathBuf,
    },
    /// Connect the wallet and show one escrow job
    Lookup { job_id: String },
    /// Connect the wallet and create an escrow job
    Create {
        /// Developer address that receives the payment
        #[arg(long)]
        dev: String,
        /// Deadline as YYYY-MM-DDTHH:MM in the configured offset, or RFC 3339
        #[arg(long)]
        deadline: String,
        /// Deposit in display units, e.g. 0.5
        #[arg(long)]
        amount: String,
    },
    /// Read commands from stdin and render the view after every update
    Interactive,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { path } = &cli.command {
        return generate_config(path);
    }

    let config = ClientConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    telemetry::init_logging(&config.logging)?;

    match cli.command {
        Commands::GenerateConfig { .. } => Ok(()),
        Commands::Lookup { job_id } => {
            one_shot(&config, Message::LookupRequested { job_id }).await
        }
        Commands::Create {
            dev,
            deadline,
            amount,
        } => {
            let form = JobForm {
                dev_address: dev,
                deadline,
                amount,
            };
            one_shot(&config, Message::CreateRequested(form)).await
        }
        Commands::Interactive => interactive(&config).await,
    }
}

fn generate_config(path: &Path) -> Result<()> {
    let config = ClientConfig::default();
    config.save(path)?;
    println!("wrote default configuration to {}", path.display());
    Ok(())
}

fn wallet_platform(config: &ClientConfig) -> Result<Option<Arc<dyn WalletProvider>>> {
    let Some(endpoint) = &config.chain.rpc_endpoint else {
        warn!("no chain.rpc_endpoint configured; wallet features are unavailable");
        return Ok(None);
    };
    let provider = JsonRpcWalletProvider::from_endpoint(
        endpoint,
        config.requests.timeout(),
        config.requests.signal_poll_interval(),
    )?;
    let platform: Arc<dyn WalletProvider> = Arc::new(provider);
    Ok(Some(platform))
}

fn build_runtime(config: &ClientConfig) -> Result<ControllerRuntime> {
    let platform = wallet_platform(config)?;
    Ok(ControllerRuntime::from_config(config, platform)?)
}

async fn one_shot(config: &ClientConfig, request: Message) -> Result<()> {
    let mut runtime = build_runtime(config)?;
    runtime.dispatch(Message::ConnectRequested);
    runtime.run_until_idle().await;
    if !matches!(runtime.controller().connection(), ConnectionState::Connected(_)) {
        println!("{}", runtime.view());
        return Err(anyhow!("wallet connection failed"));
    }

    runtime.dispatch(request);
    runtime.run_until_idle().await;
    println!("{}", runtime.view());
    runtime.shutdown().await;

    match runtime.controller().last_error() {
        Some(error) => Err(anyhow!("{error}")),
        None => Ok(()),
    }
}

async fn interactive(config: &ClientConfig) -> Result<()> {
    let (sender, mut input) = mpsc::channel(32);
    tokio::spawn(read_commands(sender));

    loop {
        let mut runtime = build_runtime(config)?;
        let flow = tokio::select! {
            flow = runtime.run(&mut input, |view| println!("{view}\n")) => flow,
            _ = signal::ctrl_c() => {
                info!("shutdown signal received");
                ControlFlow::Continue
            }
        };
        runtime.shutdown().await;
        match flow {
            ControlFlow::Reload => info!("network changed; rebuilding client"),
            ControlFlow::Continue => return Ok(()),
        }
    }
}

async fn read_commands(sender: mpsc::Sender<Message>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}\n");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(error) => {
                warn!(%error, "failed to read stdin");
                return;
            }
        };
        match parse_command_line(&line) {
            Ok(None) => {}
            Ok(Some(InteractiveCommand::Dispatch(message))) => {
                if sender.send(message).await.is_err() {
                    return;
                }
            }
            Ok(Some(InteractiveCommand::Help)) => println!("{HELP}"),
            Ok(Some(InteractiveCommand::Quit)) => return,
            Err(error) => eprintln!("{error}"),
        }
    }
}
