use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

mod config;
mod replay;
mod run;
mod script;

use crate::config::{DelayOverrides, PocketConfig};
use crate::script::Script;

#[derive(Parser)]
#[command(name = "pocket")]
#[command(about = "Pocket mode lock-intent engine driven from signal scripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory holding config.toml (defaults to ~/.pocket)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Milliseconds the sensor must stay covered before locking
    #[arg(long, global = true)]
    lock_screen_ms: Option<u64>,

    /// Milliseconds proximity stays relevant after the keyguard unlocks
    #[arg(long, global = true)]
    unlock_grace_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read signal lines from stdin and print events as they happen
    Run(RunArgs),

    /// Run a signal script on a virtual clock
    Replay(ReplayArgs),

    /// Print the resolved configuration
    Config,
}

#[derive(Parser)]
struct RunArgs {
    /// Output as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct ReplayArgs {
    /// Path to the signal script
    script: PathBuf,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = PocketConfig::load(
        cli.data_dir.clone(),
        DelayOverrides {
            lock_screen_ms: cli.lock_screen_ms,
            unlock_grace_ms: cli.unlock_grace_ms,
        },
    )?;

    match cli.command {
        Commands::Run(args) => run_command(&config, args).await,
        Commands::Replay(args) => replay_command(&config, args),
        Commands::Config => config_command(&config),
    }
}

/// Logs go to stderr so stdout carries only events.
fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "pocket=debug,pocket_core=debug,info"
    } else {
        "pocket=info,pocket_core=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

async fn run_command(config: &PocketConfig, args: RunArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        on_interrupt.cancel();
    });

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    run::run_live(
        stdin,
        std::io::stdout(),
        config.file.lock_screen_config(),
        config.file.engine.event_buffer,
        args.json,
        cancel,
    )
    .await
}

fn replay_command(config: &PocketConfig, args: ReplayArgs) -> Result<()> {
    let script = Script::from_file(&args.script)?;
    let replay = replay::replay(&script, config.file.lock_screen_config())?;
    for event in &replay.events {
        println!("{}", event.render(args.json)?);
    }
    Ok(())
}

fn config_command(config: &PocketConfig) -> Result<()> {
    println!("# {}", config.config_toml_path().display());
    print!("{}", config.file.to_toml()?);
    Ok(())
}
