//! Companion Bridge - settings sync and companion link for a game-streaming client
//!
//! This is the binary entry point. All logic lives in the workspace crates.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args as ClapArgs, Parser, Subcommand};
use color_eyre::eyre::{eyre, WrapErr};
use serde_json::Value;
use tokio::sync::broadcast;

use cbridge_app::config::{init_config_file, load_config};
use cbridge_app::signals::wait_for_shutdown;
use cbridge_app::{BridgeEngine, Record, SyncPath};
use cbridge_core::prelude::*;
use cbridge_core::first_active_display_mode;
use cbridge_link::{capability, BindOutcome, StatusFileMetadata, WsTransport};

/// Companion Bridge - settings sync and companion link for a game-streaming client
#[derive(Parser, Debug)]
#[command(name = "cbridge")]
#[command(about = "Bridge between a game-streaming client and its companion service", long_about = None)]
struct Args {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print records under a sync path as JSON
    Query {
        #[arg(value_parser = parse_sync_path)]
        path: SyncPath,

        #[command(flatten)]
        selection: Selection,
    },

    /// Insert or replace one record given as a JSON object
    Put {
        #[arg(value_parser = parse_sync_path)]
        path: SyncPath,

        /// Record, e.g. '{"name":"separate_screen_display","value":true}'
        record: String,

        #[command(flatten)]
        selection: Selection,
    },

    /// Delete the record a selection addresses
    Delete {
        #[arg(value_parser = parse_sync_path)]
        path: SyncPath,

        #[command(flatten)]
        selection: Selection,
    },

    /// Resolve a server-info document to its canonical display mode
    DisplayMode {
        /// Document file, or "-" for stdin
        #[arg(value_name = "FILE")]
        source: String,
    },

    /// Show whether haptics would be routed to the companion
    Haptics,

    /// Bind the companion link and keep it alive until interrupted
    Run,

    /// Write a default config file
    Init,
}

#[derive(ClapArgs, Debug)]
struct Selection {
    /// Single equality, e.g. "uuid = ?"
    #[arg(long = "where", value_name = "SELECTION")]
    selection: Option<String>,

    /// Value for the "?" placeholder
    #[arg(long = "arg", value_name = "VALUE")]
    args: Vec<String>,
}

fn parse_sync_path(s: &str) -> Result<SyncPath> {
    s.parse()
}

type Engine = BridgeEngine<WsTransport, StatusFileMetadata>;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    if let Err(e) = cbridge_core::logging::init() {
        eprintln!("Logging disabled: {e}");
    }

    let config_path = args.config.as_deref();

    match args.command {
        Command::Query { path, selection } => {
            let engine = open_engine(config_path).await?;
            let bridge = engine.bridge();
            let filters = bridge.filters(path, selection.selection.as_deref(), &selection.args)?;
            let records = bridge.query(path, &filters).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Put {
            path,
            record,
            selection,
        } => {
            let record = parse_record(&record)?;
            let engine = open_engine(config_path).await?;
            let bridge = engine.bridge();
            let filters = bridge.filters(path, selection.selection.as_deref(), &selection.args)?;
            bridge.insert_or_replace(path, record, &filters).await?;
        }
        Command::Delete { path, selection } => {
            let engine = open_engine(config_path).await?;
            let bridge = engine.bridge();
            let filters = bridge.filters(path, selection.selection.as_deref(), &selection.args)?;
            let removed = bridge.delete(path, &filters).await?;
            println!("{}", if removed { "deleted" } else { "not found" });
        }
        Command::DisplayMode { source } => print_display_mode(&source)?,
        Command::Haptics => {
            let engine = open_engine(config_path).await?;
            let inputs = capability::gather(engine.supervisor().metadata(), engine.hardware()).await;
            println!("{inputs:#?}");
            println!(
                "companion build: {}",
                engine
                    .companion_build_version()
                    .await
                    .unwrap_or_else(|| "unknown".to_string())
            );
            println!(
                "route to companion: {}",
                engine.route_haptics_remotely().await
            );
        }
        Command::Run => {
            let engine = open_engine(config_path).await?;
            run_until_shutdown(&engine).await?;
        }
        Command::Init => {
            let path = init_config_file(config_path)?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn open_engine(config_path: Option<&Path>) -> Result<Engine> {
    BridgeEngine::from_config(load_config(config_path)).await
}

fn parse_record(text: &str) -> color_eyre::Result<Record> {
    match serde_json::from_str::<Value>(text).wrap_err("record must be JSON")? {
        Value::Object(map) => Ok(map),
        _ => Err(eyre!("record must be a JSON object")),
    }
}

async fn run_until_shutdown(engine: &Engine) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("Companion bridge starting");
    info!("═══════════════════════════════════════════════════════");

    if let Ok(log_file) = cbridge_core::logging::get_current_log_file() {
        println!("Logging to {}", log_file.display());
    }

    let mut diagnostics = engine.scope().subscribe();
    tokio::spawn(async move {
        loop {
            match diagnostics.recv().await {
                Ok(diagnostic) => eprintln!(
                    "[{}] {}: {}",
                    diagnostic.at.format("%H:%M:%S"),
                    diagnostic.source,
                    diagnostic.message
                ),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} diagnostics", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    match engine.start().await {
        BindOutcome::Initiated => println!("Bound to companion service"),
        BindOutcome::NoOp(reason) => println!("Not bound: {reason:?}"),
        BindOutcome::Failed { message } => println!("Bind failed: {message}"),
    }

    let result = wait_for_shutdown().await;
    engine.shutdown().await;
    info!("Companion bridge exiting");
    result
}

fn print_display_mode(source: &str) -> color_eyre::Result<()> {
    let document = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source).wrap_err_with(|| format!("reading {source}"))?
    };

    let mode = first_active_display_mode(&document);
    debug!("Resolved display mode {}", mode);

    match mode.to_compact() {
        Some(compact) => println!("{compact}"),
        None => println!("{mode}"),
    }
    Ok(())
}
