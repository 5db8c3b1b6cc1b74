// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Protocol Engine CLI
//!
//! Runs a JSON protocol against simulated hardware and prints every state
//! notification as a JSON line on stdout.
//!
//! ```bash
//! protocol-engine run protocol.json --labware-dir ./custom-labware
//! ```
//!
//! The protocol file is either an array of command requests or an object:
//!
//! ```json
//! {
//!   "modules": [{"serial": "TM-1", "model": "temperatureModuleV2"}],
//!   "liquids": [{"id": "water", "displayName": "Water"}],
//!   "commands": [{"commandType": "home", "params": {}}]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use opentrons_hardware::{ModuleModel, SimulatedHardware};
use protocol_engine::definitions::LabwareDefinition;
use protocol_engine::{
    EngineConfig, EngineStatus, Liquid, ProtocolEngine, RunResult, SqliteRunHistory,
};

#[derive(Parser, Debug)]
#[command(name = "protocol-engine")]
#[command(about = "Run Opentrons protocols against simulated hardware", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a protocol file to completion
    Run {
        /// Protocol JSON file
        file: PathBuf,

        /// Directory of custom labware definition JSON files
        #[arg(long)]
        labware_dir: Option<PathBuf>,

        /// SQLite URL for run history
        #[arg(long, env = "OT_ENGINE_DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProtocolFile {
    Commands(Vec<serde_json::Value>),
    Full(Protocol),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Protocol {
    #[serde(default)]
    modules: Vec<SimulatedModule>,
    #[serde(default)]
    liquids: Vec<Liquid>,
    commands: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SimulatedModule {
    serial: String,
    model: ModuleModel,
}

impl From<ProtocolFile> for Protocol {
    fn from(file: ProtocolFile) -> Self {
        match file {
            ProtocolFile::Commands(commands) => Protocol {
                modules: Vec::new(),
                liquids: Vec::new(),
                commands,
            },
            ProtocolFile::Full(protocol) => protocol,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("protocol_engine=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            file,
            labware_dir,
            database_url,
        } => run(&file, labware_dir.as_deref(), database_url).await,
    }
}

async fn run(file: &Path, labware_dir: Option<&Path>, database_url: Option<String>) -> Result<ExitCode> {
    let mut config = EngineConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    if database_url.is_some() {
        config.database_url = database_url;
    }

    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read protocol {}", file.display()))?;
    let protocol: Protocol = serde_json::from_str::<ProtocolFile>(&text)
        .with_context(|| format!("Failed to parse protocol {}", file.display()))?
        .into();

    let hardware = Arc::new(SimulatedHardware::new(config.robot_generation));
    for module in &protocol.modules {
        hardware.attach_module(module.serial.clone(), module.model);
    }
    let poller = (!protocol.modules.is_empty())
        .then(|| hardware.spawn_module_poller(config.module_polling_window));

    let mut builder = ProtocolEngine::builder(config.clone(), hardware.clone())
        .event_source(hardware.clone());
    if let Some(url) = &config.database_url {
        let history = SqliteRunHistory::from_url(url).await?;
        builder = builder.history(Arc::new(history));
    }
    let engine = builder.spawn();
    info!(run_id = %engine.run_id(), file = %file.display(), "Running protocol");

    let printer = tokio::spawn(print_notifications(engine.subscribe()));

    if let Some(dir) = labware_dir {
        for definition in LabwareDefinition::load_dir(dir)? {
            let uri = engine.add_labware_definition(definition).await?;
            info!(%uri, "Custom labware definition added");
        }
    }
    for liquid in protocol.liquids {
        engine.add_liquid(liquid).await?;
    }
    for (index, request) in protocol.commands.into_iter().enumerate() {
        engine
            .add_command_json(request)
            .await
            .with_context(|| format!("Command #{index} was rejected"))?;
    }

    engine.play().await?;
    let settled = engine.wait_until_settled().await?;
    match settled.status() {
        EngineStatus::AwaitingRecovery
        | EngineStatus::AwaitingRecoveryPaused
        | EngineStatus::AwaitingRecoveryBlockedByOpenDoor => {
            warn!("Run is awaiting recovery with no operator; stopping");
            engine.stop().await?;
        }
        _ if settled.commands().get_run_result().is_none() => engine.finish(None).await?,
        _ => {}
    }

    let state = engine.wait_until_complete().await?;
    engine.shutdown().await?;
    if let Some(poller) = poller {
        tokio::task::spawn_blocking(move || poller.stop()).await?;
    }
    let run_id = engine.run_id().to_string();
    // Last sender gone: the printer drains what is buffered and exits.
    drop(engine);
    printer.await?;

    let summary = serde_json::json!({
        "runId": run_id,
        "status": state.status(),
        "commands": state.commands().get_all().count(),
        "errors": state.commands().get_failed_command_errors(),
        "runError": state.commands().get_run_error(),
    });
    println!("{summary}");

    Ok(match state.commands().get_run_result() {
        Some(RunResult::Succeeded) => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn print_notifications(mut notifications: broadcast::Receiver<protocol_engine::Notification>) {
    loop {
        match notifications.recv().await {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize notification"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
