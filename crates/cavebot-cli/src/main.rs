//! cavebot CLI entry point.

mod actions;
mod args;
mod device;
mod orchestrator;
mod paths;
mod perception;
mod tasks;
#[cfg(test)]
mod testkit;

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use cavebot_core::config::{AgentConfig, DeviceConfig};
use cavebot_core::model::Label;
use cavebot_core::wire::Ack;
use clap::Parser;
use tracing::{error, info};

use crate::actions::Engine;
use crate::args::{CheckDeviceArgs, Cli, Commands, HpArgs, LocateArgs, RunArgs};
use crate::device::{DeviceLink, SerialTransport};
use crate::orchestrator::Orchestrator;
use crate::perception::{PerceptionPort, VisionClient};

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_command(cli: Cli) -> anyhow::Result<()> {
    // Commands that never touch the device or the matcher.
    match &cli.command {
        Commands::SampleConfig => {
            println!(
                "{}",
                serde_json::to_string_pretty(&AgentConfig::sample())?
            );
            return Ok(());
        }
        Commands::Examples => {
            println!("{}", args::EXAMPLES_TEXT);
            return Ok(());
        }
        _ => {}
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => run_agent(args).await,
            Commands::CheckDevice(args) => check_device(args).await,
            Commands::Hp(args) => read_hp(args).await,
            Commands::Locate(args) => locate_label(args).await,
            Commands::SampleConfig | Commands::Examples => unreachable!("handled above"),
        }
    })
}

/// Build the perception port from the configured matcher command.
fn vision_port(cfg: &AgentConfig) -> anyhow::Result<PerceptionPort> {
    let client = VisionClient::spawn(
        &cfg.vision.command,
        Duration::from_millis(cfg.vision.request_timeout_ms),
    )?;
    Ok(PerceptionPort::new(Arc::new(client), cfg.vision.clone()))
}

/// Run the agent loop with graceful signal handling.
///
/// SIGINT (Ctrl-C) and SIGTERM both unwind deterministically: the active
/// step is abandoned, the device is returned to idle, and the session
/// summary is logged before exit.
async fn run_agent(args: RunArgs) -> anyhow::Result<()> {
    let cfg = paths::load_config(args.config.as_deref())?;

    let transport = SerialTransport::open(&cfg.device.port, cfg.device.baud)?;
    let link = DeviceLink::new(Box::new(transport), cfg.device.clone());
    link.await_ready().await?;

    let vision = vision_port(&cfg)?;
    let engine = Engine::new(link, vision, cfg);
    let mut orchestrator = Orchestrator::new(engine, args.cycles);

    tokio::select! {
        result = orchestrator.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, unwinding");
        }
        _ = sigterm() => {
            info!("received SIGTERM, unwinding");
        }
    }

    orchestrator.finish().await;
    Ok(())
}

/// Probe the device: readiness sentinel, then one idle-state round trip.
async fn check_device(args: CheckDeviceArgs) -> anyhow::Result<()> {
    let device_cfg = DeviceConfig {
        port: args.port.clone(),
        baud: args.baud,
        ..DeviceConfig::default()
    };

    let transport = SerialTransport::open(&args.port, args.baud)?;
    let link = DeviceLink::new(Box::new(transport), device_cfg);
    link.await_ready().await?;

    match link.set_busy(false).await {
        Ack::Ok => {
            println!("device on {} is ready", args.port);
            Ok(())
        }
        other => bail!("device answered probe with {:?}", other),
    }
}

/// Classify the configured health-bar region, once or continuously.
async fn read_hp(args: HpArgs) -> anyhow::Result<()> {
    let cfg = paths::load_config(args.config.as_deref())?;
    let port = vision_port(&cfg)?;

    loop {
        let state = port
            .health(cfg.healing.region, &cfg.healing.classifier)
            .await;
        println!("{}", serde_json::to_string(&state)?);
        if !args.watch {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// Probe one template through the cascade, with optional retry rounds.
async fn locate_label(args: LocateArgs) -> anyhow::Result<()> {
    let cfg = paths::load_config(args.config.as_deref())?;
    let port = vision_port(&cfg)?;

    let label = Label::from(args.label.as_str());
    let found = port
        .locate_with_retry(&label, args.retries, Duration::from_secs_f32(args.gap))
        .await;

    match found {
        Some(det) => println!("{}", serde_json::to_string_pretty(&det)?),
        None => println!("not found"),
    }
    Ok(())
}

/// Wait for SIGTERM signal (Unix only).
///
/// If signal registration fails, logs a warning and waits indefinitely
/// so the agent still unwinds on SIGINT.
#[cfg(unix)]
async fn sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!("failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// SIGTERM is not available on non-Unix platforms; use a never-completing
/// future.
#[cfg(not(unix))]
async fn sigterm() {
    std::future::pending::<()>().await;
}
