//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const CONFIG_HELP: &str = "Config file path [default: resolved via CAVEBOT_CONFIG, then the user config directory]";

/// Screen-driven game agent with hardware input injection.
///
/// Perceives on-screen state through an external matcher process and
/// drives the game through an input-injection device on a serial line.
/// Everything the agent does — routes, enemies, loot, healing — comes
/// from one JSON configuration file.
#[derive(Debug, Parser)]
#[command(name = "cavebot", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the agent loop
    #[command(after_help = "\
Examples:
  cavebot run                           # Config from the default path
  cavebot run --config hunt.json        # Explicit config file
  cavebot run --cycles 3                # Stop after three route cycles
  RUST_LOG=debug cavebot run            # Verbose arbitration logging")]
    Run(RunArgs),

    /// Probe the input device: wait for READY and round-trip a command
    #[command(after_help = "\
Examples:
  cavebot check-device --port /dev/ttyUSB0
  cavebot check-device --port /dev/ttyACM1 --baud 9600")]
    CheckDevice(CheckDeviceArgs),

    /// Classify the health bar once (or continuously with --watch)
    #[command(after_help = "\
Examples:
  cavebot hp                            # One reading
  cavebot hp --watch                    # Poll twice a second until Ctrl-C
Useful while tuning the classifier color bands in the config.")]
    Hp(HpArgs),

    /// Probe a template through the confidence cascade
    #[command(after_help = "\
Examples:
  cavebot locate witch                  # One cascade pass
  cavebot locate am_s7 --retries 3 --gap 5
Useful while capturing and tuning template assets.")]
    Locate(LocateArgs),

    /// Print a complete example configuration
    SampleConfig,

    /// Show an end-to-end usage example
    Examples,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    #[arg(short, long, help = CONFIG_HELP)]
    pub config: Option<PathBuf>,

    /// Stop after this many full route cycles [default: run until Ctrl-C]
    #[arg(long)]
    pub cycles: Option<u32>,
}

#[derive(Debug, clap::Args)]
pub struct CheckDeviceArgs {
    /// Serial device node
    #[arg(short, long)]
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = 115_200)]
    pub baud: u32,
}

#[derive(Debug, clap::Args)]
pub struct HpArgs {
    #[arg(short, long, help = CONFIG_HELP)]
    pub config: Option<PathBuf>,

    /// Keep polling instead of reading once
    #[arg(short, long)]
    pub watch: bool,
}

#[derive(Debug, clap::Args)]
pub struct LocateArgs {
    /// Template label to search for
    pub label: String,

    #[arg(short, long, help = CONFIG_HELP)]
    pub config: Option<PathBuf>,

    /// Extra cascade rounds after the first
    #[arg(short, long, default_value_t = 0)]
    pub retries: u32,

    /// Seconds between cascade rounds
    #[arg(short, long, default_value_t = 5.0)]
    pub gap: f32,
}

/// End-to-end example text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"End-to-end example: hunt a two-level cave

# 1. Write a starting configuration and edit it: serial port, matcher
#    command, route flags, enemy priorities, loot labels.
cavebot sample-config > ~/.config/cavebot/config.json

# 2. Verify the input device answers on its serial line.
cavebot check-device --port /dev/ttyUSB0

# 3. Verify the matcher sees your templates and the health bar.
cavebot locate am_a1
cavebot hp --watch

# 4. Run. Enemies preempt navigation, loot follows every kill, healing
#    fires on the configured trigger, and Ctrl-C unwinds cleanly with
#    the device returned to idle.
cavebot run

# 5. Or bound the session to a fixed number of route cycles.
cavebot run --cycles 10
"#;
