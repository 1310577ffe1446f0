// CLI surface for the spalink binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "spalink",
    version,
    about = "Bridge a cloud-controlled hot tub onto a local MQTT bus"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Path to the config file (defaults to the platform config dir).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge daemon: poll state, publish to the bus, accept
    /// commands on the write topics.
    Run,

    /// Run a capability sweep in the foreground and print the summary.
    Sweep(SweepArgs),

    /// Connect once and print the current device state.
    Status,

    /// Inspect the configuration.
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Discard persisted results instead of resuming from them.
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (secrets redacted).
    Show,
    /// Print the config file path.
    Path,
}
