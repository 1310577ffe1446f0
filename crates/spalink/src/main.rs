mod cli;
mod commands;
mod error;
mod logging;
mod store;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // `config path` must work even with a broken config file.
    if let Command::Config(ref args) = cli.command {
        if matches!(args.action, cli::ConfigAction::Path) {
            return commands::config_cmd::handle(
                args,
                &spalink_config::Config::default(),
                cli.global.config.as_deref(),
            );
        }
    }

    let config = spalink_config::load_config(cli.global.config.as_deref())?;
    let _log_guard = logging::init(&config.logging, cli.global.verbose);
    tracing::debug!(command = ?cli.command, "dispatching command");

    match cli.command {
        Command::Run => commands::run::handle(&config).await,
        Command::Sweep(ref args) => commands::sweep_cmd::handle(args, &config).await,
        Command::Status => commands::status::handle(&config).await,
        Command::Config(ref args) => {
            commands::config_cmd::handle(args, &config, cli.global.config.as_deref())
        }
    }
}
