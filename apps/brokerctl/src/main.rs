use brokerctl::cli::{Cli, Command};
use brokerctl::commands;
use brokerctl::error::CliError;
use brokerctl::logger::{DEFAULT_LOG_LEVEL, initialize as LoggerInitialize};

use broker_client::Client;
use broker_client::config::default_socket_path;

use std::io::stdout;
use std::process::ExitCode;

use clap::Parser;
use log::{LevelFilter, debug, error, info};
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        DEFAULT_LOG_LEVEL
    };
    if let Err(e) = LoggerInitialize(cli.log_dir.as_deref(), level) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let socket_path = match cli.socket {
        Some(path) => path,
        None => default_socket_path()?,
    };
    info!("Using broker socket {}", socket_path.display());

    let client = Client::from_env(socket_path)?;
    if let Ok(config) = serde_json::to_string(client.config()) {
        debug!("Client config: {config}");
    }

    let result = match &cli.command {
        Command::Publish(args) => commands::publish(&client, args).await,
        Command::Subscribe(args) => {
            let mut out = stdout().lock();
            tokio::select! {
                received = commands::subscribe(&client, args, &mut out) => {
                    received.map(|count| info!("Received {count} message(s)"))
                }
                _ = ctrl_c() => {
                    info!("Interrupted, closing");
                    Ok(())
                }
            }
        }
    };

    client.close();
    result
}
