use std::process::ExitCode;

use clap::Parser;
use tokio::signal;

use embedflow::cli::commands::{handle_config, handle_run};
use embedflow::cli::output::get_formatter;
use embedflow::cli::{Cli, Commands};
use embedflow::logging;
use embedflow::models::{Config, OutputFormat};

const SIGNAL_EXIT_CODE: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("failed to initialize logging: {}", e);
    }
    let format = cli.format.unwrap_or_default();

    tokio::select! {
        code = run_command(cli, format) => code,
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, discarding unsaved documents");
            ExitCode::from(SIGNAL_EXIT_CODE)
        }
    }
}

async fn run_command(cli: Cli, format: OutputFormat) -> ExitCode {
    let formatter = get_formatter(format);

    match cli.command {
        Commands::Run(args) => {
            let config = match Config::load_or_default(cli.config.as_deref()) {
                Ok(config) => config,
                Err(e) => {
                    eprint!("{}", formatter.format_error(&e.to_string()));
                    return ExitCode::FAILURE;
                }
            };

            match handle_run(args, config, format).await {
                Ok(summary) => {
                    print!("{}", formatter.format_run_summary(&summary));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "run failed");
                    eprint!("{}", formatter.format_error(&e.to_string()));
                    ExitCode::from(e.exit_code())
                }
            }
        }
        Commands::Config(cmd) => match handle_config(cmd, cli.config.as_deref(), format) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprint!("{}", formatter.format_error(&format!("{:#}", e)));
                ExitCode::FAILURE
            }
        },
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
