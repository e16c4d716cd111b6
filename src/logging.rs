//! Logging initialization.
//!
//! Logs go to stderr so stdout carries only the command result. `RUST_LOG`
//! overrides the default level (`info`, or `debug` with `--verbose`).

use tracing_subscriber::EnvFilter;

pub fn init(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{default_level},sqlx=warn,hyper_util=off"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}
