use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

const MASKED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Initialize configuration file with defaults")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show current configuration")]
    Show,
    #[command(about = "Show configuration file path")]
    Path,
}

pub fn handle_config(cmd: ConfigCommand, path: Option<&Path>, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(path, force, format),
        ConfigCommand::Show => handle_show(path, format),
        ConfigCommand::Path => handle_path(path, format),
    }
}

fn resolve_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::config_path()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory")),
    }
}

fn handle_init(path: Option<&Path>, force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config_path = resolve_path(path)?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    Config::default()
        .save_to(&config_path)
        .context("failed to create config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", config_path.display()))
    );
    Ok(())
}

fn handle_show(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut config = Config::load_or_default(path).context("failed to load config")?;
    config.api.api_key = MASKED.to_string();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Ok(config_path) = resolve_path(path) {
        let state = if config_path.exists() { "" } else { " (not created, using defaults)" };
        println!("# Config: {}{}", config_path.display(), state);
        println!();
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config_path = resolve_path(path)?;

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "path": config_path,
            "exists": config_path.exists(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if config_path.exists() {
        println!("Config (active): {}", config_path.display());
    } else {
        println!("Config (would be): {}", config_path.display());
    }
    Ok(())
}
