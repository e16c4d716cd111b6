//! Run command implementation.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgGroup, Args};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::cli::output::RunSummary;
use crate::error::AppError;
use crate::models::{Config, ConfigOverrides, OutputFormat};
use crate::services::{BatchPipeline, EmbeddingClient, ResponseClient, persist};
use crate::utils::{InputSource, read_texts};

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("input").args(["text", "file", "console"])))]
pub struct RunArgs {
    /// Process a single text given on the command line
    #[arg(long, short = 't')]
    pub text: Option<String>,

    /// Read one text per non-blank line from a file
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Read texts from the console until an empty line
    #[arg(long, short = 'c')]
    pub console: bool,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_BASE")]
    pub api_base: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Document store connection URL (postgres:// or sqlite:)
    #[arg(long, env = "STORE_URL")]
    pub store_url: Option<String>,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,

    /// Collection receiving embedding documents
    #[arg(long, env = "EMBEDDING_COLLECTION")]
    pub embedding_collection: Option<String>,

    /// Collection receiving response documents
    #[arg(long, env = "RESULT_COLLECTION")]
    pub response_collection: Option<String>,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL")]
    pub embedding_model: Option<String>,

    /// Response model name
    #[arg(long, env = "RESPONSE_MODEL")]
    pub response_model: Option<String>,

    /// Maximum number of texts per batch
    #[arg(long, short = 'b', env = "BATCH_SIZE")]
    pub batch_size: Option<usize>,
}

impl RunArgs {
    pub fn input_source(&self) -> Option<InputSource> {
        if let Some(ref text) = self.text {
            Some(InputSource::Text(text.clone()))
        } else if let Some(ref path) = self.file {
            Some(InputSource::File(path.clone()))
        } else if self.console {
            Some(InputSource::Console)
        } else {
            None
        }
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            store_url: self.store_url.clone(),
            database: self.database.clone(),
            embedding_collection: self.embedding_collection.clone(),
            response_collection: self.response_collection.clone(),
            embedding_model: self.embedding_model.clone(),
            response_model: self.response_model.clone(),
            batch_size: self.batch_size,
        }
    }
}

pub async fn handle_run(
    args: RunArgs,
    config: Config,
    format: OutputFormat,
) -> Result<RunSummary, AppError> {
    let start_time = Instant::now();

    let config = config.with_overrides(args.overrides());
    config.validate()?;

    let texts = read_texts(args.input_source().as_ref())?;
    info!(
        texts = texts.len(),
        batch_size = config.pipeline.batch_size,
        "loaded input texts"
    );

    let embedder =
        EmbeddingClient::new(&config.api).map_err(|e| AppError::ClientSetup(e.to_string()))?;
    let responder =
        ResponseClient::new(&config.api).map_err(|e| AppError::ClientSetup(e.to_string()))?;

    let pb = progress_bar(texts.len() as u64, format);

    let output = BatchPipeline::new(&embedder, &responder, &config.models, &config.pipeline)
        .with_progress(pb.clone())
        .run(&texts)
        .await;
    pb.finish_and_clear();
    let output = output?;

    let report = persist(
        &config.store,
        &output.embedding_docs,
        output.response_docs,
    )
    .await?;

    Ok(RunSummary {
        texts: texts.len(),
        batches: output.batches,
        embeddings_inserted: report.embeddings_inserted,
        responses_inserted: report.responses_inserted,
        database: config.store.database,
        embedding_collection: config.store.embedding_collection,
        response_collection: config.store.response_collection,
        duration_ms: start_time.elapsed().as_millis() as u64,
    })
}

fn progress_bar(len: u64, format: OutputFormat) -> ProgressBar {
    if format != OutputFormat::Text || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} texts ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}
