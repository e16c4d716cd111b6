//! Error types for the embedding and response pipeline.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to reading input texts.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {source_name}: {error}")]
    ReadError {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("no input texts found")]
    NoInput,
}

/// Errors from the embedding endpoint. Never retried by the client itself.
#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("failed to connect to embedding endpoint: {0}")]
    ConnectionError(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("embedding endpoint returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding count mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Why a call to the responses endpoint was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseErrorReason {
    InvalidInput,
    NetworkError,
    HttpError,
    InvalidPayload,
    InvalidShape,
    NoContent,
}

impl ResponseErrorReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseErrorReason::InvalidInput => "invalid_input",
            ResponseErrorReason::NetworkError => "network_error",
            ResponseErrorReason::HttpError => "http_error",
            ResponseErrorReason::InvalidPayload => "invalid_payload",
            ResponseErrorReason::InvalidShape => "invalid_shape",
            ResponseErrorReason::NoContent => "no_content",
        }
    }
}

impl fmt::Display for ResponseErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error from the responses endpoint, carrying the diagnostic detail needed to
/// log status and body verbatim.
#[derive(Debug, Error)]
#[error("response API error ({reason}): {message}")]
pub struct ResponseApiError {
    pub reason: ResponseErrorReason,
    pub message: String,
    pub status_code: Option<u16>,
    pub body: Option<Value>,
}

impl ResponseApiError {
    pub fn new(reason: ResponseErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
            status_code: None,
            body: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A single failed attempt at processing one batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("embedding error: {0}")]
    Embedding(#[from] RemoteCallError),

    #[error("{0}")]
    Response(#[from] ResponseApiError),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch {batch} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        batch: usize,
        attempts: u32,
        #[source]
        last_error: BatchError,
    },

    #[error("invalid batch size: {0}")]
    InvalidBatchSize(usize),
}

/// Errors related to document store operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to connect to document store: {0}")]
    ConnectionError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("insert into {collection} failed: {message}")]
    InsertError { collection: String, message: String },

    #[error(
        "cannot correlate {embeddings} embedding documents with {responses} response documents"
    )]
    CorrelationMismatch { embeddings: usize, responses: usize },

    #[error("unsupported store URL: {0}")]
    UnsupportedStore(String),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("client setup error: {0}")]
    ClientSetup(String),
}

impl AppError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::ClientSetup(_) => 1,
            AppError::Input(InputError::NoInput) => 1,
            AppError::Input(InputError::ReadError { .. }) => 2,
            AppError::Pipeline(_) => 3,
            AppError::Persistence(_) => 4,
        }
    }
}
