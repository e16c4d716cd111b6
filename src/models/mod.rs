mod config;
mod document;
mod format;

pub use config::{
    ApiConfig, Config, ConfigOverrides, DEFAULT_API_BASE, DEFAULT_BATCH_SIZE, DEFAULT_DATABASE,
    DEFAULT_EMBEDDING_COLLECTION, DEFAULT_EMBEDDING_MODEL, DEFAULT_RESPONSE_COLLECTION,
    DEFAULT_RESPONSE_MODEL, DEFAULT_STORE_URL, ModelConfig, PipelineConfig, StoreConfig,
    StoreDriver,
};
pub use document::{
    DocumentId, EmbeddingDocument, ResponseDocument, ResponseRecord, SOURCE_TAG, Usage,
};
pub use format::OutputFormat;
