//! Document store abstraction and the store writer.
//!
//! Embedding documents and response documents live in two collections of one
//! database. The store generates an identifier for every embedding document
//! and gives the response document at the same position the same identifier,
//! so both collections correlate one-to-one. Both collections are written in
//! one transaction.

mod postgres;
mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PersistenceError;
use crate::models::{EmbeddingDocument, ResponseDocument, StoreConfig, StoreDriver};

/// Abstract trait for document store operations.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fail unless the store answers a trivial query.
    async fn health_check(&self) -> Result<(), PersistenceError>;

    /// Create both collections if they don't exist.
    async fn ensure_collections(&self) -> Result<(), PersistenceError>;

    /// Insert both document sequences in one transaction.
    ///
    /// A fresh identifier is generated for each embedding document and copied
    /// onto the response document at the same position. Either every document
    /// of both collections is committed or none is. The slices must have equal
    /// lengths.
    async fn insert_correlated(
        &self,
        embedding_docs: &[EmbeddingDocument],
        response_docs: &mut [ResponseDocument],
    ) -> Result<(), PersistenceError>;

    /// Release the underlying connection.
    async fn close(&self);

    fn database(&self) -> &str;

    fn embedding_collection(&self) -> &str;

    fn response_collection(&self) -> &str;
}

/// Open the store backend selected by the URL scheme in `config`.
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn DocumentStore>, PersistenceError> {
    let driver = config
        .driver()
        .map_err(|_| PersistenceError::UnsupportedStore(config.url.clone()))?;
    tracing::debug!(%driver, database = %config.database, "opening document store");

    let store: Box<dyn DocumentStore> = match driver {
        StoreDriver::PostgreSQL => Box::new(PostgresStore::connect(config).await?),
        StoreDriver::Sqlite => Box::new(SqliteStore::open(config)?),
    };

    let ready = match store.health_check().await {
        Ok(()) => store.ensure_collections().await,
        Err(e) => Err(e),
    };
    if let Err(e) = ready {
        store.close().await;
        return Err(e);
    }

    Ok(store)
}

/// Counts of documents written by one save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub embeddings_inserted: usize,
    pub responses_inserted: usize,
}

/// Insert both document sequences, correlating response documents with the
/// identifiers generated for their embedding documents.
pub async fn save_documents(
    store: &dyn DocumentStore,
    embedding_docs: &[EmbeddingDocument],
    mut response_docs: Vec<ResponseDocument>,
) -> Result<SaveReport, PersistenceError> {
    if embedding_docs.len() != response_docs.len() {
        return Err(PersistenceError::CorrelationMismatch {
            embeddings: embedding_docs.len(),
            responses: response_docs.len(),
        });
    }

    if embedding_docs.is_empty() {
        tracing::warn!("no documents to insert");
        return Ok(SaveReport::default());
    }

    store
        .insert_correlated(embedding_docs, &mut response_docs)
        .await?;
    tracing::info!(
        embeddings = embedding_docs.len(),
        responses = response_docs.len(),
        database = store.database(),
        embedding_collection = store.embedding_collection(),
        response_collection = store.response_collection(),
        "inserted documents"
    );

    Ok(SaveReport {
        embeddings_inserted: embedding_docs.len(),
        responses_inserted: response_docs.len(),
    })
}

/// Open a connection, save the run's documents, and close the connection
/// whether or not the save succeeded.
pub async fn persist(
    config: &StoreConfig,
    embedding_docs: &[EmbeddingDocument],
    response_docs: Vec<ResponseDocument>,
) -> Result<SaveReport, PersistenceError> {
    let store = open_store(config).await?;
    let result = save_documents(store.as_ref(), embedding_docs, response_docs).await;
    store.close().await;

    if let Err(ref e) = result {
        tracing::error!(error = %e, "failed to insert documents");
    }
    result
}
