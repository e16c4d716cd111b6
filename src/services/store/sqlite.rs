use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::DocumentStore;
use crate::error::PersistenceError;
use crate::models::{EmbeddingDocument, ResponseDocument, StoreConfig};

/// SQLite-backed document store. Each collection is a table named
/// `{database}_{collection}`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    database: String,
    embedding_collection: String,
    response_collection: String,
}

impl SqliteStore {
    /// Open the database file named by a `sqlite://path` or `sqlite::memory:` URL.
    pub fn open(config: &StoreConfig) -> Result<Self, PersistenceError> {
        let target = config
            .url
            .strip_prefix("sqlite://")
            .or_else(|| config.url.strip_prefix("sqlite:"))
            .ok_or_else(|| PersistenceError::UnsupportedStore(config.url.clone()))?;

        let conn = if target.is_empty() || target == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(target)
        }
        .map_err(|e| PersistenceError::ConnectionError(e.to_string()))?;

        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            database: config.database.clone(),
            embedding_collection: config.embedding_collection.clone(),
            response_collection: config.response_collection.clone(),
        })
    }

    fn table(&self, collection: &str) -> String {
        format!("\"{}_{}\"", self.database, collection)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|_| PersistenceError::ConnectionError("connection lock poisoned".to_string()))
    }

    /// Number of documents in a collection, or 0 if it doesn't exist.
    pub fn count(&self, collection: &str) -> Result<u64, PersistenceError> {
        let conn = self.lock()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![format!("{}_{}", self.database, collection)],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))?;
        if exists.is_none() {
            return Ok(0);
        }

        let query = format!("SELECT COUNT(*) FROM {}", self.table(collection));
        conn.query_row(&query, [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))
    }

    fn ping(&self) -> Result<(), PersistenceError> {
        self.lock()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|_| ())
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))
    }

    fn create_tables(&self) -> Result<(), PersistenceError> {
        let embeddings = self.table(&self.embedding_collection);
        let responses = self.table(&self.response_collection);
        let schema = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {embeddings} (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                embedding TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                source TEXT NOT NULL,
                batch_index INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS {responses} (
                id TEXT PRIMARY KEY REFERENCES {embeddings}(id),
                text TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                response_id TEXT,
                model TEXT,
                usage TEXT NOT NULL,
                source TEXT NOT NULL,
                batch_index INTEGER NOT NULL
            );
            "#
        );

        self.lock()?
            .execute_batch(&schema)
            .map_err(|e| PersistenceError::SchemaError(e.to_string()))
    }

    fn write_correlated(
        &self,
        embedding_docs: &[EmbeddingDocument],
        response_docs: &mut [ResponseDocument],
    ) -> Result<(), PersistenceError> {
        let embedding_error = |message: String| PersistenceError::InsertError {
            collection: self.embedding_collection.clone(),
            message,
        };
        let response_error = |message: String| PersistenceError::InsertError {
            collection: self.response_collection.clone(),
            message,
        };

        let embedding_query = format!(
            "INSERT INTO {} (id, text, embedding, created_at, source, batch_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            self.table(&self.embedding_collection)
        );
        let response_query = format!(
            "INSERT INTO {} (id, text, response, created_at, response_id, model, usage, source, batch_index)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            self.table(&self.response_collection)
        );

        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls back both collections.
        let tx = conn
            .transaction()
            .map_err(|e| embedding_error(e.to_string()))?;

        let mut ids = Vec::with_capacity(embedding_docs.len());
        for doc in embedding_docs {
            let id = uuid::Uuid::new_v4().to_string();
            let embedding =
                serde_json::to_string(&doc.embedding).map_err(|e| embedding_error(e.to_string()))?;
            tx.execute(
                &embedding_query,
                params![
                    id,
                    doc.text,
                    embedding,
                    doc.created_at,
                    doc.source,
                    doc.index
                ],
            )
            .map_err(|e| embedding_error(e.to_string()))?;
            ids.push(id);
        }

        for (doc, id) in response_docs.iter().zip(&ids) {
            let usage =
                serde_json::to_string(&doc.usage).map_err(|e| response_error(e.to_string()))?;
            tx.execute(
                &response_query,
                params![
                    id,
                    doc.text,
                    doc.response,
                    doc.created_at,
                    doc.response_id,
                    doc.model,
                    usage,
                    doc.source,
                    doc.index
                ],
            )
            .map_err(|e| response_error(e.to_string()))?;
        }

        tx.commit().map_err(|e| response_error(e.to_string()))?;

        for (doc, id) in response_docs.iter_mut().zip(ids) {
            doc.id = Some(id);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn health_check(&self) -> Result<(), PersistenceError> {
        self.ping()
    }

    async fn ensure_collections(&self) -> Result<(), PersistenceError> {
        self.create_tables()
    }

    async fn insert_correlated(
        &self,
        embedding_docs: &[EmbeddingDocument],
        response_docs: &mut [ResponseDocument],
    ) -> Result<(), PersistenceError> {
        self.write_correlated(embedding_docs, response_docs)
    }

    async fn close(&self) {}

    fn database(&self) -> &str {
        &self.database
    }

    fn embedding_collection(&self) -> &str {
        &self.embedding_collection
    }

    fn response_collection(&self) -> &str {
        &self.response_collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SOURCE_TAG, Usage};
    use crate::services::store::save_documents;

    fn memory_store() -> SqliteStore {
        let config = StoreConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let store = SqliteStore::open(&config).unwrap();
        store.create_tables().unwrap();
        store
    }

    fn docs(texts: &[&str]) -> (Vec<EmbeddingDocument>, Vec<ResponseDocument>) {
        let embeddings = texts
            .iter()
            .enumerate()
            .map(|(i, t)| EmbeddingDocument {
                text: t.to_string(),
                embedding: vec![i as f32, 1.0],
                created_at: 10,
                source: SOURCE_TAG.to_string(),
                index: i as u32,
            })
            .collect();
        let responses = texts
            .iter()
            .enumerate()
            .map(|(i, t)| ResponseDocument {
                id: None,
                text: t.to_string(),
                response: "shared".to_string(),
                created_at: 10,
                response_id: Some("resp_1".to_string()),
                model: Some("gen-model".to_string()),
                usage: Usage {
                    total_tokens: Some(3),
                    ..Default::default()
                },
                source: SOURCE_TAG.to_string(),
                index: i as u32,
            })
            .collect();
        (embeddings, responses)
    }

    #[tokio::test]
    async fn test_health_check() {
        assert!(memory_store().health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_response_ids_match_embedding_ids_by_position() {
        let store = memory_store();
        let (embeddings, responses) = docs(&["alpha", "beta", "gamma"]);

        let report = save_documents(&store, &embeddings, responses).await.unwrap();
        assert_eq!(report.embeddings_inserted, 3);
        assert_eq!(store.count("Embedings").unwrap(), 3);
        assert_eq!(store.count("Results").unwrap(), 3);

        let conn = store.lock().unwrap();
        let mut stmt = conn
            .prepare(
                r#"SELECT e.text, r.text, r.usage FROM "Gen_AI_Embedings" e
                   JOIN "Gen_AI_Results" r ON r.id = e.id ORDER BY e.text"#,
            )
            .unwrap();
        let rows: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 3);
        for (embedding_text, response_text, usage) in rows {
            assert_eq!(embedding_text, response_text);
            assert_eq!(usage, r#"{"total_tokens":3}"#);
        }
    }

    #[tokio::test]
    async fn test_rejected_response_rolls_back_embeddings() {
        let config = StoreConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let store = SqliteStore::open(&config).unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch(
                r#"CREATE TABLE "Gen_AI_Results" (
                    id TEXT, text TEXT, response TEXT, created_at INTEGER,
                    response_id TEXT, model TEXT, usage TEXT, source TEXT,
                    batch_index INTEGER, CHECK (0)
                )"#,
            )
            .unwrap();
        store.create_tables().unwrap();

        let (embeddings, mut responses) = docs(&["alpha", "beta"]);
        let err = store
            .insert_correlated(&embeddings, &mut responses)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PersistenceError::InsertError { ref collection, .. } if collection == "Results"
        ));
        assert_eq!(store.count("Embedings").unwrap(), 0);
        assert_eq!(store.count("Results").unwrap(), 0);
        assert!(responses.iter().all(|d| d.id.is_none()));
    }

    #[test]
    fn test_count_missing_collection() {
        let config = StoreConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.count("Embedings").unwrap(), 0);
    }
}
