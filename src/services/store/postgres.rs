use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use super::DocumentStore;
use crate::error::PersistenceError;
use crate::models::{EmbeddingDocument, ResponseDocument, StoreConfig};

/// PostgreSQL-backed document store. The database name maps to a schema and
/// each collection to a table inside it.
pub struct PostgresStore {
    pool: PgPool,
    database: String,
    embedding_collection: String,
    response_collection: String,
}

impl PostgresStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))?;

        Ok(Self {
            pool,
            database: config.database.clone(),
            embedding_collection: config.embedding_collection.clone(),
            response_collection: config.response_collection.clone(),
        })
    }

    fn table(&self, collection: &str) -> String {
        qualified_table(&self.database, collection)
    }

    async fn check_pgvector_extension(&self) -> Result<(), PersistenceError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| PersistenceError::SchemaError(e.to_string()))?;

        if result.is_none() {
            return Err(PersistenceError::SchemaError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }
}

fn qualified_table(schema: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", schema, table)
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn health_check(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| PersistenceError::ConnectionError(e.to_string()))
    }

    async fn ensure_collections(&self) -> Result<(), PersistenceError> {
        self.check_pgvector_extension().await?;

        let embeddings = self.table(&self.embedding_collection);
        let responses = self.table(&self.response_collection);
        let statements = [
            format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", self.database),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {embeddings} (
                    id UUID PRIMARY KEY,
                    text TEXT NOT NULL,
                    embedding vector NOT NULL,
                    created_at BIGINT NOT NULL,
                    source TEXT NOT NULL,
                    batch_index INTEGER NOT NULL
                )
                "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {responses} (
                    id UUID PRIMARY KEY REFERENCES {embeddings} (id),
                    text TEXT NOT NULL,
                    response TEXT NOT NULL,
                    created_at BIGINT NOT NULL,
                    response_id TEXT,
                    model TEXT,
                    usage JSONB NOT NULL DEFAULT '{{}}',
                    source TEXT NOT NULL,
                    batch_index INTEGER NOT NULL
                )
                "#
            ),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| PersistenceError::SchemaError(e.to_string()))?;
        }

        Ok(())
    }

    async fn insert_correlated(
        &self,
        embedding_docs: &[EmbeddingDocument],
        response_docs: &mut [ResponseDocument],
    ) -> Result<(), PersistenceError> {
        let embedding_error = |e: sqlx::Error| PersistenceError::InsertError {
            collection: self.embedding_collection.clone(),
            message: e.to_string(),
        };
        let response_error = |e: sqlx::Error| PersistenceError::InsertError {
            collection: self.response_collection.clone(),
            message: e.to_string(),
        };

        let embedding_query = format!(
            r#"
            INSERT INTO {} (id, text, embedding, created_at, source, batch_index)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            self.table(&self.embedding_collection)
        );
        let response_query = format!(
            r#"
            INSERT INTO {} (id, text, response, created_at, response_id, model, usage, source, batch_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            self.table(&self.response_collection)
        );

        // Rolled back on drop unless committed.
        let mut tx = self.pool.begin().await.map_err(embedding_error)?;
        let mut ids = Vec::with_capacity(embedding_docs.len());

        for doc in embedding_docs {
            let id = Uuid::new_v4();
            let embedding = Vector::from(doc.embedding.clone());

            sqlx::query(&embedding_query)
                .bind(id)
                .bind(&doc.text)
                .bind(&embedding)
                .bind(doc.created_at)
                .bind(&doc.source)
                .bind(doc.index as i32)
                .execute(&mut *tx)
                .await
                .map_err(embedding_error)?;

            ids.push(id);
        }

        for (doc, id) in response_docs.iter().zip(&ids) {
            sqlx::query(&response_query)
                .bind(id)
                .bind(&doc.text)
                .bind(&doc.response)
                .bind(doc.created_at)
                .bind(&doc.response_id)
                .bind(&doc.model)
                .bind(Json(&doc.usage))
                .bind(&doc.source)
                .bind(doc.index as i32)
                .execute(&mut *tx)
                .await
                .map_err(response_error)?;
        }

        tx.commit().await.map_err(response_error)?;

        for (doc, id) in response_docs.iter_mut().zip(ids) {
            doc.id = Some(id.to_string());
        }
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

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
