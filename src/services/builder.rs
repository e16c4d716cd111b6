//! Builds persistence-ready documents from one processed batch.

use crate::models::{EmbeddingDocument, ResponseDocument, ResponseRecord, SOURCE_TAG};

/// Zip batch texts with their vectors. Every document shares `created_at`
/// and carries its position within the batch.
pub fn build_embedding_docs(
    texts: &[String],
    embeddings: Vec<Vec<f32>>,
    created_at: i64,
) -> Vec<EmbeddingDocument> {
    debug_assert_eq!(texts.len(), embeddings.len());

    texts
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (text, embedding))| EmbeddingDocument {
            text: text.clone(),
            embedding,
            created_at,
            source: SOURCE_TAG.to_string(),
            index: index as u32,
        })
        .collect()
}

/// Pair every text in the batch with the batch's single response record.
///
/// A batch of K texts yields K documents that all carry the same response
/// text, id, model and usage. `fallback_created_at` is used when the endpoint
/// did not report a creation time.
pub fn build_response_docs(
    texts: &[String],
    record: &ResponseRecord,
    fallback_created_at: i64,
) -> Vec<ResponseDocument> {
    let created_at = record.created_at.unwrap_or(fallback_created_at);

    texts
        .iter()
        .enumerate()
        .map(|(index, text)| ResponseDocument {
            id: None,
            text: text.clone(),
            response: record.text.clone(),
            created_at,
            response_id: record.id.clone(),
            model: record.model.clone(),
            usage: record.usage.clone(),
            source: SOURCE_TAG.to_string(),
            index: index as u32,
        })
        .collect()
}
