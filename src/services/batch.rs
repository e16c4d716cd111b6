//! Batch pipeline: partitions texts, drives the embedding and response calls
//! for each batch with bounded retry, and accumulates the resulting documents.

use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::{BatchError, PipelineError, RemoteCallError, ResponseApiError};
use crate::models::{EmbeddingDocument, ModelConfig, PipelineConfig, ResponseDocument};
use crate::services::builder::{build_embedding_docs, build_response_docs};
use crate::services::{Embedder, Responder};
use crate::utils::retry::{RetryConfig, RetryResult, with_retry};

/// Documents produced by a successful run, in input order.
#[derive(Debug, Default)]
pub struct PipelineOutput {
    pub embedding_docs: Vec<EmbeddingDocument>,
    pub response_docs: Vec<ResponseDocument>,
    pub batches: usize,
}

struct BatchOutput {
    embedding_docs: Vec<EmbeddingDocument>,
    response_docs: Vec<ResponseDocument>,
}

/// Split texts into consecutive batches of at most `batch_size` items.
pub fn partition(texts: &[String], batch_size: usize) -> std::slice::Chunks<'_, String> {
    texts.chunks(batch_size)
}

pub struct BatchPipeline<'a> {
    embedder: &'a dyn Embedder,
    responder: &'a dyn Responder,
    embedding_model: String,
    response_model: String,
    batch_size: usize,
    retry: RetryConfig,
    batch_pause: Duration,
    progress: ProgressBar,
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        responder: &'a dyn Responder,
        models: &ModelConfig,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            responder,
            embedding_model: models.embedding.clone(),
            response_model: models.response.clone(),
            batch_size: config.batch_size,
            retry: RetryConfig::from(config),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` by the number of texts in each completed batch.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Process every text exactly once, or fail the whole run.
    ///
    /// Batches run strictly in order. A batch that fails `max_attempts` times
    /// aborts the run and everything accumulated so far is dropped.
    pub async fn run(&self, texts: &[String]) -> Result<PipelineOutput, PipelineError> {
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidBatchSize(self.batch_size));
        }

        let total_batches = texts.len().div_ceil(self.batch_size);
        let mut output = PipelineOutput {
            embedding_docs: Vec::with_capacity(texts.len()),
            response_docs: Vec::with_capacity(texts.len()),
            batches: 0,
        };

        for (batch_no, batch) in partition(texts, self.batch_size).enumerate() {
            tracing::info!(
                batch = batch_no + 1,
                total = total_batches,
                texts = batch.len(),
                "processing batch"
            );

            let result = with_retry(&self.retry, |attempt| {
                self.process_batch(batch_no, attempt, batch)
            })
            .await;

            match result {
                RetryResult::Success(batch_output) => {
                    output.embedding_docs.extend(batch_output.embedding_docs);
                    output.response_docs.extend(batch_output.response_docs);
                    output.batches += 1;
                    self.progress.inc(batch.len() as u64);
                    tokio::time::sleep(self.batch_pause).await;
                }
                RetryResult::Failed {
                    last_error,
                    attempts,
                } => {
                    tracing::error!(
                        batch = batch_no + 1,
                        attempts,
                        error = %last_error,
                        "batch failed after retries"
                    );
                    return Err(PipelineError::RetriesExhausted {
                        batch: batch_no,
                        attempts,
                        last_error,
                    });
                }
            }
        }

        Ok(output)
    }

    async fn process_batch(
        &self,
        batch_no: usize,
        attempt: u32,
        batch: &[String],
    ) -> Result<BatchOutput, BatchError> {
        tracing::debug!(batch = batch_no + 1, attempt, "requesting embeddings");
        let embeddings = self.embedder.embed(batch, &self.embedding_model).await?;
        if embeddings.len() != batch.len() {
            return Err(RemoteCallError::LengthMismatch {
                expected: batch.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let created_at = chrono::Utc::now().timestamp();
        let embedding_docs = build_embedding_docs(batch, embeddings, created_at);
        tracing::debug!(batch = batch_no + 1, attempt, "embeddings received");

        let record = self
            .responder
            .respond(batch, &self.response_model)
            .await
            .inspect_err(|e| log_response_error(batch_no, attempt, e))?;

        tracing::info!(
            batch = batch_no + 1,
            response_id = record.id.as_deref().unwrap_or("-"),
            model = record.model.as_deref().unwrap_or("-"),
            total_tokens = record.usage.total_tokens.unwrap_or(0),
            input_tokens = record.usage.input_tokens.unwrap_or(0),
            output_tokens = record.usage.output_tokens.unwrap_or(0),
            "response received"
        );

        let response_docs = build_response_docs(batch, &record, chrono::Utc::now().timestamp());

        Ok(BatchOutput {
            embedding_docs,
            response_docs,
        })
    }
}

fn log_response_error(batch_no: usize, attempt: u32, error: &ResponseApiError) {
    let body = error
        .body
        .as_ref()
        .and_then(|b| serde_json::to_string_pretty(b).ok())
        .unwrap_or_default();
    tracing::warn!(
        batch = batch_no + 1,
        attempt,
        reason = %error.reason,
        status = ?error.status_code,
        body = %body,
        "response API error: {}",
        error.message
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResponseErrorReason;
    use crate::models::{ResponseRecord, Usage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeEmbedder {
        /// 1-based call numbers that raise an error.
        failing_calls: Vec<u32>,
        /// 1-based call numbers that return one vector too few.
        short_calls: Vec<u32>,
        calls: AtomicU32,
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(
            &self,
            texts: &[String],
            _model: &str,
        ) -> Result<Vec<Vec<f32>>, RemoteCallError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(texts.to_vec());
            if self.failing_calls.contains(&call) {
                return Err(RemoteCallError::Timeout);
            }
            let count = if self.short_calls.contains(&call) {
                texts.len() - 1
            } else {
                texts.len()
            };
            Ok((0..count).map(|i| vec![i as f32, call as f32]).collect())
        }
    }

    #[derive(Default)]
    struct FakeResponder {
        failing_calls: Vec<u32>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Responder for FakeResponder {
        async fn respond(
            &self,
            texts: &[String],
            model: &str,
        ) -> Result<ResponseRecord, ResponseApiError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.failing_calls.contains(&call) {
                return Err(
                    ResponseApiError::new(ResponseErrorReason::HttpError, "status 500")
                        .with_status(500),
                );
            }
            Ok(ResponseRecord {
                text: format!("reply to {}", texts.join("+")),
                id: Some(format!("resp_{call}")),
                created_at: Some(1_700_000_000),
                model: Some(model.to_string()),
                usage: Usage::default(),
            })
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn pipeline<'a>(
        embedder: &'a FakeEmbedder,
        responder: &'a FakeResponder,
        batch_size: usize,
    ) -> BatchPipeline<'a> {
        let config = PipelineConfig {
            batch_size,
            max_attempts: 3,
            retry_base_delay_ms: 0,
            batch_pause_ms: 0,
        };
        BatchPipeline::new(embedder, responder, &ModelConfig::default(), &config)
    }

    #[test]
    fn test_partition_reconstructs_input() {
        for n in 1..=20usize {
            let input: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
            for size in 1..=6usize {
                let batches: Vec<&[String]> = partition(&input, size).collect();
                assert_eq!(batches.len(), n.div_ceil(size));
                let (last, full) = batches.split_last().unwrap();
                assert!(full.iter().all(|b| b.len() == size));
                assert!(!last.is_empty() && last.len() <= size);
                assert_eq!(batches.concat(), input);
            }
        }
    }

    #[tokio::test]
    async fn test_two_batches_share_batch_level_responses() {
        let embedder = FakeEmbedder::default();
        let responder = FakeResponder::default();
        let output = pipeline(&embedder, &responder, 2)
            .run(&texts(&["alpha", "beta", "gamma"]))
            .await
            .unwrap();

        assert_eq!(output.batches, 2);
        assert_eq!(
            *embedder.seen.lock().unwrap(),
            vec![texts(&["alpha", "beta"]), texts(&["gamma"])]
        );

        let indices: Vec<u32> = output.embedding_docs.iter().map(|d| d.index).collect();
        assert_eq!(indices, vec![0, 1, 0]);
        let emb_texts: Vec<&str> = output.embedding_docs.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(emb_texts, vec!["alpha", "beta", "gamma"]);

        let responses = &output.response_docs;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].response, "reply to alpha+beta");
        assert_eq!(responses[1].response, "reply to alpha+beta");
        assert_eq!(responses[0].response_id, responses[1].response_id);
        assert_eq!(responses[2].response, "reply to gamma");
        assert_eq!(responses[2].index, 0);
        assert_eq!(responses[1].text, "beta");
    }

    #[tokio::test]
    async fn test_recovers_after_two_failures_without_duplicates() {
        let embedder = FakeEmbedder {
            failing_calls: vec![1, 2],
            ..Default::default()
        };
        let responder = FakeResponder::default();
        let output = pipeline(&embedder, &responder, 5)
            .run(&texts(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.embedding_docs.len(), 3);
        assert_eq!(output.response_docs.len(), 3);
    }

    #[tokio::test]
    async fn test_response_failure_reissues_both_calls() {
        let embedder = FakeEmbedder::default();
        let responder = FakeResponder {
            failing_calls: vec![1],
            ..Default::default()
        };
        let output = pipeline(&embedder, &responder, 2)
            .run(&texts(&["a", "b"]))
            .await
            .unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(responder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(output.embedding_docs.len(), 2);
        // Vectors come from the successful second embedding call.
        assert!(output.embedding_docs.iter().all(|d| d.embedding[1] == 2.0));
    }

    #[tokio::test]
    async fn test_length_mismatch_is_retried() {
        let embedder = FakeEmbedder {
            short_calls: vec![1],
            ..Default::default()
        };
        let responder = FakeResponder::default();
        let output = pipeline(&embedder, &responder, 3)
            .run(&texts(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        assert_eq!(responder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.embedding_docs.len(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_abort_run() {
        let embedder = FakeEmbedder {
            short_calls: vec![1, 2, 3],
            ..Default::default()
        };
        let responder = FakeResponder::default();
        let err = pipeline(&embedder, &responder, 3)
            .run(&texts(&["a", "b", "c"]))
            .await
            .unwrap_err();

        match err {
            PipelineError::RetriesExhausted {
                batch,
                attempts,
                last_error,
            } => {
                assert_eq!(batch, 0);
                assert_eq!(attempts, 3);
                assert!(matches!(
                    last_error,
                    BatchError::Embedding(RemoteCallError::LengthMismatch {
                        expected: 3,
                        actual: 2
                    })
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(responder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_in_later_batch_discards_earlier_results() {
        let embedder = FakeEmbedder::default();
        let responder = FakeResponder {
            failing_calls: vec![2, 3, 4],
            ..Default::default()
        };
        let err = pipeline(&embedder, &responder, 1)
            .run(&texts(&["first", "second", "third"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::RetriesExhausted {
                batch: 1,
                attempts: 3,
                last_error: BatchError::Response(_)
            }
        ));
        // The third batch is never attempted.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    }

    fn default_timing<'a>(
        embedder: &'a FakeEmbedder,
        responder: &'a FakeResponder,
        batch_size: usize,
    ) -> BatchPipeline<'a> {
        let config = PipelineConfig {
            batch_size,
            ..Default::default()
        };
        BatchPipeline::new(embedder, responder, &ModelConfig::default(), &config)
    }

    /// Paused-clock time advances to timer deadlines in whole milliseconds.
    fn assert_elapsed(start: tokio::time::Instant, expected_ms: u64) {
        let elapsed = start.elapsed();
        let expected = Duration::from_millis(expected_ms);
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(10),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_linearly_between_attempts() {
        let embedder = FakeEmbedder {
            failing_calls: vec![1, 2],
            ..Default::default()
        };
        let responder = FakeResponder::default();
        let start = tokio::time::Instant::now();

        default_timing(&embedder, &responder, 4)
            .run(&texts(&["a", "b"]))
            .await
            .unwrap();

        // 0.5s + 1.0s of backoff, then the 50ms pause after the batch.
        assert_elapsed(start, 1550);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_waits_after_every_attempt() {
        let embedder = FakeEmbedder {
            failing_calls: vec![1, 2, 3],
            ..Default::default()
        };
        let responder = FakeResponder::default();
        let start = tokio::time::Instant::now();

        let result = default_timing(&embedder, &responder, 4)
            .run(&texts(&["a"]))
            .await;

        assert!(result.is_err());
        assert_elapsed(start, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_paced() {
        let embedder = FakeEmbedder::default();
        let responder = FakeResponder::default();
        let start = tokio::time::Instant::now();

        let output = default_timing(&embedder, &responder, 1)
            .run(&texts(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(output.batches, 3);
        assert_elapsed(start, 150);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let embedder = FakeEmbedder::default();
        let responder = FakeResponder::default();
        let err = pipeline(&embedder, &responder, 0)
            .run(&texts(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidBatchSize(0)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
