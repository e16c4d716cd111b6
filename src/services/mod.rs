mod batch;
mod builder;
mod embedding;
mod response;
pub mod store;

pub use batch::{BatchPipeline, PipelineOutput, partition};
pub use builder::{build_embedding_docs, build_response_docs};
pub use embedding::{Embedder, EmbeddingClient};
pub use response::{Responder, ResponseClient, interpret_response};
pub use store::{DocumentStore, SaveReport, open_store, persist, save_documents};
