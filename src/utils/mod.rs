//! Utility modules.

pub mod input;
pub mod retry;

pub use input::{InputSource, read_texts};
pub use retry::{RetryConfig, RetryResult, with_retry};
