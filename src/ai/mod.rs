//! AI service integration for image remixing
//!
//! Provides the streamed generation seam used by the remix pipeline, a Gemini
//! implementation, and a scripted mock for tests.

pub mod gemini;
pub mod mime;
pub mod mock;

pub use gemini::GeminiRemixClient;
pub use mock::MockRemixClient;

use crate::models::{GenerationRequest, ResponseChunk};
use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite, non-restartable sequence of response chunks.
pub type ChunkStream = BoxStream<'static, Result<ResponseChunk>>;

#[async_trait]
pub trait RemixService: Send + Sync {
    /// Send one request and open its response stream.
    async fn stream_generate(&self, request: &GenerationRequest) -> Result<ChunkStream>;
}
