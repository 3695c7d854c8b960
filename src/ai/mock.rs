use super::{ChunkStream, RemixService};
use crate::models::{GenerationRequest, ResponseChunk, ResponsePart};
use crate::{Error, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex};

/// A 1x1 PNG.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 pixel
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44,
    0x41, // IDAT chunk
    0x54, 0x08, 0x99, 0x63, 0xF8, 0xCF, 0xC0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0xE2, 0x25,
    0x00, 0xBC, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, // IEND chunk
    0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// One scripted stream item.
#[derive(Debug, Clone)]
pub enum MockEvent {
    Chunk(ResponseChunk),
    /// Fails the stream at this point with a transport error.
    Fail(String),
}

#[derive(Debug, Clone)]
enum MockResponse {
    Stream(Vec<MockEvent>),
    OpenError(String),
}

#[derive(Clone)]
pub struct MockRemixClient {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockRemixClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_stream(self, events: Vec<MockEvent>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::Stream(events));
        self
    }

    /// Script a stream made only of successful chunks.
    pub fn with_chunks(self, chunks: Vec<ResponseChunk>) -> Self {
        self.with_stream(chunks.into_iter().map(MockEvent::Chunk).collect())
    }

    /// Script a failure to open the stream at all.
    pub fn with_open_error(self, message: String) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push(MockResponse::OpenError(message));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn received_requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockRemixClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemixService for MockRemixClient {
    async fn stream_generate(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        let count = {
            let mut count = self.call_count.lock().unwrap();
            *count += 1;
            *count
        };
        self.requests.lock().unwrap().push(request.clone());

        let response = {
            let responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                // Default: one chunk carrying a tiny PNG
                MockResponse::Stream(vec![MockEvent::Chunk(ResponseChunk::new(vec![
                    ResponsePart::Image {
                        data: TINY_PNG.to_vec(),
                        mime_type: "image/png".to_string(),
                    },
                ]))])
            } else {
                responses[(count - 1) % responses.len()].clone()
            }
        };

        match response {
            MockResponse::OpenError(message) => Err(Error::AiProvider(message)),
            MockResponse::Stream(events) => Ok(stream::iter(events.into_iter().map(|event| {
                match event {
                    MockEvent::Chunk(chunk) => Ok(chunk),
                    MockEvent::Fail(message) => Err(Error::AiProvider(message)),
                }
            }))
            .boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn request() -> GenerationRequest {
        GenerationRequest {
            images: Vec::new(),
            instruction: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_default_stream_has_one_png() {
        let client = MockRemixClient::new();
        let chunks: Vec<ResponseChunk> = client
            .stream_generate(&request())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert!(matches!(
            &chunks[0].parts[0],
            ResponsePart::Image { mime_type, .. } if mime_type == "image/png"
        ));
    }

    #[tokio::test]
    async fn test_mock_cycles_scripted_responses() {
        let client = MockRemixClient::new()
            .with_chunks(vec![ResponseChunk::new(vec![ResponsePart::Text(
                "first".to_string(),
            )])])
            .with_open_error("unavailable".to_string());

        assert!(client.stream_generate(&request()).await.is_ok());
        assert!(client.stream_generate(&request()).await.is_err());
        assert!(client.stream_generate(&request()).await.is_ok());
        assert_eq!(client.get_call_count(), 3);
        assert_eq!(client.received_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_fail_event_errors_mid_stream() {
        let client = MockRemixClient::new().with_stream(vec![
            MockEvent::Chunk(ResponseChunk::default()),
            MockEvent::Fail("reset".to_string()),
        ]);

        let mut stream = client.stream_generate(&request()).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
