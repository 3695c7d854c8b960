use super::client::GeminiHttpClient;
use super::types::{
    Content, GenerateContentResponse, GenerationConfig, InlineData, Part, StreamRequest,
};
use crate::ai::{ChunkStream, RemixService};
use crate::models::{GenerationRequest, ResponseChunk, ResponsePart};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{future, StreamExt};
use std::time::Duration;

/// Streams mixed image/text generations from a Gemini image model.
pub struct GeminiRemixClient {
    http: GeminiHttpClient,
}

impl GeminiRemixClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, reqwest::Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: reqwest::Client) -> Self {
        Self {
            http: GeminiHttpClient::new_with_client(
                api_key,
                model,
                Duration::from_secs(120),
                client,
            ),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    fn build_request(request: &GenerationRequest) -> StreamRequest {
        let mut parts: Vec<Part> = request
            .images
            .iter()
            .map(|image| Part::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&image.data),
                },
            })
            .collect();
        parts.push(Part::Text {
            text: request.instruction.clone(),
        });

        StreamRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
            },
        }
    }
}

/// Decode one SSE `data:` payload into a chunk. Only the first candidate is used.
pub(crate) fn parse_chunk(data: &str) -> Result<ResponseChunk> {
    let response: GenerateContentResponse = serde_json::from_str(data).map_err(|e| {
        tracing::error!("Failed to parse Gemini stream chunk: {}\nData: {}", e, data);
        Error::AiProvider(format!("Failed to parse Gemini stream chunk: {}", e))
    })?;

    if let Some(err) = response.error {
        return Err(Error::AiProvider(format!(
            "Gemini stream error ({}): {}",
            err.status
                .or_else(|| err.code.map(|c| c.to_string()))
                .unwrap_or_else(|| "unknown".to_string()),
            err.message
        )));
    }

    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        tracing::warn!("Gemini blocked the prompt: {}", reason);
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(ResponseChunk::default());
    };
    if let Some(reason) = &candidate.finish_reason {
        tracing::debug!("Gemini finish reason: {}", reason);
    }

    let mut parts = Vec::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        match part {
            Part::InlineData { inline_data } if !inline_data.data.is_empty() => {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(&inline_data.data)
                    .map_err(|e| {
                        Error::AiProvider(format!("Failed to decode Gemini base64 image: {}", e))
                    })?;
                parts.push(ResponsePart::Image {
                    data,
                    mime_type: inline_data.mime_type,
                });
            }
            Part::Text { text } if !text.is_empty() => parts.push(ResponsePart::Text(text)),
            _ => {}
        }
    }

    Ok(ResponseChunk::new(parts))
}

#[async_trait]
impl RemixService for GeminiRemixClient {
    async fn stream_generate(&self, request: &GenerationRequest) -> Result<ChunkStream> {
        tracing::info!(
            "Remixing with {} images via {} and prompt: {}",
            request.images.len(),
            self.http.model(),
            request.instruction
        );

        let response = self
            .http
            .stream_generate_content(&Self::build_request(request))
            .await?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| {
                future::ready(match event {
                    Ok(event) if event.data.trim().is_empty() => None,
                    Ok(event) => Some(parse_chunk(&event.data)),
                    Err(EventStreamError::Transport(e)) => Some(Err(Error::Http(e))),
                    Err(e) => Some(Err(Error::AiProvider(format!(
                        "Malformed Gemini event stream: {}",
                        e
                    )))),
                })
            });

        Ok(chunks.boxed())
    }
}
