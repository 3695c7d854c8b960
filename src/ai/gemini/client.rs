use crate::{Error, Result};
use reqwest::{Client, Response};
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Lightweight Gemini REST client for streamed `generateContent` calls.
pub struct GeminiHttpClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiHttpClient {
    /// Construct a Gemini client.
    ///
    /// `model` should be the bare model ID (for example
    /// `gemini-2.5-flash-image-preview`), not a `models/...`-prefixed path segment.
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        Self::new_with_client(api_key, model, timeout, Client::new())
    }

    pub fn new_with_client(
        api_key: String,
        model: String,
        timeout: Duration,
        client: Client,
    ) -> Self {
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();

        Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Returns the configured model ID without the `models/` prefix.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Calls `streamGenerateContent` in SSE mode and returns the open response.
    ///
    /// Non-success statuses are turned into errors before any body is streamed.
    pub async fn stream_generate_content<Req: Serialize>(&self, request: &Req) -> Result<Response> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(Error::AiProvider(format!(
                "Gemini API error (status {}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_prefix_is_stripped() {
        let client = GeminiHttpClient::new(
            "key".to_string(),
            "models/gemini-2.5-flash-image".to_string(),
            Duration::from_secs(1),
        );
        assert_eq!(client.model(), "gemini-2.5-flash-image");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = GeminiHttpClient::new(
            "key".to_string(),
            "gemini".to_string(),
            Duration::from_secs(1),
        )
        .with_base_url("http://127.0.0.1:9999/".to_string());
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }
}
