//! Gemini inference backend
//!
//! Implements [`InferenceBackend`] against the Gemini REST API. Responses
//! are requested as JSON (`responseMimeType: application/json`) with a low,
//! configurable temperature. Streaming uses the SSE endpoint
//! (`streamGenerateContent?alt=sse`) and yields the text of each event as
//! one fragment.
//!
//! Policy toward the backend: one attempt per call with a bounded request
//! timeout, no retries or backoff.

use super::{InferenceBackend, InferenceError, InferenceRequest, Part, RawResponse, TextStream};
use crate::config::GeminiConfig;
use crate::secrets::SecretString;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

pub struct GeminiBackend {
    config: GeminiConfig,
    api_key: SecretString,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a new Gemini backend.
    ///
    /// The API key is passed in explicitly (resolved from the environment by
    /// the caller) so tests can construct the backend against a mock server
    /// without touching process state.
    pub fn new(config: GeminiConfig, api_key: SecretString) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| InferenceError::Network(e.to_string()))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn endpoint(&self, method: &str, query: &str) -> String {
        format!(
            "{}/models/{}:{}?{}key={}",
            self.config.base_url,
            self.config.model,
            method,
            query,
            self.api_key.unsecure()
        )
    }

    fn request_body(&self, request: &InferenceRequest) -> serde_json::Value {
        let parts: Vec<serde_json::Value> = request
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => json!({ "text": text }),
                Part::InlineData { mime_type, data } => json!({
                    "inlineData": { "mimeType": mime_type, "data": data }
                }),
            })
            .collect();

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": self.config.temperature
            }
        })
    }

    async fn send(
        &self,
        url: &str,
        request: &InferenceRequest,
    ) -> Result<reqwest::Response, InferenceError> {
        tracing::debug!(
            "Gemini request: model={}, text_chars={}, image={}",
            self.config.model,
            request.text_len(),
            request.has_image()
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else if e.is_connect() {
                    InferenceError::Unavailable(format!(
                        "Cannot connect to Gemini at {}",
                        self.config.base_url
                    ))
                } else {
                    InferenceError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                400 | 404 => InferenceError::InvalidRequest(text),
                429 => InferenceError::RateLimited,
                401 | 403 => InferenceError::AuthenticationFailed(text),
                _ => InferenceError::Unavailable(format!("Gemini API error ({}): {}", status, text)),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn invoke(&self, request: &InferenceRequest) -> super::Result<RawResponse> {
        let url = self.endpoint("generateContent", "");
        let response = self.send(&url, request).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InferenceError::Parse(e.to_string()))?;

        let text = extract_candidate_text(&data)?;
        Ok(RawResponse { text })
    }

    async fn invoke_stream(&self, request: &InferenceRequest) -> super::Result<TextStream> {
        let url = self.endpoint("streamGenerateContent", "alt=sse&");
        let response = self.send(&url, request).await?;

        let fragments = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| InferenceError::Network(e.to_string())))
            .scan(Vec::new(), |buffer: &mut Vec<u8>, chunk| {
                let out = match chunk {
                    Ok(bytes) => {
                        buffer.extend_from_slice(&bytes);
                        drain_sse_events(buffer)
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(out))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(fragments))
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_candidate_text(data: &serde_json::Value) -> Result<String, InferenceError> {
    let candidate = data
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| InferenceError::Parse("No candidates in response".to_string()))?;

    let parts = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| InferenceError::Parse("No parts in candidate content".to_string()))?;

    let mut full_text = String::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            full_text.push_str(text);
        }
    }

    Ok(full_text)
}

/// Pull every complete SSE event out of the buffer and map it to fragments.
///
/// Events are delimited by a blank line. Splitting happens on raw bytes so a
/// chunk boundary inside a multi-byte character cannot corrupt the payload;
/// only complete events are decoded.
fn drain_sse_events(buffer: &mut Vec<u8>) -> Vec<Result<String, InferenceError>> {
    let mut fragments = Vec::new();

    while let Some((event_len, delimiter_len)) = find_event_end(buffer) {
        let mut event: Vec<u8> = buffer.drain(..event_len + delimiter_len).collect();
        event.truncate(event_len);

        let event_text = String::from_utf8_lossy(&event);
        for line in event_text.lines() {
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() || payload == "[DONE]" {
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) => match extract_candidate_text(&value) {
                    Ok(text) if !text.is_empty() => fragments.push(Ok(text)),
                    Ok(_) => {}
                    Err(e) => fragments.push(Err(e)),
                },
                Err(e) => fragments.push(Err(InferenceError::Parse(e.to_string()))),
            }
        }
    }

    fragments
}

/// Find the end of the first complete event: (event length, delimiter length).
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");

    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((b, 4)),
        (Some(a), _) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({
                "candidates": [{ "content": { "parts": [{ "text": text }] } }]
            })
        )
    }

    #[test]
    fn test_extract_candidate_text_concatenates_parts() {
        let data = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"resu" }, { "text": "lts\":[]}" }] }
            }]
        });

        assert_eq!(extract_candidate_text(&data).unwrap(), "{\"results\":[]}");
    }

    #[test]
    fn test_extract_candidate_text_rejects_empty_response() {
        assert!(extract_candidate_text(&json!({})).is_err());
        assert!(extract_candidate_text(&json!({ "candidates": [] })).is_err());
    }

    #[test]
    fn test_drain_sse_events_complete_event() {
        let mut buffer = event("hello").into_bytes();
        let fragments = drain_sse_events(&mut buffer);

        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_sse_events_keeps_partial_event() {
        let full = event("later");
        let (head, tail) = full.split_at(10);

        let mut buffer = head.as_bytes().to_vec();
        assert!(drain_sse_events(&mut buffer).is_empty());

        buffer.extend_from_slice(tail.as_bytes());
        let fragments = drain_sse_events(&mut buffer);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "later");
    }

    #[test]
    fn test_drain_sse_events_multiple_events_one_chunk() {
        let mut buffer = format!("{}{}", event("a"), event("b")).into_bytes();
        let fragments = drain_sse_events(&mut buffer);

        let texts: Vec<_> = fragments
            .into_iter()
            .map(|f| f.unwrap())
            .collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_drain_sse_events_crlf_delimiter() {
        let body = json!({
            "candidates": [{ "content": { "parts": [{ "text": "crlf" }] } }]
        });
        let mut buffer = format!("data: {}\r\n\r\n", body).into_bytes();

        let fragments = drain_sse_events(&mut buffer);
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref().unwrap(), "crlf");
    }

    #[test]
    fn test_drain_sse_events_ignores_done_marker() {
        let mut buffer = b"data: [DONE]\n\n".to_vec();
        assert!(drain_sse_events(&mut buffer).is_empty());
    }
}
