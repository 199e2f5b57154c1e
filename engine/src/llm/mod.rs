//! Inference Backend Abstraction Layer
//!
//! This module provides the boundary to the external generative-inference
//! backend used by the dish-selection orchestrator. The [`InferenceBackend`]
//! trait defines the contract: a blocking invocation returning the full
//! response text, and a streaming invocation yielding raw text fragments.
//!
//! The backend is stateless per call (the full catalog and instructions are
//! resent every turn) and untrusted: nothing it returns is assumed to parse.

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub mod gemini;

/// Result type for inference operations
pub type Result<T> = std::result::Result<T, InferenceError>;

/// A finite, single-consumer sequence of raw response fragments.
///
/// Not restartable; dropping it cancels consumption with no further effect
/// on the backend.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Errors that can occur while talking to the inference backend
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One content part of an inference request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Part {
    /// Instruction or query text
    Text(String),

    /// Inline binary payload (base64) with its MIME type
    InlineData { mime_type: String, data: String },
}

/// A single-turn request to the inference backend.
///
/// The orchestrator always sends at most one image part followed by one
/// instruction part; the response format is pinned to JSON by the backend
/// implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    pub parts: Vec<Part>,
}

impl InferenceRequest {
    /// Create a text-only request
    pub fn text(instruction: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Text(instruction.into())],
        }
    }

    /// Create a request carrying an inline image ahead of the instruction
    pub fn with_image(
        mime_type: impl Into<String>,
        data: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            parts: vec![
                Part::InlineData {
                    mime_type: mime_type.into(),
                    data: data.into(),
                },
                Part::Text(instruction.into()),
            ],
        }
    }

    /// The concatenated text parts (used for logging sizes, never content)
    pub fn text_len(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                Part::Text(t) => t.len(),
                Part::InlineData { .. } => 0,
            })
            .sum()
    }

    /// Whether the request carries an inline image
    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, Part::InlineData { .. }))
    }
}

/// Raw response from a blocking invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    /// Concatenated candidate text; expected (but not trusted) to be JSON
    pub text: String,
}

/// Inference backend trait
///
/// Implementations are stateless per call. `invoke` suspends until the full
/// response arrives; `invoke_stream` yields fragments as they are produced
/// and the consumer may stop pulling at any point.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Returns the name of the backend (e.g., "gemini")
    fn name(&self) -> &str;

    /// Perform a blocking invocation
    async fn invoke(&self, request: &InferenceRequest) -> Result<RawResponse>;

    /// Perform a streaming invocation
    async fn invoke_stream(&self, request: &InferenceRequest) -> Result<TextStream>;
}
