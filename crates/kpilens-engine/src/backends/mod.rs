//! Vision-language backends behind one call contract.

mod gemini;
mod ollama;
#[cfg(test)]
pub(crate) mod scripted;

use image::DynamicImage;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;
use thiserror::Error;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("{backend} is not configured: {detail}")]
    MissingConfig {
        backend: &'static str,
        detail: String,
    },
    #[error("{backend} request failed: {source}")]
    Transport {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} request failed ({status}): {body}")]
    Backend {
        backend: &'static str,
        status: u16,
        body: String,
    },
    #[error("{backend} returned an unreadable payload: {detail}")]
    Payload {
        backend: &'static str,
        detail: String,
    },
    #[error("{backend} returned an empty response")]
    EmptyResponse { backend: &'static str },
    #[error("failed to prepare images for {backend}: {detail}")]
    Staging {
        backend: &'static str,
        detail: String,
    },
}

/// A vision-language model reachable over one transport.
///
/// `vision` sends an instruction with ordered images; `chat` sends text only.
/// One attempt per call, no retries.
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;
    /// Human-readable provenance, e.g. for footers and stored sessions.
    fn label(&self) -> String;
    fn vision(&self, instruction: &str, images: &[&DynamicImage]) -> Result<String, InferenceError>;
    fn chat(&self, prompt: &str) -> Result<String, InferenceError>;
}

/// Blocking client with no request timeout: a hung backend blocks the action.
pub(crate) fn http_client() -> anyhow::Result<HttpClient> {
    Ok(HttpClient::builder()
        .timeout(None::<std::time::Duration>)
        .build()?)
}

pub(crate) fn response_json_or_error(
    backend: &'static str,
    response: HttpResponse,
) -> Result<Value, InferenceError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|source| InferenceError::Transport { backend, source })?;
    if !status.is_success() {
        return Err(InferenceError::Backend {
            backend,
            status: status.as_u16(),
            body: truncate_text(&body, 512),
        });
    }
    serde_json::from_str(&body).map_err(|err| InferenceError::Payload {
        backend,
        detail: err.to_string(),
    })
}

pub(crate) fn non_empty_text(backend: &'static str, text: String) -> Result<String, InferenceError> {
    if text.trim().is_empty() {
        return Err(InferenceError::EmptyResponse { backend });
    }
    Ok(text)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
