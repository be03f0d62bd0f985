use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    http_client, non_empty_text, response_json_or_error, InferenceBackend, InferenceError,
};
use crate::config::{Settings, GEMINI_MODEL};
use crate::imaging::encode_jpeg;

const BACKEND: &str = "gemini";

/// Remote Gemini vision model via `generateContent`.
pub struct GeminiBackend {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl GeminiBackend {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            api_base: settings.gemini_api_base.clone(),
            api_key: settings.gemini_api_key.clone(),
            http: http_client()?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, GEMINI_MODEL)
    }

    fn api_key(&self) -> Result<&str, InferenceError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| InferenceError::MissingConfig {
                backend: BACKEND,
                detail: "GEMINI_API_KEY or GOOGLE_API_KEY not set".to_string(),
            })
    }

    /// Instruction first, then each image as inline JPEG data, in order.
    fn build_parts(instruction: &str, images: &[&DynamicImage]) -> Result<Vec<Value>, InferenceError> {
        let mut parts = vec![json!({ "text": instruction })];
        for image in images {
            let bytes = encode_jpeg(image).map_err(|err| InferenceError::Staging {
                backend: BACKEND,
                detail: format!("{err:#}"),
            })?;
            parts.push(json!({
                "inlineData": {
                    "mimeType": "image/jpeg",
                    "data": BASE64.encode(bytes),
                }
            }));
        }
        Ok(parts)
    }

    fn generate(&self, parts: Vec<Value>) -> Result<String, InferenceError> {
        let api_key = self.api_key()?;
        let endpoint = self.endpoint();
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }]
        });
        debug!(endpoint = %endpoint, "sending Gemini request");
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .json(&payload)
            .send()
            .map_err(|source| InferenceError::Transport {
                backend: BACKEND,
                source,
            })?;
        let response_payload = response_json_or_error(BACKEND, response)?;
        non_empty_text(BACKEND, Self::extract_text(&response_payload))
    }

    fn extract_text(response_payload: &Value) -> String {
        response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect::<Vec<&str>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    fn label(&self) -> String {
        "Gemini Pro Vision Model".to_string()
    }

    fn vision(&self, instruction: &str, images: &[&DynamicImage]) -> Result<String, InferenceError> {
        self.api_key()?;
        let parts = Self::build_parts(instruction, images)?;
        self.generate(parts)
    }

    fn chat(&self, prompt: &str) -> Result<String, InferenceError> {
        self.generate(vec![json!({ "text": prompt })])
    }
}
