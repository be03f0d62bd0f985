use std::fs;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::DynamicImage;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::debug;

use super::{
    http_client, non_empty_text, response_json_or_error, InferenceBackend, InferenceError,
};
use crate::config::Settings;
use crate::imaging::encode_jpeg;

const BACKEND: &str = "ollama";

/// Local Ollama server via `/api/chat`.
///
/// Images are staged as JPEG files in a per-call temporary directory; the
/// directory is removed when the call returns, whatever the outcome.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    scratch_root: Option<PathBuf>,
    http: HttpClient,
}

/// Staged files for one call. Dropping it deletes the directory.
struct StagedImages {
    _dir: TempDir,
    paths: Vec<PathBuf>,
}

impl OllamaBackend {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: settings.ollama_url.clone(),
            model: settings.ollama_model.clone(),
            scratch_root: None,
            http: http_client()?,
        })
    }

    /// Stage images under `root` instead of the system temp directory.
    #[cfg(test)]
    fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn ensure_configured(&self) -> Result<(), InferenceError> {
        if self.base_url.trim().is_empty() {
            return Err(InferenceError::MissingConfig {
                backend: BACKEND,
                detail: "OLLAMA_API_URL is empty".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(InferenceError::MissingConfig {
                backend: BACKEND,
                detail: "OLLAMA_MODEL_NAME is empty".to_string(),
            });
        }
        Ok(())
    }

    fn stage_images(&self, images: &[&DynamicImage]) -> Result<StagedImages, InferenceError> {
        let staging_err = |detail: String| InferenceError::Staging {
            backend: BACKEND,
            detail,
        };
        let mut builder = tempfile::Builder::new();
        builder.prefix("kpilens-ollama-");
        let dir = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|err| staging_err(format!("temp dir: {err}")))?;

        let mut paths = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let path = dir.path().join(format!("image_{idx}.jpg"));
            let bytes = encode_jpeg(image).map_err(|err| staging_err(format!("{err:#}")))?;
            fs::write(&path, bytes)
                .map_err(|err| staging_err(format!("write {}: {err}", path.display())))?;
            paths.push(path);
        }
        Ok(StagedImages { _dir: dir, paths })
    }

    /// The HTTP API takes image data, so each staged file is read back and
    /// embedded, the same way the ollama client treats image paths.
    fn encode_staged(paths: &[PathBuf]) -> Result<Vec<String>, InferenceError> {
        paths
            .iter()
            .map(|path| {
                fs::read(path)
                    .map(|bytes| BASE64.encode(bytes))
                    .map_err(|err| InferenceError::Staging {
                        backend: BACKEND,
                        detail: format!("read {}: {err}", path.display()),
                    })
            })
            .collect()
    }

    fn chat_payload(&self, content: &str, images: Option<Vec<String>>) -> Value {
        let mut message = json!({
            "role": "user",
            "content": content,
        });
        if let Some(images) = images {
            message["images"] = json!(images);
        }
        json!({
            "model": self.model,
            "stream": false,
            "messages": [message],
        })
    }

    fn post_chat(&self, payload: &Value) -> Result<String, InferenceError> {
        let endpoint = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        debug!(endpoint = %endpoint, model = %self.model, "sending Ollama request");
        let response = self
            .http
            .post(&endpoint)
            .json(payload)
            .send()
            .map_err(|source| InferenceError::Transport {
                backend: BACKEND,
                source,
            })?;
        let response_payload = response_json_or_error(BACKEND, response)?;
        non_empty_text(BACKEND, Self::extract_content(&response_payload))
    }

    fn extract_content(response_payload: &Value) -> String {
        response_payload
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

impl StagedImages {
    #[cfg(test)]
    fn dir_path(&self) -> &std::path::Path {
        self._dir.path()
    }
}

impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        BACKEND
    }

    fn label(&self) -> String {
        format!("Local Model ({})", self.model)
    }

    fn vision(&self, instruction: &str, images: &[&DynamicImage]) -> Result<String, InferenceError> {
        self.ensure_configured()?;
        let staged = self.stage_images(images)?;
        let encoded = Self::encode_staged(&staged.paths)?;
        let payload = self.chat_payload(instruction, Some(encoded));
        let result = self.post_chat(&payload);
        drop(staged);
        result
    }

    fn chat(&self, prompt: &str) -> Result<String, InferenceError> {
        self.ensure_configured()?;
        let payload = self.chat_payload(prompt, None);
        self.post_chat(&payload)
    }
}
