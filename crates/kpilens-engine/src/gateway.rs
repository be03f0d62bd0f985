use image::DynamicImage;
use tracing::{error, info};

use crate::backends::{GeminiBackend, InferenceBackend, InferenceError, OllamaBackend};
use crate::config::{BackendKind, Settings};

/// Uniform entry point for inference.
///
/// Every failure collapses to `None`; the text of the most recent failure is
/// kept so the caller can tell the user what went wrong.
pub struct InferenceGateway {
    backend: Box<dyn InferenceBackend>,
    last_failure: Option<String>,
}

impl InferenceGateway {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            last_failure: None,
        }
    }

    pub fn from_settings(kind: BackendKind, settings: &Settings) -> anyhow::Result<Self> {
        let backend: Box<dyn InferenceBackend> = match kind {
            BackendKind::Gemini => Box::new(GeminiBackend::new(settings)?),
            BackendKind::Ollama => Box::new(OllamaBackend::new(settings)?),
        };
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend_label(&self) -> String {
        self.backend.label()
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    pub fn vision_infer(&mut self, instruction: &str, images: &[&DynamicImage]) -> Option<String> {
        if images.is_empty() {
            self.last_failure = Some("vision inference needs at least one image".to_string());
            error!(backend = self.backend.name(), "vision call without images");
            return None;
        }
        let result = self.backend.vision(instruction, images);
        self.settle("vision", result)
    }

    pub fn chat_infer(&mut self, prompt: &str) -> Option<String> {
        let result = self.backend.chat(prompt);
        self.settle("chat", result)
    }

    fn settle(&mut self, call: &str, result: Result<String, InferenceError>) -> Option<String> {
        match result {
            Ok(text) => {
                info!(backend = self.backend.name(), call, chars = text.len(), "inference ok");
                self.last_failure = None;
                Some(text)
            }
            Err(err) => {
                error!(backend = self.backend.name(), call, error = %err, "inference failed");
                self.last_failure = Some(err.to_string());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use image::DynamicImage;

    use super::InferenceGateway;
    use crate::backends::scripted::ScriptedBackend;
    use crate::config::{BackendKind, Settings};

    #[test]
    fn successful_call_returns_text_and_clears_failure() {
        let (backend, log) = ScriptedBackend::new(vec![None, Some("Revenue up 8%")]);
        let mut gateway = InferenceGateway::new(Box::new(backend));
        let image = DynamicImage::new_rgb8(2, 2);

        assert_eq!(gateway.vision_infer("analyze", &[&image]), None);
        assert!(gateway.last_failure().is_some());

        assert_eq!(
            gateway.vision_infer("analyze", &[&image]).as_deref(),
            Some("Revenue up 8%")
        );
        assert_eq!(gateway.last_failure(), None);
        assert_eq!(log.calls().len(), 2);
        assert_eq!(log.calls()[1].image_count, 1);
    }

    #[test]
    fn empty_answer_is_no_result() {
        let (backend, _log) = ScriptedBackend::new(vec![Some("   ")]);
        let mut gateway = InferenceGateway::new(Box::new(backend));
        assert_eq!(gateway.chat_infer("hello"), None);
        assert_eq!(
            gateway.last_failure(),
            Some("scripted returned an empty response")
        );
    }

    #[test]
    fn vision_without_images_never_reaches_backend() {
        let (backend, log) = ScriptedBackend::new(vec![Some("YES")]);
        let mut gateway = InferenceGateway::new(Box::new(backend));
        assert_eq!(gateway.vision_infer("analyze", &[]), None);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn gemini_without_key_reports_configuration_failure() -> anyhow::Result<()> {
        let settings = Settings {
            gemini_api_base: "http://127.0.0.1:9/v1beta".to_string(),
            ..Settings::default()
        };
        let mut gateway = InferenceGateway::from_settings(BackendKind::Gemini, &settings)?;
        assert_eq!(gateway.backend_name(), "gemini");
        assert_eq!(gateway.chat_infer("hello"), None);
        assert!(gateway
            .last_failure()
            .is_some_and(|text| text.contains("not configured")));
        Ok(())
    }

    #[test]
    fn ollama_gateway_labels_model() -> anyhow::Result<()> {
        let settings = Settings {
            ollama_model: "llava".to_string(),
            ..Settings::default()
        };
        let gateway = InferenceGateway::from_settings(BackendKind::Ollama, &settings)?;
        assert_eq!(gateway.backend_name(), "ollama");
        assert_eq!(gateway.backend_label(), "Local Model (llava)");
        Ok(())
    }
}
