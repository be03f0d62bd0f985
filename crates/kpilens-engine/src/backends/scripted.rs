//! In-process backend that replays queued answers and records every call.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use image::DynamicImage;

use super::{InferenceBackend, InferenceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub kind: &'static str,
    pub prompt: String,
    pub image_count: usize,
}

#[derive(Clone, Default)]
pub(crate) struct CallLog(Arc<Mutex<Vec<RecordedCall>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn push(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call);
        }
    }
}

pub(crate) struct ScriptedBackend {
    answers: Mutex<VecDeque<Option<String>>>,
    log: CallLog,
}

impl ScriptedBackend {
    /// `None` entries simulate a transport failure.
    pub fn new(answers: Vec<Option<&str>>) -> (Self, CallLog) {
        let log = CallLog::default();
        let backend = Self {
            answers: Mutex::new(
                answers
                    .into_iter()
                    .map(|answer| answer.map(str::to_string))
                    .collect(),
            ),
            log: log.clone(),
        };
        (backend, log)
    }

    fn next(&self) -> Result<String, InferenceError> {
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front())
            .flatten();
        match answer {
            Some(text) if !text.trim().is_empty() => Ok(text),
            Some(_) => Err(InferenceError::EmptyResponse { backend: "scripted" }),
            None => Err(InferenceError::Backend {
                backend: "scripted",
                status: 503,
                body: "scripted outage".to_string(),
            }),
        }
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn label(&self) -> String {
        "Scripted Model".to_string()
    }

    fn vision(&self, instruction: &str, images: &[&DynamicImage]) -> Result<String, InferenceError> {
        self.log.push(RecordedCall {
            kind: "vision",
            prompt: instruction.to_string(),
            image_count: images.len(),
        });
        self.next()
    }

    fn chat(&self, prompt: &str) -> Result<String, InferenceError> {
        self.log.push(RecordedCall {
            kind: "chat",
            prompt: prompt.to_string(),
            image_count: 0,
        });
        self.next()
    }
}
