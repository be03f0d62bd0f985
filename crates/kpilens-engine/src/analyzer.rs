use std::path::Path;

use anyhow::Result;
use image::DynamicImage;
use kpilens_contracts::chat::ChatRole;
use kpilens_contracts::events::{EventLog, EventPayload};
use kpilens_contracts::report::AnalysisReport;
use kpilens_contracts::similarity::SimilarityVerdict;
use kpilens_contracts::validation::rejection_message;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BackendKind, Settings};
use crate::gateway::InferenceGateway;
use crate::imaging::load_image;
use crate::session::{DashboardContext, DashboardKey};
use crate::similarity::detect_similarity;
use crate::validator::is_dashboard;

/// Why a user action was refused. Display text is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Please enter the dashboard objective to proceed with analysis.")]
    MissingObjective,
    #[error("Please enter a question.")]
    EmptyQuestion,
    #[error("{0}")]
    NotADashboard(String),
    #[error("{0}")]
    TooSimilar(String),
    #[error(
        "Failed to process the request. Please check your API key or local model setup. ({reason})"
    )]
    InferenceUnavailable { reason: String },
    #[error("Error creating session: {0}")]
    SessionNotCreated(String),
    #[error("Please upload and analyze a dashboard first.")]
    NoActiveSession,
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingObjective => "missing_objective",
            Self::EmptyQuestion => "empty_question",
            Self::NotADashboard(_) => "not_a_dashboard",
            Self::TooSimilar(_) => "too_similar",
            Self::InferenceUnavailable { .. } => "inference_unavailable",
            Self::SessionNotCreated(_) => "session_not_created",
            Self::NoActiveSession => "no_active_session",
        }
    }
}

/// One dashboard image as handed in by the user.
#[derive(Debug, Clone)]
pub struct DashboardUpload {
    pub image: DynamicImage,
    pub filename: String,
    pub objective: String,
}

impl DashboardUpload {
    pub fn new(image: DynamicImage, filename: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            image,
            filename: filename.into(),
            objective: objective.into(),
        }
    }

    pub fn from_path(path: &Path, objective: impl Into<String>) -> Result<Self> {
        let image = load_image(path)?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("dashboard")
            .to_string();
        Ok(Self::new(image, filename, objective))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonOutcome {
    pub similarity_message: String,
    pub narrative: String,
}

/// Runs each user action as one synchronous sequence of gates and inference
/// calls against the context it owns.
pub struct Analyzer {
    gateway: InferenceGateway,
    context: DashboardContext,
    events: Option<EventLog>,
}

impl Analyzer {
    pub fn new(gateway: InferenceGateway) -> Self {
        Self {
            gateway,
            context: DashboardContext::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn context(&self) -> &DashboardContext {
        &self.context
    }

    pub fn clear_chat(&mut self) {
        self.context.clear_chat();
    }

    pub fn backend_name(&self) -> &str {
        self.gateway.backend_name()
    }

    /// Footer text naming the backend that serves requests.
    pub fn backend_label(&self) -> String {
        format!("Powered by {}", self.gateway.backend_label())
    }

    /// Sessions survive the switch; only future calls go to the new backend.
    pub fn switch_backend(&mut self, kind: BackendKind, settings: &Settings) -> Result<()> {
        self.gateway = InferenceGateway::from_settings(kind, settings)?;
        info!(backend = self.gateway.backend_name(), "backend switched");
        Ok(())
    }

    pub fn validate(&mut self, image: &DynamicImage, label: &str) -> bool {
        let valid = is_dashboard(&mut self.gateway, image);
        self.record(
            "dashboard_validated",
            json!({
                "label": label,
                "valid": valid,
                "backend": self.gateway.backend_name(),
            }),
        );
        valid
    }

    pub fn check_similarity(&mut self, first: &DynamicImage, second: &DynamicImage) -> SimilarityVerdict {
        let verdict = detect_similarity(&mut self.gateway, first, second);
        self.record(
            "similarity_checked",
            json!({
                "level": verdict.level.as_str(),
                "score": verdict.score,
                "proceed": verdict.should_proceed(),
            }),
        );
        verdict
    }

    /// Validates and analyzes one dashboard, replacing the single session.
    pub fn analyze(&mut self, upload: DashboardUpload) -> Result<String, Rejection> {
        self.run_analyze(upload)
            .map_err(|rejection| self.reject("analyze", rejection))
    }

    fn run_analyze(&mut self, upload: DashboardUpload) -> Result<String, Rejection> {
        let DashboardUpload {
            image,
            filename,
            objective,
        } = upload;
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(Rejection::MissingObjective);
        }
        if !self.validate(&image, &filename) {
            return Err(Rejection::NotADashboard(rejection_message(None)));
        }
        let analysis = self.infer_analysis(objective, &image)?;
        self.store(DashboardKey::Single, image, &filename, objective, &analysis)?;
        Ok(analysis)
    }

    /// Validates, gates on similarity, analyzes both dashboards and asks for
    /// a comparative write-up. Any rejection restores the prior context.
    pub fn compare(
        &mut self,
        first: DashboardUpload,
        second: DashboardUpload,
    ) -> Result<ComparisonOutcome, Rejection> {
        let snapshot = self.context.clone();
        match self.run_compare(first, second) {
            Ok(outcome) => Ok(outcome),
            Err(rejection) => {
                self.context = snapshot;
                Err(self.reject("compare", rejection))
            }
        }
    }

    fn run_compare(
        &mut self,
        first: DashboardUpload,
        second: DashboardUpload,
    ) -> Result<ComparisonOutcome, Rejection> {
        if first.objective.trim().is_empty() || second.objective.trim().is_empty() {
            return Err(Rejection::MissingObjective);
        }
        for (label, upload) in [("Dashboard 1", &first), ("Dashboard 2", &second)] {
            if !self.validate(&upload.image, label) {
                return Err(Rejection::NotADashboard(rejection_message(Some(label))));
            }
        }

        let verdict = self.check_similarity(&first.image, &second.image);
        let similarity_message = verdict.message();
        if !verdict.should_proceed() {
            return Err(Rejection::TooSimilar(similarity_message));
        }

        let first_analysis = self.infer_analysis(first.objective.trim(), &first.image)?;
        let second_analysis = self.infer_analysis(second.objective.trim(), &second.image)?;
        self.store(
            DashboardKey::DashboardOne,
            first.image,
            &first.filename,
            first.objective.trim(),
            &first_analysis,
        )?;
        self.store(
            DashboardKey::DashboardTwo,
            second.image,
            &second.filename,
            second.objective.trim(),
            &second_analysis,
        )?;

        let prompt = self
            .context
            .comparison_prompt()
            .ok_or_else(|| Rejection::SessionNotCreated("comparison sessions missing".to_string()))?;
        let narrative = self
            .gateway
            .chat_infer(&prompt)
            .ok_or_else(|| self.unavailable())?;
        self.context
            .record_comparison(&narrative)
            .map_err(|err| Rejection::SessionNotCreated(format!("{err:#}")))?;
        self.record(
            "comparison_completed",
            json!({
                "first": first.filename,
                "second": second.filename,
                "similarity_level": verdict.level.as_str(),
                "similarity_score": verdict.score,
            }),
        );
        Ok(ComparisonOutcome {
            similarity_message,
            narrative,
        })
    }

    /// Follow-up question about whatever is current. Nothing is appended to
    /// the transcript unless the backend answers.
    pub fn ask(&mut self, question: &str) -> Result<String, Rejection> {
        self.run_ask(question)
            .map_err(|rejection| self.reject("ask", rejection))
    }

    fn run_ask(&mut self, question: &str) -> Result<String, Rejection> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Rejection::EmptyQuestion);
        }
        let prompt = self
            .context
            .build_chat_prompt(question)
            .ok_or(Rejection::NoActiveSession)?;
        let answer = self
            .gateway
            .chat_infer(&prompt)
            .ok_or_else(|| self.unavailable())?;
        self.context
            .add_chat_message(ChatRole::User, question)
            .and_then(|()| self.context.add_chat_message(ChatRole::Assistant, &answer))
            .map_err(|_| Rejection::NoActiveSession)?;
        self.record(
            "chat_turn",
            json!({
                "comparison": self.context.in_comparison_mode(),
                "history_len": self.context.chat_history().len(),
            }),
        );
        Ok(answer)
    }

    pub fn report(&self) -> Option<AnalysisReport> {
        self.context.report()
    }

    fn infer_analysis(&mut self, objective: &str, image: &DynamicImage) -> Result<String, Rejection> {
        self.gateway
            .vision_infer(objective, &[image])
            .ok_or_else(|| self.unavailable())
    }

    fn store(
        &mut self,
        key: DashboardKey,
        image: DynamicImage,
        filename: &str,
        objective: &str,
        analysis: &str,
    ) -> Result<(), Rejection> {
        let backend = self.gateway.backend_label();
        let fingerprint = self
            .context
            .create_session(key, image, filename, objective, analysis, &backend)
            .map(|session| session.fingerprint.clone())
            .map_err(|err| Rejection::SessionNotCreated(format!("{err:#}")))?;
        self.record(
            "session_created",
            json!({
                "key": key.as_str(),
                "filename": filename,
                "fingerprint": fingerprint,
                "backend": backend,
            }),
        );
        Ok(())
    }

    fn unavailable(&self) -> Rejection {
        Rejection::InferenceUnavailable {
            reason: self
                .gateway
                .last_failure()
                .unwrap_or("no response from backend")
                .to_string(),
        }
    }

    fn reject(&self, action: &str, rejection: Rejection) -> Rejection {
        warn!(action, kind = rejection.kind(), "action rejected");
        self.record(
            "action_rejected",
            json!({
                "action": action,
                "reason": rejection.kind(),
            }),
        );
        rejection
    }

    fn record(&self, event_type: &str, payload: Value) {
        let Some(events) = &self.events else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            _ => EventPayload::new(),
        };
        if let Err(err) = events.emit(event_type, payload) {
            warn!(event_type, error = %err, "failed to append event");
        }
    }
}
