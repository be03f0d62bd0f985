use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use image::DynamicImage;
use indexmap::IndexMap;
use kpilens_contracts::chat::{ChatMessage, ChatRole, ChatTranscript, CHAT_HISTORY_WINDOW};
use kpilens_contracts::prompts::{
    chat_prompt, comparison_chat_prompt, comparison_prompt, DashboardBrief,
};
use kpilens_contracts::report::AnalysisReport;

use crate::imaging::encode_portable;

/// Storage slot for an analyzed dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardKey {
    Single,
    DashboardOne,
    DashboardTwo,
}

impl DashboardKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::DashboardOne => "dashboard_one",
            Self::DashboardTwo => "dashboard_two",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, Self::DashboardOne | Self::DashboardTwo)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub key: DashboardKey,
    pub image: DynamicImage,
    pub image_base64: String,
    pub fingerprint: String,
    pub filename: String,
    pub objective: String,
    pub analysis: String,
    pub backend_used: String,
    pub created_at: String,
}

impl Session {
    fn brief(&self) -> DashboardBrief<'_> {
        DashboardBrief {
            objective: &self.objective,
            analysis: &self.analysis,
        }
    }
}

/// Everything one user works with: stored sessions, the current pointer, the
/// comparison narrative and the chat transcript.
///
/// Owned by the request handler; all mutation goes through `&mut self`.
#[derive(Debug, Clone, Default)]
pub struct DashboardContext {
    sessions: IndexMap<DashboardKey, Session>,
    current: Option<DashboardKey>,
    comparison_analysis: Option<String>,
    chat: ChatTranscript,
}

impl DashboardContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes and stores a session under `key`, making it current.
    ///
    /// Encoding happens before any state changes, so a failure leaves the
    /// context exactly as it was. A `single` session resets the chat.
    /// Replacing either comparison slot drops the old comparison narrative.
    pub fn create_session(
        &mut self,
        key: DashboardKey,
        image: DynamicImage,
        filename: &str,
        objective: &str,
        analysis: &str,
        backend_used: &str,
    ) -> Result<&Session> {
        let portable = encode_portable(&image)
            .with_context(|| format!("could not encode {filename} for the session"))?;

        let session = Session {
            key,
            image,
            image_base64: portable.base64,
            fingerprint: portable.fingerprint,
            filename: filename.to_string(),
            objective: objective.to_string(),
            analysis: analysis.to_string(),
            backend_used: backend_used.to_string(),
            created_at: now_utc_iso(),
        };

        if key.is_comparison() {
            self.comparison_analysis = None;
        } else {
            self.chat.clear();
        }
        self.sessions.insert(key, session);
        self.current = Some(key);
        self.sessions
            .get(&key)
            .context("session missing right after insert")
    }

    pub fn has_active_session(&self) -> bool {
        self.active_session().is_some()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.current.and_then(|key| self.sessions.get(&key))
    }

    pub fn session(&self, key: DashboardKey) -> Option<&Session> {
        self.sessions.get(&key)
    }

    pub fn comparison_prompt(&self) -> Option<String> {
        let first = self.sessions.get(&DashboardKey::DashboardOne)?;
        let second = self.sessions.get(&DashboardKey::DashboardTwo)?;
        Some(comparison_prompt(first.brief(), second.brief()))
    }

    /// Stores the comparative narrative for the current pair and starts a
    /// fresh conversation about it.
    pub fn record_comparison(&mut self, narrative: &str) -> Result<()> {
        if self.comparison_prompt().is_none() {
            bail!("both comparison dashboards must be stored before recording a comparison");
        }
        self.comparison_analysis = Some(narrative.to_string());
        self.current = Some(DashboardKey::DashboardTwo);
        self.chat.clear();
        Ok(())
    }

    pub fn comparison_analysis(&self) -> Option<&str> {
        self.comparison_analysis.as_deref()
    }

    pub fn in_comparison_mode(&self) -> bool {
        self.current.is_some_and(DashboardKey::is_comparison) && self.comparison_analysis.is_some()
    }

    pub fn add_chat_message(&mut self, role: ChatRole, text: &str) -> Result<()> {
        if !self.has_active_session() {
            bail!("cannot record chat without an active session");
        }
        self.chat.push(role, text);
        Ok(())
    }

    pub fn chat_history(&self) -> &[ChatMessage] {
        self.chat.messages()
    }

    pub fn clear_chat(&mut self) {
        self.chat.clear();
    }

    /// Drops every session and the transcript.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Prompt for the next chat turn, or `None` without an active session.
    /// Only the last [`CHAT_HISTORY_WINDOW`] messages are carried.
    pub fn build_chat_prompt(&self, user_message: &str) -> Option<String> {
        let history = self.chat.recent(CHAT_HISTORY_WINDOW);
        if self.in_comparison_mode() {
            let first = self.sessions.get(&DashboardKey::DashboardOne)?;
            let second = self.sessions.get(&DashboardKey::DashboardTwo)?;
            let narrative = self.comparison_analysis.as_deref()?;
            return Some(comparison_chat_prompt(
                &first.objective,
                &second.objective,
                narrative,
                history,
                user_message,
            ));
        }
        let session = self.active_session()?;
        Some(chat_prompt(session.brief(), history, user_message))
    }

    /// Report input for whatever is current: the comparison narrative in
    /// comparison mode, otherwise the active session's analysis.
    pub fn report(&self) -> Option<AnalysisReport> {
        if self.in_comparison_mode() {
            let first = self.sessions.get(&DashboardKey::DashboardOne)?;
            let second = self.sessions.get(&DashboardKey::DashboardTwo)?;
            return Some(AnalysisReport {
                objective: format!(
                    "Dashboard 1: {}\n\nDashboard 2: {}",
                    first.objective, second.objective
                ),
                analysis: self.comparison_analysis.clone()?,
                filename: format!(
                    "{}_vs_{}",
                    file_stem(&first.filename),
                    file_stem(&second.filename)
                ),
            });
        }
        let session = self.active_session()?;
        Some(AnalysisReport {
            objective: session.objective.clone(),
            analysis: session.analysis.clone(),
            filename: session.filename.clone(),
        })
    }
}

fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .unwrap_or(filename)
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
