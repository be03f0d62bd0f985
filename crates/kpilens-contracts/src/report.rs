use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};

/// Everything a report needs: the objective, the analysis and where the
/// dashboard came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub objective: String,
    pub analysis: String,
    pub filename: String,
}

impl AnalysisReport {
    pub fn render_markdown(&self) -> String {
        format!(
            "# KPI Dashboard Analysis Report\n\n\
             - **Source file:** {}\n\
             - **Generated:** {}\n\n\
             ## Dashboard Objective\n\n{}\n\n\
             ## Analysis\n\n{}\n",
            self.filename,
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            self.objective.trim(),
            self.analysis.trim()
        )
    }

    /// `dashboard_analysis_<stem>.md` inside `dir`.
    pub fn default_path(&self, dir: &Path) -> PathBuf {
        let stem = Path::new(&self.filename)
            .file_stem()
            .and_then(|value| value.to_str())
            .filter(|value| !value.is_empty())
            .unwrap_or("dashboard");
        dir.join(format!("dashboard_analysis_{stem}.md"))
    }
}

pub fn write_report(path: &Path, report: &AnalysisReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, report.render_markdown())
        .with_context(|| format!("failed to write report {}", path.display()))?;
    Ok(())
}
