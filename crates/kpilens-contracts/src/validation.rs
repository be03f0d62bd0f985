/// Interprets a backend's answer to the dashboard validation instruction.
///
/// Accepts only when `YES` appears and `NO` appears nowhere, as substrings of
/// the uppercased answer. `NOT`, `KNOW` or a hedged `YES/NO` all reject.
pub fn parse_dashboard_answer(raw: &str) -> bool {
    let normalized = raw.trim().to_uppercase();
    normalized.contains("YES") && !normalized.contains("NO")
}

pub fn rejection_message(label: Option<&str>) -> String {
    let headline = match label {
        Some(label) => format!("{label} doesn't appear to be a dashboard image!"),
        None => "This doesn't appear to be a dashboard image!".to_string(),
    };
    format!(
        "{headline}

Please upload an image that contains:
- Business dashboards or KPI reports
- Charts, graphs, or data visualizations
- Business metrics and analytics

The system detected this is not a dashboard image and cannot analyze it."
    )
}

pub const UPLOADER_HELP_TEXT: &str = "Only upload business dashboards, KPI reports, or data visualizations. The system will validate the image before analysis.";
