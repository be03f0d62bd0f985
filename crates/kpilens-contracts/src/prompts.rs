//! Instruction text sent to the vision backends.
//!
//! Validation and similarity instructions are fixed contracts: the parsers in
//! [`crate::validation`] and [`crate::similarity`] depend on the answer shapes
//! requested here.

use crate::chat::ChatMessage;

pub const DASHBOARD_VALIDATION_INSTRUCTION: &str = "\
Please analyze this image and determine if it is a business dashboard, KPI dashboard, or data visualization dashboard.

Look for these characteristics:
- Charts, graphs, or data visualizations
- Numbers, metrics, or KPIs
- Business-related data (sales, revenue, employees, etc.)
- Dashboard-like layout with multiple data points
- Tables, bar charts, pie charts, line graphs
- Business intelligence or analytics interface

Respond with ONLY one word:
- \"YES\" if this is clearly a business/dashboard image
- \"NO\" if this is not a dashboard (e.g., photos, random images, documents, etc.)

Be strict - only business dashboards and data visualizations should get \"YES\".
";

pub const SIMILARITY_INSTRUCTION: &str = "\
Please analyze these two dashboard images and determine their similarity level.

Compare the following aspects:
- Overall layout and structure
- Data visualizations (charts, graphs, tables)
- Numbers, metrics, and KPIs shown
- Color schemes and styling
- Content and data points
- Dashboard components and sections

Respond with ONLY a JSON object in this exact format:
{
    \"similarity_level\": \"identical|very_similar|somewhat_similar|different\",
    \"similarity_percentage\": 85,
    \"reasoning\": \"Brief explanation of why they are similar/different\"
}

Guidelines:
- \"identical\": Same dashboard, same data, same layout (95-100%)
- \"very_similar\": Same dashboard with minor differences (80-94%)
- \"somewhat_similar\": Similar dashboard type but different data (50-79%)
- \"different\": Completely different dashboards (0-49%)

Be accurate and strict in your assessment.
";

/// Objective and analysis of one stored dashboard.
#[derive(Debug, Clone, Copy)]
pub struct DashboardBrief<'a> {
    pub objective: &'a str,
    pub analysis: &'a str,
}

pub fn comparison_prompt(first: DashboardBrief<'_>, second: DashboardBrief<'_>) -> String {
    format!(
        "You are an expert at comparing KPI dashboards.

Dashboard 1 Context:
- Objective: {}
- Initial Analysis: {}

Dashboard 2 Context:
- Objective: {}
- Initial Analysis: {}

Task: Provide a detailed comparison of the two dashboards. Highlight key differences, similarities, performance shifts, and potential strategic insights. Format the response clearly with headings.
",
        first.objective, first.analysis, second.objective, second.analysis
    )
}

/// Follow-up prompt for a single analyzed dashboard.
///
/// `history` is rendered as given; callers pass the already-windowed tail.
pub fn chat_prompt(
    brief: DashboardBrief<'_>,
    history: &[ChatMessage],
    question: &str,
) -> String {
    format!(
        "You are analyzing a KPI dashboard. Here's the context:

DASHBOARD OBJECTIVE: {}

INITIAL ANALYSIS:
{}

{}
USER QUESTION: {}

Provide a helpful response focused on the dashboard analysis. Keep it concise and actionable.",
        brief.objective,
        brief.analysis,
        render_history(history),
        question
    )
}

pub fn comparison_chat_prompt(
    first_objective: &str,
    second_objective: &str,
    narrative: &str,
    history: &[ChatMessage],
    question: &str,
) -> String {
    format!(
        "You are discussing a comparison of two KPI dashboards. Here's the context:

DASHBOARD 1 OBJECTIVE: {first_objective}

DASHBOARD 2 OBJECTIVE: {second_objective}

COMPARISON ANALYSIS:
{narrative}

{}
USER QUESTION: {question}

Provide a helpful response focused on the comparison. Keep it concise and actionable.",
        render_history(history)
    )
}

fn render_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("Recent conversation:\n");
    for message in history {
        out.push_str(message.role.title());
        out.push_str(": ");
        out.push_str(&message.text);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use crate::chat::{ChatMessage, ChatRole};

    use super::{chat_prompt, comparison_chat_prompt, comparison_prompt, DashboardBrief};

    #[test]
    fn comparison_prompt_embeds_both_dashboards_in_order() {
        let prompt = comparison_prompt(
            DashboardBrief {
                objective: "Track Q1 sales",
                analysis: "Q1 revenue grew 12%.",
            },
            DashboardBrief {
                objective: "Track Q2 sales",
                analysis: "Q2 revenue fell 3%.",
            },
        );
        let first = prompt.find("Q1 revenue grew 12%.").unwrap_or(usize::MAX);
        let second = prompt.find("Q2 revenue fell 3%.").unwrap_or(0);
        assert!(first < second);
        assert!(prompt.contains("- Objective: Track Q1 sales"));
        assert!(prompt.contains("Format the response clearly with headings."));
    }

    #[test]
    fn chat_prompt_renders_history_with_role_titles() {
        let history = vec![
            ChatMessage::new(ChatRole::User, "What drives churn?"),
            ChatMessage::new(ChatRole::Assistant, "Mostly onboarding drop-off."),
        ];
        let prompt = chat_prompt(
            DashboardBrief {
                objective: "Reduce churn",
                analysis: "Churn is 4.2% monthly.",
            },
            &history,
            "How do we fix onboarding?",
        );
        assert!(prompt.contains("DASHBOARD OBJECTIVE: Reduce churn"));
        assert!(prompt.contains("Churn is 4.2% monthly."));
        assert!(prompt.contains(
            "Recent conversation:\nUser: What drives churn?\nAssistant: Mostly onboarding drop-off.\n"
        ));
        assert!(prompt.contains("USER QUESTION: How do we fix onboarding?"));
    }

    #[test]
    fn chat_prompt_without_history_omits_conversation_block() {
        let prompt = chat_prompt(
            DashboardBrief {
                objective: "o",
                analysis: "a",
            },
            &[],
            "q",
        );
        assert!(!prompt.contains("Recent conversation"));
    }

    #[test]
    fn comparison_chat_prompt_uses_narrative() {
        let prompt = comparison_chat_prompt(
            "Track EU",
            "Track US",
            "## Differences\nUS outpaces EU.",
            &[],
            "Which region needs attention?",
        );
        assert!(prompt.contains("DASHBOARD 1 OBJECTIVE: Track EU"));
        assert!(prompt.contains("DASHBOARD 2 OBJECTIVE: Track US"));
        assert!(prompt.contains("US outpaces EU."));
        assert!(prompt.contains("USER QUESTION: Which region needs attention?"));
    }
}
