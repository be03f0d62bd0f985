//! Similarity verdicts for dashboard pairs.
//!
//! Backend answers are loosely structured, so parsing is a short list of
//! parsers tried in order. The first one that yields a verdict wins; when none
//! does, the verdict is [`SimilarityVerdict::unavailable`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scores at or above this mark a pair as similar.
pub const SIMILAR_SCORE_THRESHOLD: u8 = 80;
/// Scores at or above this block the comparison regardless of level.
pub const BLOCKING_SCORE_THRESHOLD: u8 = 95;
/// Score assumed when a freeform answer names no percentage.
pub const FREEFORM_DEFAULT_SCORE: u8 = 50;

const DEFAULT_REASONING: &str = "No reasoning provided";

static PERCENT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityLevel {
    Identical,
    VerySimilar,
    SomewhatSimilar,
    Different,
    Unknown,
}

impl SimilarityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identical => "identical",
            Self::VerySimilar => "very_similar",
            Self::SomewhatSimilar => "somewhat_similar",
            Self::Different => "different",
            Self::Unknown => "unknown",
        }
    }

    /// Maps a model-reported level. Anything outside the four requested
    /// labels counts as `different`; `unknown` is reserved for failed checks.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "identical" => Self::Identical,
            "very_similar" => Self::VerySimilar,
            "somewhat_similar" => Self::SomewhatSimilar,
            _ => Self::Different,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityVerdict {
    pub level: SimilarityLevel,
    pub score: u8,
    pub reasoning: String,
}

impl SimilarityVerdict {
    pub fn new(level: SimilarityLevel, score: u8, reasoning: impl Into<String>) -> Self {
        Self {
            level,
            score: score.min(100),
            reasoning: reasoning.into(),
        }
    }

    /// Verdict used when the similarity check itself could not run.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(SimilarityLevel::Unknown, 0, reason)
    }

    pub fn are_similar(&self) -> bool {
        self.score >= SIMILAR_SCORE_THRESHOLD
    }

    /// Gate for the comparison step. Only near-indistinguishable pairs block:
    /// an `identical` level, or any score at or above 95. A `very_similar`
    /// pair at 90 still proceeds even though `are_similar` is true.
    pub fn should_proceed(&self) -> bool {
        !(self.level == SimilarityLevel::Identical || self.score >= BLOCKING_SCORE_THRESHOLD)
    }

    pub fn message(&self) -> String {
        let score = self.score;
        let reasoning = &self.reasoning;
        match self.level {
            SimilarityLevel::Identical => format!(
                "Identical Dashboards Detected ({score}% similar)

You have uploaded the same dashboard twice. Since these are identical, there's no meaningful comparison to make.

Recommendation: Upload two different dashboards to get a meaningful comparison analysis.

AI Reasoning: {reasoning}"
            ),
            SimilarityLevel::VerySimilar => format!(
                "Very Similar Dashboards ({score}% similar)

These dashboards are very similar with only minor differences. The comparison may not provide much insight.

Recommendation: Consider uploading more distinct dashboards for better comparison analysis.

AI Reasoning: {reasoning}"
            ),
            SimilarityLevel::SomewhatSimilar => format!(
                "Somewhat Similar Dashboards ({score}% similar)

These dashboards have some similarities but also notable differences. A comparison analysis will be performed.

AI Reasoning: {reasoning}"
            ),
            SimilarityLevel::Different => format!(
                "Different Dashboards ({score}% similar)

These are distinct dashboards suitable for comparison analysis.

AI Reasoning: {reasoning}"
            ),
            SimilarityLevel::Unknown => format!(
                "Similarity Analysis Failed ({score}% similar)

{reasoning}

Proceeding with comparison analysis..."
            ),
        }
    }
}

type VerdictParser = fn(&str) -> Option<SimilarityVerdict>;

const VERDICT_PARSERS: &[(&str, VerdictParser)] = &[
    ("structured", parse_structured_verdict),
    ("freeform", parse_freeform_verdict),
];

/// Runs the parser pipeline and reports which stage produced the verdict.
pub fn parse_verdict_traced(raw: &str) -> (SimilarityVerdict, &'static str) {
    for (stage, parser) in VERDICT_PARSERS {
        if let Some(verdict) = parser(raw) {
            return (verdict, stage);
        }
    }
    (
        SimilarityVerdict::unavailable("Similarity response was empty"),
        "unavailable",
    )
}

pub fn parse_verdict(raw: &str) -> SimilarityVerdict {
    parse_verdict_traced(raw).0
}

/// Reads the greedy `{ ... }` span (first `{` to last `}`) as JSON.
pub fn parse_structured_verdict(raw: &str) -> Option<SimilarityVerdict> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    let payload: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    let obj = payload.as_object()?;

    let level = match obj.get("similarity_level") {
        None => SimilarityLevel::Different,
        Some(Value::String(label)) => SimilarityLevel::from_label(label),
        Some(_) => return None,
    };
    let score = match obj.get("similarity_percentage") {
        None => 0,
        Some(value) => score_from_value(value)?,
    };
    let reasoning = match obj.get("reasoning") {
        None => DEFAULT_REASONING.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    Some(SimilarityVerdict::new(level, score, reasoning))
}

/// Keyword heuristics over free text. Phrases that contain other keywords
/// ("almost identical", "very similar") are checked first.
pub fn parse_freeform_verdict(raw: &str) -> Option<SimilarityVerdict> {
    if raw.trim().is_empty() {
        return None;
    }
    let lowered = raw.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|needle| lowered.contains(needle));

    let level = if contains_any(&["very similar", "almost identical"]) {
        SimilarityLevel::VerySimilar
    } else if contains_any(&["identical", "same"]) {
        SimilarityLevel::Identical
    } else if contains_any(&["somewhat similar", "similar"]) {
        SimilarityLevel::SomewhatSimilar
    } else {
        SimilarityLevel::Different
    };

    let score = PERCENT_PATTERN
        .captures(raw)
        .and_then(|caps| caps.get(1))
        // Digits that overflow u64 are still far above 100.
        .map(|digits| {
            digits
                .as_str()
                .parse::<u64>()
                .map_or(100, |value| value.min(100) as u8)
        })
        .unwrap_or(FREEFORM_DEFAULT_SCORE);

    Some(SimilarityVerdict::new(level, score, raw))
}

fn score_from_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float.trunc() as i64))?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(raw.clamp(0, 100) as u8)
}

#[cfg(test)]
mod tests {
    use super::{
        parse_freeform_verdict, parse_structured_verdict, parse_verdict, parse_verdict_traced,
        SimilarityLevel, SimilarityVerdict,
    };

    #[test]
    fn structured_answer_inside_prose_is_parsed() {
        let raw = "Sure! Here is my assessment:\n```json\n{\n  \"similarity_level\": \"Very_Similar\",\n  \"similarity_percentage\": 88,\n  \"reasoning\": \"Same layout, different month.\"\n}\n```";
        let (verdict, stage) = parse_verdict_traced(raw);
        assert_eq!(stage, "structured");
        assert_eq!(verdict.level, SimilarityLevel::VerySimilar);
        assert_eq!(verdict.score, 88);
        assert_eq!(verdict.reasoning, "Same layout, different month.");
    }

    #[test]
    fn structured_defaults_fill_missing_keys() {
        let verdict = parse_structured_verdict("{}").expect("empty object parses");
        assert_eq!(verdict.level, SimilarityLevel::Different);
        assert_eq!(verdict.score, 0);
        assert_eq!(verdict.reasoning, "No reasoning provided");
    }

    #[test]
    fn are_similar_follows_structured_percentage() {
        for (percentage, expected) in [(0, false), (79, false), (80, true), (94, true), (100, true)] {
            let raw = format!(
                "{{\"similarity_level\": \"different\", \"similarity_percentage\": {percentage}, \"reasoning\": \"r\"}}"
            );
            let verdict = parse_verdict(&raw);
            assert_eq!(verdict.are_similar(), expected, "percentage {percentage}");
        }
    }

    #[test]
    fn structured_percentage_accepts_strings_and_floats() {
        let quoted = parse_structured_verdict(r#"{"similarity_percentage": "72"}"#);
        assert_eq!(quoted.map(|verdict| verdict.score), Some(72));
        let float = parse_structured_verdict(r#"{"similarity_percentage": 91.7}"#);
        assert_eq!(float.map(|verdict| verdict.score), Some(91));
        let over = parse_structured_verdict(r#"{"similarity_percentage": 140}"#);
        assert_eq!(over.map(|verdict| verdict.score), Some(100));
    }

    #[test]
    fn non_numeric_percentage_falls_back_to_freeform() {
        let raw = r#"{"similarity_level": "different", "similarity_percentage": "high"}"#;
        assert!(parse_structured_verdict(raw).is_none());
        let (verdict, stage) = parse_verdict_traced(raw);
        assert_eq!(stage, "freeform");
        assert_eq!(verdict.score, 50);
    }

    #[test]
    fn unrecognized_level_counts_as_different() {
        let verdict = parse_verdict(r#"{"similarity_level": "moderate", "similarity_percentage": 40}"#);
        assert_eq!(verdict.level, SimilarityLevel::Different);
    }

    #[test]
    fn malformed_json_uses_freeform_heuristics() {
        let raw = "These dashboards look almost identical, about 92% the same";
        let (verdict, stage) = parse_verdict_traced(raw);
        assert_eq!(stage, "freeform");
        assert_eq!(verdict.level, SimilarityLevel::VerySimilar);
        assert_eq!(verdict.score, 92);
        assert_eq!(verdict.reasoning, raw);
        assert!(verdict.should_proceed());
    }

    #[test]
    fn broken_braces_fall_back() {
        let raw = "{similarity_level: identical, 97% match";
        let (verdict, stage) = parse_verdict_traced(raw);
        assert_eq!(stage, "freeform");
        assert_eq!(verdict.level, SimilarityLevel::Identical);
        assert_eq!(verdict.score, 97);
    }

    #[test]
    fn freeform_keyword_ladder() {
        let level = |raw: &str| parse_freeform_verdict(raw).map(|verdict| verdict.level);
        assert_eq!(level("They are the SAME report"), Some(SimilarityLevel::Identical));
        assert_eq!(level("Very similar layouts"), Some(SimilarityLevel::VerySimilar));
        assert_eq!(level("somewhat similar styling"), Some(SimilarityLevel::SomewhatSimilar));
        assert_eq!(level("Similar charts"), Some(SimilarityLevel::SomewhatSimilar));
        assert_eq!(level("Unrelated dashboards"), Some(SimilarityLevel::Different));
        assert_eq!(
            parse_freeform_verdict("Unrelated dashboards").map(|verdict| verdict.score),
            Some(50)
        );
    }

    #[test]
    fn freeform_oversized_percentage_clamps_to_full_score() {
        let verdict = parse_verdict("They are 999999999999999999999% alike, nearly a copy");
        assert_eq!(verdict.score, 100);
        assert!(verdict.are_similar());
        assert!(!verdict.should_proceed());

        let verdict = parse_verdict("Different dashboards, maybe 250% apart");
        assert_eq!(verdict.score, 100);
    }

    #[test]
    fn empty_response_is_unavailable() {
        let (verdict, stage) = parse_verdict_traced("   ");
        assert_eq!(stage, "unavailable");
        assert_eq!(verdict.level, SimilarityLevel::Unknown);
        assert_eq!(verdict.score, 0);
        assert!(verdict.should_proceed());
    }

    #[test]
    fn proceed_gate_is_stricter_than_similarity_flag() {
        let very_similar = SimilarityVerdict::new(SimilarityLevel::VerySimilar, 90, "r");
        assert!(very_similar.are_similar());
        assert!(very_similar.should_proceed());

        let high_score = SimilarityVerdict::new(SimilarityLevel::SomewhatSimilar, 96, "r");
        assert!(!high_score.should_proceed());

        let identical_low_score = SimilarityVerdict::new(SimilarityLevel::Identical, 60, "r");
        assert!(!identical_low_score.are_similar());
        assert!(!identical_low_score.should_proceed());

        let boundary = SimilarityVerdict::new(SimilarityLevel::Different, 95, "r");
        assert!(!boundary.should_proceed());
        let below = SimilarityVerdict::new(SimilarityLevel::Different, 94, "r");
        assert!(below.should_proceed());
    }

    #[test]
    fn message_carries_score_and_reasoning() {
        for level in [
            SimilarityLevel::Identical,
            SimilarityLevel::VerySimilar,
            SimilarityLevel::SomewhatSimilar,
            SimilarityLevel::Different,
        ] {
            let verdict = SimilarityVerdict::new(level, 73, "Both track churn.");
            let message = verdict.message();
            assert!(message.contains("73% similar"), "{message}");
            assert!(message.contains("Both track churn."), "{message}");
        }
        let failed = SimilarityVerdict::unavailable("backend offline").message();
        assert!(failed.starts_with("Similarity Analysis Failed"));
        assert!(failed.contains("backend offline"));
        assert!(failed.contains("Proceeding with comparison analysis"));
    }

    #[test]
    fn level_labels_roundtrip_through_from_label() {
        for level in [
            SimilarityLevel::Identical,
            SimilarityLevel::VerySimilar,
            SimilarityLevel::SomewhatSimilar,
            SimilarityLevel::Different,
        ] {
            assert_eq!(SimilarityLevel::from_label(level.as_str()), level);
        }
    }
}
