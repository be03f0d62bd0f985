use image::DynamicImage;
use kpilens_contracts::prompts::SIMILARITY_INSTRUCTION;
use kpilens_contracts::similarity::{parse_verdict_traced, SimilarityVerdict};
use tracing::{info, warn};

use crate::gateway::InferenceGateway;

/// Scores how alike two dashboards are. Always yields a verdict: a backend
/// failure becomes the `unknown` verdict carrying the failure text.
pub fn detect_similarity(
    gateway: &mut InferenceGateway,
    first: &DynamicImage,
    second: &DynamicImage,
) -> SimilarityVerdict {
    let Some(raw) = gateway.vision_infer(SIMILARITY_INSTRUCTION, &[first, second]) else {
        let reason = gateway.last_failure().unwrap_or("no response from backend");
        warn!(reason, "similarity check unavailable");
        return SimilarityVerdict::unavailable(format!("Error analyzing similarity: {reason}"));
    };
    let (verdict, stage) = parse_verdict_traced(&raw);
    info!(
        stage,
        level = verdict.level.as_str(),
        score = verdict.score,
        proceed = verdict.should_proceed(),
        "similarity verdict"
    );
    verdict
}

#[cfg(test)]
mod tests {
    use image::DynamicImage;
    use kpilens_contracts::similarity::SimilarityLevel;

    use super::detect_similarity;
    use crate::backends::scripted::ScriptedBackend;
    use crate::gateway::InferenceGateway;

    fn run(answer: Option<&str>) -> (kpilens_contracts::similarity::SimilarityVerdict, usize) {
        let (backend, log) = ScriptedBackend::new(vec![answer]);
        let mut gateway = InferenceGateway::new(Box::new(backend));
        let first = DynamicImage::new_rgb8(4, 4);
        let second = DynamicImage::new_rgb8(6, 6);
        let verdict = detect_similarity(&mut gateway, &first, &second);
        let images = log.calls().first().map(|call| call.image_count).unwrap_or(0);
        (verdict, images)
    }

    #[test]
    fn structured_answer_sends_both_images() {
        let (verdict, images) = run(Some(
            "Here you go:\n```json\n{\"similarity_level\": \"VERY_SIMILAR\", \"similarity_percentage\": 90, \"reasoning\": \"Same layout\"}\n```",
        ));
        assert_eq!(images, 2);
        assert_eq!(verdict.level, SimilarityLevel::VerySimilar);
        assert_eq!(verdict.score, 90);
        assert!(verdict.are_similar());
        assert!(verdict.should_proceed());
    }

    #[test]
    fn freeform_answer_falls_back() {
        let (verdict, _) = run(Some("These dashboards look almost identical, about 92% the same"));
        assert_eq!(verdict.level, SimilarityLevel::VerySimilar);
        assert_eq!(verdict.score, 92);
        assert_eq!(
            verdict.reasoning,
            "These dashboards look almost identical, about 92% the same"
        );
    }

    #[test]
    fn backend_failure_is_unknown_and_proceeds() {
        let (verdict, _) = run(None);
        assert_eq!(verdict.level, SimilarityLevel::Unknown);
        assert_eq!(verdict.score, 0);
        assert!(verdict.reasoning.starts_with("Error analyzing similarity:"));
        assert!(verdict.reasoning.contains("scripted outage"));
        assert!(verdict.should_proceed());
        assert!(verdict.message().contains("Proceeding with comparison"));
    }
}
