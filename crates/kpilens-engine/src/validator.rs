use image::DynamicImage;
use kpilens_contracts::prompts::DASHBOARD_VALIDATION_INSTRUCTION;
use kpilens_contracts::validation::parse_dashboard_answer;
use tracing::{info, warn};

use crate::gateway::InferenceGateway;

/// Strict gate: `true` only on an unambiguous YES. Backend failure rejects.
pub fn is_dashboard(gateway: &mut InferenceGateway, image: &DynamicImage) -> bool {
    let Some(answer) = gateway.vision_infer(DASHBOARD_VALIDATION_INSTRUCTION, &[image]) else {
        warn!(
            backend = gateway.backend_name(),
            "dashboard validation unavailable; rejecting"
        );
        return false;
    };
    let accepted = parse_dashboard_answer(&answer);
    info!(accepted, answer = %answer.trim(), "dashboard validation");
    accepted
}

/// Validates each image in order. Every image is checked even after a
/// rejection so the caller can name all offenders.
pub fn validate_dashboards(
    gateway: &mut InferenceGateway,
    images: &[&DynamicImage],
) -> (bool, Vec<bool>) {
    let results: Vec<bool> = images
        .iter()
        .map(|image| is_dashboard(gateway, image))
        .collect();
    let all_valid = !results.is_empty() && results.iter().all(|valid| *valid);
    (all_valid, results)
}
