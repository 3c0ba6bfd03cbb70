use shared::{DISCLAIMER, GuidanceResponse, Label};
use strum::IntoEnumIterator;

const USAGE: [&str; 3] = [
    "The image must be a chest X-ray",
    "A frontal projection (PA/AP) is recommended",
    "Image quality and contrast can affect the analysis result",
];

const LIMITATIONS: [&str; 2] = [
    "The model was trained on chest X-ray images only",
    "Non-medical images cannot be processed and are rejected",
];

const FUTURE_WORK: [&str; 3] = [
    "A dedicated X-ray vs non-X-ray classification module",
    "A larger and more diverse dataset",
    "Explainable AI integration (Grad-CAM)",
];

pub fn guidance() -> GuidanceResponse {
    GuidanceResponse {
        usage: to_strings(&USAGE),
        accepted_formats: vec!["JPG".into(), "JPEG".into(), "PNG".into()],
        labels: Label::iter().map(|label| label.to_string()).collect(),
        limitations: to_strings(&LIMITATIONS),
        future_work: to_strings(&FUTURE_WORK),
        disclaimer: DISCLAIMER.to_string(),
    }
}

fn to_strings(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}
