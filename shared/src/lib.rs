use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use uuid::Uuid;

/// Scores strictly above this are read as pneumonia.
pub const DECISION_THRESHOLD: f64 = 0.5;

pub const DISCLAIMER: &str = "This service is intended for education and research. \
     Prediction results are not a medical diagnosis.";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
pub enum Label {
    Pneumonia,
    Normal,
}

impl Label {
    pub fn conclusion(&self) -> &'static str {
        match self {
            Label::Pneumonia => "Indicated: Pneumonia",
            Label::Normal => "Not indicated: Pneumonia (Normal)",
        }
    }

    pub fn findings(&self) -> [&'static str; 3] {
        match self {
            Label::Pneumonia => [
                "Areas of opacity identified in the lung image",
                "Lung intensity distribution shows inhomogeneity",
                "Image pattern is consistent with an indication of pneumonia",
            ],
            Label::Normal => [
                "Lung area appears relatively clear and symmetric",
                "No abnormal infiltrate or opacity identified",
                "Image pattern is consistent with a normal lung condition",
            ],
        }
    }
}

/// Labeled outcome of one classifier pass. `score` is the raw pneumonia
/// probability; `confidence` is the probability of `label`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    pub confidence: f64,
    pub score: f64,
}

impl Verdict {
    pub fn from_score(score: f64) -> Self {
        if score > DECISION_THRESHOLD {
            Self {
                label: Label::Pneumonia,
                confidence: score,
                score,
            }
        } else {
            Self {
                label: Label::Normal,
                confidence: 1.0 - score,
                score,
            }
        }
    }

    pub fn pneumonia_confidence(&self) -> f64 {
        self.score
    }

    pub fn normal_confidence(&self) -> f64 {
        1.0 - self.score
    }

    pub fn pneumonia_percent(&self) -> String {
        format_percent(self.pneumonia_confidence())
    }

    pub fn normal_percent(&self) -> String {
        format_percent(self.normal_confidence())
    }

    pub fn confidence_percent(&self) -> String {
        format_percent(self.confidence)
    }
}

/// Renders a probability as a percentage with two decimals, e.g. `87.32%`.
pub fn format_percent(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From,
)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UploadResponse {
    Ready {
        session_id: SessionId,
        width: u32,
        height: u32,
        channels: u8,
    },
    Rejected {
        message: String,
        detail: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionResponse {
    pub session_id: SessionId,
    pub verdict: Verdict,
    pub pneumonia_percent: String,
    pub normal_percent: String,
    pub conclusion: String,
    pub findings: Vec<String>,
    pub disclaimer: String,
}

impl PredictionResponse {
    pub fn new(session_id: SessionId, verdict: Verdict) -> Self {
        Self {
            session_id,
            verdict,
            pneumonia_percent: verdict.pneumonia_percent(),
            normal_percent: verdict.normal_percent(),
            conclusion: verdict.label.conclusion().to_string(),
            findings: verdict
                .label
                .findings()
                .iter()
                .map(|f| f.to_string())
                .collect(),
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub classifier: String,
    pub plausibility_check: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GuidanceResponse {
    pub usage: Vec<String>,
    pub accepted_formats: Vec<String>,
    pub labels: Vec<String>,
    pub limitations: Vec<String>,
    pub future_work: Vec<String>,
    pub disclaimer: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
