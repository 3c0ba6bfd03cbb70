//! Upload-to-verdict orchestration.
//!
//! One pipeline serves both the gated and the ungated front-end: the
//! plausibility check is an option, not a separate code path. The
//! classifier is injected once at startup and shared read-only.

mod session;

pub use session::{Session, SessionState};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::Verdict;

use crate::classifier::{Classifier, ClassifierError};
use crate::imaging::{self, NormalizedTensor, UploadedImage};

pub const REJECTION_MESSAGE: &str = "Input was not identified as a chest X-ray image";
pub const REJECTION_DETAIL: &str = "This system is designed specifically to analyse chest \
     X-ray images. Prediction was stopped to prevent an invalid interpretation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub plausibility_check: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            plausibility_check: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error("Classifier returned {0}, expected a probability in [0, 1]")]
    ScoreOutOfRange(f32),
    #[error("Cannot {event} while the session is {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub message: String,
    pub detail: String,
}

impl Default for Rejection {
    fn default() -> Self {
        Self {
            message: REJECTION_MESSAGE.to_string(),
            detail: REJECTION_DETAIL.to_string(),
        }
    }
}

/// An accepted upload, already normalized and waiting for an explicit
/// prediction request.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub tensor: NormalizedTensor,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

#[derive(Debug)]
pub enum Submission {
    Rejected(Rejection),
    Ready(PreparedImage),
}

#[derive(Clone)]
pub struct InferencePipeline {
    classifier: Arc<dyn Classifier>,
    options: PipelineOptions,
}

impl InferencePipeline {
    pub fn new(classifier: Arc<dyn Classifier>, options: PipelineOptions) -> Self {
        Self {
            classifier,
            options,
        }
    }

    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Gates the upload (when enabled) and normalizes it eagerly. Never
    /// touches the classifier.
    pub fn submit(&self, image: UploadedImage) -> Submission {
        if self.options.plausibility_check && !imaging::is_likely_xray(&image) {
            log::info!(
                "Rejected {}x{} upload as not an X-ray",
                image.width(),
                image.height()
            );
            return Submission::Rejected(Rejection::default());
        }

        let tensor = imaging::normalize(&image);
        Submission::Ready(PreparedImage {
            tensor,
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
        })
    }

    /// Runs exactly one forward pass and maps the score to a verdict.
    pub fn score(&self, prepared: &PreparedImage) -> Result<Verdict, PipelineError> {
        let score = self.classifier.predict(&prepared.tensor)?;
        if !(0.0..=1.0).contains(&score) {
            log::error!("Classifier {} returned {}", self.classifier.name(), score);
            return Err(PipelineError::ScoreOutOfRange(score));
        }

        let verdict = Verdict::from_score(f64::from(score));
        log::info!(
            "Scored upload: {} ({})",
            verdict.label,
            verdict.confidence_percent()
        );
        Ok(verdict)
    }
}
