use chrono::{DateTime, Utc};
use shared::Verdict;

use super::{InferencePipeline, PipelineError, PreparedImage, Rejection, Submission};
use crate::imaging::UploadedImage;

#[derive(Debug)]
pub enum SessionState {
    AwaitingUpload,
    Rejected(Rejection),
    Ready(PreparedImage),
    Scoring,
    Scored(Verdict),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingUpload => "awaiting upload",
            SessionState::Rejected(_) => "rejected",
            SessionState::Ready(_) => "ready",
            SessionState::Scoring => "scoring",
            SessionState::Scored(_) => "scored",
        }
    }
}

/// One user's walk through upload, optional rejection and the explicitly
/// requested prediction. A session whose forward pass fails is discarded
/// by the store rather than rewound.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    created_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::AwaitingUpload,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// AwaitingUpload -> Rejected | Ready.
    pub fn upload(
        &mut self,
        pipeline: &InferencePipeline,
        image: UploadedImage,
    ) -> Result<&SessionState, PipelineError> {
        self.require_state("upload an image", |s| matches!(s, SessionState::AwaitingUpload))?;

        self.state = match pipeline.submit(image) {
            Submission::Rejected(rejection) => SessionState::Rejected(rejection),
            Submission::Ready(prepared) => SessionState::Ready(prepared),
        };
        Ok(&self.state)
    }

    /// Ready -> Scoring, handing the prepared image to the caller.
    pub fn begin_scoring(&mut self) -> Result<PreparedImage, PipelineError> {
        match std::mem::replace(&mut self.state, SessionState::Scoring) {
            SessionState::Ready(prepared) => Ok(prepared),
            other => {
                let state = other.name();
                self.state = other;
                Err(PipelineError::InvalidTransition {
                    state,
                    event: "start a prediction",
                })
            }
        }
    }

    /// Scoring -> Scored.
    pub fn finish_scoring(&mut self, verdict: Verdict) -> Result<&SessionState, PipelineError> {
        self.require_state("record a verdict", |s| matches!(s, SessionState::Scoring))?;
        self.state = SessionState::Scored(verdict);
        Ok(&self.state)
    }

    fn require_state(
        &self,
        event: &'static str,
        allowed: impl Fn(&SessionState) -> bool,
    ) -> Result<(), PipelineError> {
        if allowed(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidTransition {
                state: self.state.name(),
                event,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::stub::FixedScoreClassifier;
    use crate::pipeline::PipelineOptions;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
    use shared::Label;
    use std::sync::Arc;

    fn gray() -> UploadedImage {
        UploadedImage::from_dynamic(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            20,
            20,
            Luma([120]),
        )))
    }

    fn red() -> UploadedImage {
        UploadedImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            20,
            20,
            Rgb([255, 0, 0]),
        )))
    }

    fn pipeline(score: f32) -> (Arc<FixedScoreClassifier>, InferencePipeline) {
        let classifier = Arc::new(FixedScoreClassifier::new(score));
        let pipeline = InferencePipeline::new(classifier.clone(), PipelineOptions::default());
        (classifier, pipeline)
    }

    #[test]
    fn test_starts_awaiting_upload() {
        let session = Session::new();
        assert!(matches!(session.state(), SessionState::AwaitingUpload));
    }

    #[test]
    fn test_upload_then_explicit_scoring() {
        let (classifier, pipeline) = pipeline(0.1);
        let mut session = Session::new();

        let state = session.upload(&pipeline, gray()).unwrap();
        assert!(matches!(state, SessionState::Ready(_)));
        assert_eq!(classifier.calls(), 0);

        let prepared = session.begin_scoring().unwrap();
        assert!(matches!(session.state(), SessionState::Scoring));
        let verdict = pipeline.score(&prepared).unwrap();
        session.finish_scoring(verdict).unwrap();

        assert_eq!(verdict.label, Label::Normal);
        assert_eq!(verdict.confidence_percent(), "90.00%");
        assert!(matches!(session.state(), SessionState::Scored(_)));
        assert_eq!(classifier.calls(), 1);
    }

    #[test]
    fn test_rejected_is_terminal() {
        let (classifier, pipeline) = pipeline(0.9);
        let mut session = Session::new();

        let state = session.upload(&pipeline, red()).unwrap();
        assert!(matches!(state, SessionState::Rejected(_)));

        let err = session.begin_scoring().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                state: "rejected",
                ..
            }
        ));
        assert!(matches!(session.state(), SessionState::Rejected(_)));
        assert!(session.upload(&pipeline, gray()).is_err());
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn test_cannot_score_before_upload_or_twice() {
        let (_, pipeline) = pipeline(0.7);
        let mut session = Session::new();
        assert!(session.begin_scoring().is_err());
        assert!(matches!(session.state(), SessionState::AwaitingUpload));

        session.upload(&pipeline, gray()).unwrap();
        let prepared = session.begin_scoring().unwrap();
        let verdict = pipeline.score(&prepared).unwrap();
        session.finish_scoring(verdict).unwrap();

        assert!(matches!(
            session.begin_scoring(),
            Err(PipelineError::InvalidTransition { state: "scored", .. })
        ));
        assert!(session.finish_scoring(verdict).is_err());
    }

    #[test]
    fn test_scoring_blocks_second_start() {
        let (_, pipeline) = pipeline(0.7);
        let mut session = Session::new();
        session.upload(&pipeline, gray()).unwrap();

        let _prepared = session.begin_scoring().unwrap();
        assert!(matches!(
            session.begin_scoring(),
            Err(PipelineError::InvalidTransition { state: "scoring", .. })
        ));
        assert!(matches!(session.state(), SessionState::Scoring));
    }

    #[test]
    fn test_finish_requires_scoring() {
        let (_, pipeline) = pipeline(0.7);
        let mut session = Session::new();
        session.upload(&pipeline, gray()).unwrap();

        let verdict = Verdict::from_score(0.7);
        assert!(session.finish_scoring(verdict).is_err());
        assert!(matches!(session.state(), SessionState::Ready(_)));
    }
}
