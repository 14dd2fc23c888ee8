use thiserror::Error;

use crate::shared::frame::Frame;

use super::emotion_result::EmotionResult;

/// Why a single classification attempt produced no result.
///
/// Every variant is a recoverable miss: the caller keeps whatever it
/// displayed before.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("face crop too small to classify ({width}x{height})")]
    DegenerateCrop { width: u32, height: u32 },
    #[error("score for '{label}' is not a non-negative number: {score}")]
    InvalidScore { label: String, score: f32 },
    #[error("classifier returned no scores")]
    EmptyDistribution,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Domain interface for emotion classification of a cropped face.
///
/// Each pool worker owns its own instance, hence `&mut self` and `Send`
/// without `Sync`.
pub trait Classifier: Send {
    fn classify(&mut self, face: &Frame) -> Result<EmotionResult, ClassifyError>;
}
