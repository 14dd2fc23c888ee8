use std::time::Duration;

use crate::classification::domain::classifier::ClassifyError;
use crate::classification::domain::emotion_result::EmotionResult;
use crate::shared::frame::Frame;
use crate::tracking::domain::face_slot::SlotId;

/// A face crop queued for classification.
#[derive(Debug)]
pub struct ClassificationRequest {
    pub slot: SlotId,
    pub crop: Frame,
    /// Frame the crop was cut from.
    pub frame_index: usize,
}

#[derive(Debug)]
pub struct ClassificationResponse {
    pub slot: SlotId,
    pub frame_index: usize,
    pub outcome: Result<EmotionResult, ClassifyError>,
    /// Time spent inside the classifier.
    pub elapsed: Duration,
}
