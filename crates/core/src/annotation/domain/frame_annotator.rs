use crate::classification::domain::emotion_result::EmotionResult;
use crate::inference::domain::result_cache::ResultCache;
use crate::shared::frame::Frame;
use crate::tracking::domain::face_slot::FaceSlot;

pub const DEFAULT_TOP_K: usize = 3;

/// Domain interface for drawing face state onto a frame.
///
/// Implementations only read the slots and the cache.
pub trait FrameAnnotator: Send {
    fn render(&self, frame: &mut Frame, slots: &[FaceSlot], cache: &ResultCache);

    /// Draws the stream status strip. Implementations may ignore it.
    fn render_status(&self, _frame: &mut Frame, _status: &StreamStatus) {}
}

/// Live counters shown alongside the faces.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamStatus {
    pub fps: f64,
    pub frame_index: usize,
    pub faces: usize,
}

/// Which entries of a distribution are listed under a face.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelPolicy {
    pub top_k: usize,
    /// Entries scoring below this (percent) are hidden.
    pub min_score: f32,
}

impl Default for LabelPolicy {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: 0.0,
        }
    }
}

impl LabelPolicy {
    /// At most `top_k` entries at or above `min_score`, highest first.
    pub fn select<'a>(&self, result: &'a EmotionResult) -> Vec<(&'a str, f32)> {
        result
            .ranked()
            .into_iter()
            .filter(|(_, score)| *score >= self.min_score)
            .take(self.top_k)
            .collect()
    }
}
