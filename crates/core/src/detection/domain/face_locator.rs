use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

/// Domain interface for face location.
///
/// Returns boxes in no particular order; callers must not treat the
/// position of a box in the result as identity.
pub trait FaceLocator: Send {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>>;
}

/// Detection parameters shared by locator implementations.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatorConfig {
    /// Minimum detection confidence (0.0-1.0).
    pub confidence: f64,
    /// IoU above which overlapping boxes are suppressed.
    pub nms_iou: f64,
    /// Boxes narrower or shorter than this many pixels are dropped.
    pub min_face_size: u32,
}

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_NMS_IOU: f64 = 0.45;
pub const DEFAULT_MIN_FACE_SIZE: u32 = 30;

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            nms_iou: DEFAULT_NMS_IOU,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
        }
    }
}
