/// Draws face boxes, the dominant emotion and a short ranked breakdown
/// directly onto the frame.
///
/// Layout per face: box outline, dominant label above the box, and below
/// the box one line per listed emotion with a bar proportional to its
/// score. Faces without a result get a thin white box and a marker.
use crate::annotation::domain::frame_annotator::{FrameAnnotator, LabelPolicy, StreamStatus};
use crate::annotation::infrastructure::canvas::{self, text_height};
use crate::classification::domain::emotion::{color_for_label, UNKNOWN_COLOR};
use crate::classification::domain::emotion_result::EmotionResult;
use crate::inference::domain::result_cache::ResultCache;
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;
use crate::tracking::domain::face_slot::FaceSlot;

pub const PENDING_TEXT: &str = "ANALYZING";

const RESOLVED_THICKNESS: i32 = 3;
const PENDING_THICKNESS: i32 = 2;
const LABEL_SCALE: i32 = 2;
const LINE_SCALE: i32 = 1;
const LABEL_GAP: i32 = 6;
const BAR_HEIGHT: i32 = 3;
const BAR_MAX_WIDTH: i32 = 100;
const LINE_SPACING: i32 = 4;
const STATUS_PADDING: i32 = 4;
const STATUS_BACKGROUND: [u8; 3] = [0, 0, 0];
const STATUS_COLOR: [u8; 3] = [255, 255, 255];

pub struct OverlayAnnotator {
    policy: LabelPolicy,
    status_bar: bool,
}

impl OverlayAnnotator {
    pub fn new(policy: LabelPolicy) -> Self {
        Self {
            policy,
            status_bar: false,
        }
    }

    pub fn with_status_bar(mut self, enabled: bool) -> Self {
        self.status_bar = enabled;
        self
    }

    fn draw_pending(&self, frame: &mut Frame, bbox: &Rect) {
        canvas::stroke_rect(frame, bbox, UNKNOWN_COLOR, PENDING_THICKNESS);
        draw_label_above(frame, bbox, PENDING_TEXT, LINE_SCALE, UNKNOWN_COLOR);
    }

    fn draw_resolved(&self, frame: &mut Frame, bbox: &Rect, result: &EmotionResult) {
        let color = color_for_label(result.dominant_label());
        canvas::stroke_rect(frame, bbox, color, RESOLVED_THICKNESS);
        draw_label_above(
            frame,
            bbox,
            &display_name(result.dominant_label()),
            LABEL_SCALE,
            color,
        );

        let mut y = bbox.bottom() + LABEL_GAP;
        for (label, score) in self.policy.select(result) {
            let text = format!("{}: {score:.1}%", display_name(label));
            canvas::draw_text(frame, bbox.x, y, &text, LINE_SCALE, color);
            y += text_height(LINE_SCALE) + 1;

            let bar = bar_width(score);
            if bar > 0 {
                canvas::fill_rect(frame, &Rect::new(bbox.x, y, bar, BAR_HEIGHT), color);
            }
            y += BAR_HEIGHT + LINE_SPACING;
        }
    }
}

impl FrameAnnotator for OverlayAnnotator {
    fn render(&self, frame: &mut Frame, slots: &[FaceSlot], cache: &ResultCache) {
        for slot in slots {
            match cache.get(slot.id).and_then(|e| e.result.as_ref()) {
                Some(result) => self.draw_resolved(frame, &slot.bbox, result),
                None => self.draw_pending(frame, &slot.bbox),
            }
        }
    }

    fn render_status(&self, frame: &mut Frame, status: &StreamStatus) {
        if !self.status_bar {
            return;
        }
        let text = format!(
            "FPS: {:.1} | FRAME: {} | FACES: {}",
            status.fps, status.frame_index, status.faces
        );
        let height = text_height(LINE_SCALE) + 2 * STATUS_PADDING;
        canvas::fill_rect(
            frame,
            &Rect::new(0, 0, frame.width() as i32, height),
            STATUS_BACKGROUND,
        );
        canvas::draw_text(
            frame,
            STATUS_PADDING,
            STATUS_PADDING,
            &text,
            LINE_SCALE,
            STATUS_COLOR,
        );
    }
}

/// Places the label above the box, or just inside its top edge when there
/// is no room above.
fn draw_label_above(frame: &mut Frame, bbox: &Rect, text: &str, scale: i32, color: [u8; 3]) {
    let h = text_height(scale);
    let above = bbox.y - LABEL_GAP - h;
    let y = if above >= 0 { above } else { bbox.y + LABEL_GAP };
    canvas::draw_text(frame, bbox.x, y, text, scale, color);
}

fn display_name(label: &str) -> String {
    label.to_uppercase()
}

fn bar_width(score: f32) -> i32 {
    ((score.clamp(0.0, 100.0) / 100.0) * BAR_MAX_WIDTH as f32).round() as i32
}
