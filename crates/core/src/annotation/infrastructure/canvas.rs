//! Pixel-level drawing on RGB frames. All primitives clip silently at the
//! frame edge.
use crate::annotation::infrastructure::glyphs::{glyph, GLYPH_ADVANCE, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

pub fn fill_rect(frame: &mut Frame, rect: &Rect, color: [u8; 3]) {
    let Some(visible) = rect.clamp_to(frame.width(), frame.height()) else {
        return;
    };
    for y in visible.y..visible.bottom() {
        for x in visible.x..visible.right() {
            frame.put_pixel(x, y, color);
        }
    }
}

/// Outline drawn inward from the rect edge.
pub fn stroke_rect(frame: &mut Frame, rect: &Rect, color: [u8; 3], thickness: i32) {
    let t = thickness.max(1).min(rect.width.min(rect.height).max(1));
    let (x, y, w, h) = (rect.x, rect.y, rect.width, rect.height);
    fill_rect(frame, &Rect::new(x, y, w, t), color);
    fill_rect(frame, &Rect::new(x, y + h - t, w, t), color);
    fill_rect(frame, &Rect::new(x, y, t, h), color);
    fill_rect(frame, &Rect::new(x + w - t, y, t, h), color);
}

/// Draws `text` with its top-left corner at `(x, y)`; returns the advance.
pub fn draw_text(frame: &mut Frame, x: i32, y: i32, text: &str, scale: i32, color: [u8; 3]) -> i32 {
    let scale = scale.max(1);
    let mut cursor = x;
    for ch in text.chars() {
        draw_glyph(frame, cursor, y, ch, scale, color);
        cursor += GLYPH_ADVANCE * scale;
    }
    cursor - x
}

pub fn text_width(text: &str, scale: i32) -> i32 {
    let n = text.chars().count() as i32;
    if n == 0 {
        return 0;
    }
    (n * GLYPH_ADVANCE - 1) * scale.max(1)
}

pub fn text_height(scale: i32) -> i32 {
    GLYPH_HEIGHT * scale.max(1)
}

fn draw_glyph(frame: &mut Frame, x: i32, y: i32, ch: char, scale: i32, color: [u8; 3]) {
    for (row, bits) in glyph(ch).iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                let px = x + col * scale;
                let py = y + row as i32 * scale;
                fill_rect(frame, &Rect::new(px, py, scale, scale), color);
            }
        }
    }
}
