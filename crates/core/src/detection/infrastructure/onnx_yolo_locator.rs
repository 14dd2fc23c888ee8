//! YOLO face locator backed by ONNX Runtime.
//!
//! Letterboxes the frame to the model's square input, runs inference, keeps
//! rows above the confidence threshold, applies NMS and maps the surviving
//! boxes back to frame coordinates.
use std::path::Path;

use crate::detection::domain::face_locator::{FaceLocator, LocatorConfig};
use crate::shared::frame::Frame;
use crate::shared::onnx_session;
use crate::shared::rect::Rect;

/// Used when the model declares a dynamic input shape.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// YOLO letterbox padding value (114 gray).
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloLocator {
    session: ort::session::Session,
    config: LocatorConfig,
    input_size: u32,
}

impl OnnxYoloLocator {
    pub fn new(model_path: &Path, config: LocatorConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = onnx_session::open_session(model_path, threads)?;
        let input_size = onnx_session::declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        log::info!(
            "Loaded face locator {} (input {input_size}px)",
            model_path.display()
        );
        Ok(Self {
            session,
            config,
            input_size,
        })
    }
}

impl FaceLocator for OnnxYoloLocator {
    fn locate(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let tensor = letterbox.tensor(frame);

        let input = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        let shape = output.shape().to_vec();
        let data = output.as_slice().ok_or("Cannot get tensor slice")?;

        let mut candidates = parse_rows(data, &shape, self.config.confidence)?;
        for c in &mut candidates {
            c.bbox = letterbox.to_frame(c.bbox);
        }
        let kept = nms(candidates, self.config.nms_iou);

        let min = self.config.min_face_size as i32;
        Ok(kept
            .into_iter()
            .map(|c| Rect::from_corners(c.bbox[0], c.bbox[1], c.bbox[2], c.bbox[3]))
            .filter(|r| r.width >= min && r.height >= min)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Aspect-preserving resize into a square input with centred padding.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    size: u32,
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    scaled_w: u32,
    scaled_h: u32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f64 / width as f64).min(size as f64 / height as f64);
        let scaled_w = ((width as f64 * scale).round() as u32).min(size);
        let scaled_h = ((height as f64 * scale).round() as u32).min(size);
        Self {
            size,
            scale,
            pad_x: (size - scaled_w) / 2,
            pad_y: (size - scaled_h) / 2,
            scaled_w,
            scaled_h,
        }
    }

    /// NCHW float tensor in [0, 1], nearest-neighbour sampled.
    fn tensor(&self, frame: &Frame) -> ndarray::Array4<f32> {
        let n = self.size as usize;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, n, n), PAD_VALUE);
        let src = frame.as_ndarray();
        let max_y = frame.height() as usize - 1;
        let max_x = frame.width() as usize - 1;

        for y in 0..self.scaled_h as usize {
            let sy = ((y as f64 / self.scale) as usize).min(max_y);
            let ty = self.pad_y as usize + y;
            for x in 0..self.scaled_w as usize {
                let sx = ((x as f64 / self.scale) as usize).min(max_x);
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[sy, sx, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps `[x1, y1, x2, y2]` from model input space back to the frame.
    fn to_frame(&self, b: [f64; 4]) -> [f64; 4] {
        let px = self.pad_x as f64;
        let py = self.pad_y as f64;
        [
            (b[0] - px) / self.scale,
            (b[1] - py) / self.scale,
            (b[2] - px) / self.scale,
            (b[3] - py) / self.scale,
        ]
    }
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    bbox: [f64; 4],
    confidence: f64,
}

/// Reads `[cx, cy, w, h, conf, ...]` rows from a `[1, F, N]` or `[1, N, F]`
/// output; the smaller of the two trailing dimensions is the feature axis.
fn parse_rows(
    data: &[f32],
    shape: &[usize],
    min_confidence: f64,
) -> Result<Vec<Candidate>, Box<dyn std::error::Error>> {
    if shape.len() != 3 {
        return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
    }
    let feature_major = shape[1] < shape[2];
    let (rows, features) = if feature_major {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if features < 5 {
        return Err(format!("YOLO output has only {features} features per row").into());
    }

    let value = |row: usize, feature: usize| -> f64 {
        let i = if feature_major {
            feature * rows + row
        } else {
            row * features + feature
        };
        data[i] as f64
    };

    let mut out = Vec::new();
    for row in 0..rows {
        let confidence = value(row, 4);
        if confidence < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(row, 0), value(row, 1), value(row, 2), value(row, 3));
        out.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence,
        });
    }
    Ok(out)
}

/// Greedy NMS in descending confidence order.
fn nms(mut candidates: Vec<Candidate>, iou_thresh: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if kept.iter().all(|k| corner_iou(&k.bbox, &c.bbox) <= iou_thresh) {
            kept.push(c);
        }
    }
    kept
}

fn corner_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = w * h;
    if inter == 0.0 {
        return 0.0;
    }
    let area = |r: &[f64; 4]| (r[2] - r[0]) * (r[3] - r[1]);
    inter / (area(a) + area(b) - inter)
}
