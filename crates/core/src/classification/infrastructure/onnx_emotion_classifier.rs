//! FER+ emotion classifier backed by ONNX Runtime.
//!
//! The model takes a 64x64 grayscale face with raw 0-255 intensities and
//! emits eight unnormalised logits. Scores are softmaxed and reported as
//! percentages.
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

use crate::classification::domain::classifier::{Classifier, ClassifyError};
use crate::classification::domain::emotion::Emotion;
use crate::classification::domain::emotion_result::EmotionResult;
use crate::shared::frame::Frame;
use crate::shared::onnx_session;

const INPUT_SIZE: u32 = 64;

/// Crops narrower or shorter than this are rejected before inference.
pub const MIN_CROP_SIZE: u32 = 8;

/// Output order of the FER+ logits.
const LABELS: [Emotion; 8] = [
    Emotion::Neutral,
    Emotion::Happy,
    Emotion::Surprise,
    Emotion::Sad,
    Emotion::Angry,
    Emotion::Disgust,
    Emotion::Fear,
    Emotion::Contempt,
];

pub struct OnnxEmotionClassifier {
    session: ort::session::Session,
}

impl OnnxEmotionClassifier {
    /// `intra_threads` is the per-session thread budget; pools of several
    /// classifiers should split the machine between them.
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self, Box<dyn std::error::Error>> {
        let session = onnx_session::open_session(model_path, intra_threads)?;
        log::debug!("Loaded emotion classifier {}", model_path.display());
        Ok(Self { session })
    }

    fn logits(&mut self, face: &Frame) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
        let tensor = preprocess(face)?;
        let input = ort::value::Tensor::from_array(tensor)?;
        let outputs = self.session.run(ort::inputs![input])?;
        let array = outputs[0].try_extract_array::<f32>()?;
        let slice = array.as_slice().ok_or("Cannot get logits slice")?;
        Ok(slice.to_vec())
    }
}

impl Classifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &Frame) -> Result<EmotionResult, ClassifyError> {
        if face.width() < MIN_CROP_SIZE || face.height() < MIN_CROP_SIZE {
            return Err(ClassifyError::DegenerateCrop {
                width: face.width(),
                height: face.height(),
            });
        }
        let logits = self
            .logits(face)
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;
        scores_from_logits(&logits)
    }
}

/// Grayscale, resize to the model input and lay out as `[1, 1, H, W]`.
fn preprocess(face: &Frame) -> Result<ndarray::Array4<f32>, Box<dyn std::error::Error>> {
    let rgb = RgbImage::from_raw(face.width(), face.height(), face.data().to_vec())
        .ok_or("Face crop is not a packed RGB buffer")?;
    let gray: GrayImage = imageops::grayscale(&rgb);
    let resized = imageops::resize(&gray, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);

    let n = INPUT_SIZE as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 1, n, n));
    for (x, y, pixel) in resized.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
    }
    Ok(tensor)
}

fn scores_from_logits(logits: &[f32]) -> Result<EmotionResult, ClassifyError> {
    if logits.len() != LABELS.len() {
        return Err(ClassifyError::Inference(format!(
            "expected {} logits, got {}",
            LABELS.len(),
            logits.len()
        )));
    }
    let probs = softmax(logits);
    EmotionResult::from_scores(
        LABELS
            .iter()
            .zip(probs)
            .map(|(emotion, p)| (emotion.label(), p * 100.0)),
    )
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
