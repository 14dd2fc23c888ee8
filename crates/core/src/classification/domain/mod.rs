pub mod classifier;
pub mod emotion;
pub mod emotion_result;
