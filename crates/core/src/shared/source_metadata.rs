use std::path::PathBuf;

/// Properties of an opened frame source.
///
/// Live streams report `total_frames == 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub total_frames: usize,
    pub codec: String,
    pub source_path: Option<PathBuf>,
}

impl SourceMetadata {
    pub fn is_live(&self) -> bool {
        self.total_frames == 0
    }
}
