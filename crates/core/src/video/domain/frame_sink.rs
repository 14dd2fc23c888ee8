use thiserror::Error;

use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("video encoding failed: {0}")]
    Video(String),
    #[error("frame buffer does not match {width}x{height}")]
    BadFrame { width: u32, height: u32 },
    #[error("sink is not open")]
    NotOpen,
}

/// Consumes annotated frames.
///
/// A failed `write` affects only that frame; the caller keeps going.
pub trait FrameSink: Send {
    /// Called once before the first frame with the source properties.
    fn open(&mut self, _metadata: &SourceMetadata) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError>;

    /// Flushes and releases resources. Safe to call more than once.
    fn close(&mut self) -> Result<(), SinkError>;
}
