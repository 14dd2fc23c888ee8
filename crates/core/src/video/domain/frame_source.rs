use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;

pub type FrameResult = Result<Frame, Box<dyn std::error::Error>>;

/// Produces frames from a video file, stream or image set.
///
/// Implementations are constructed with their location and only touch it in
/// `open`, so a bad path surfaces as a startup error.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>>;

    /// Lazily yields frames in presentation order with sequential indices.
    /// A read error is yielded once; callers stop there.
    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_>;

    fn close(&mut self);
}
