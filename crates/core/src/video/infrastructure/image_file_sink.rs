use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::video::domain::frame_sink::{FrameSink, SinkError};

/// Writes each frame to `<dir>/<prefix><index>.<ext>` using the `image`
/// crate; the format follows the extension.
pub struct ImageFileSink {
    dir: PathBuf,
    prefix: String,
    extension: String,
    written: usize,
}

impl ImageFileSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            prefix: "frame_".to_string(),
            extension: "png".to_string(),
            written: 0,
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_lowercase();
        self
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn path_for(&self, index: usize) -> PathBuf {
        self.dir
            .join(format!("{}{index:06}.{}", self.prefix, self.extension))
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl FrameSink for ImageFileSink {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        std::fs::create_dir_all(&self.dir)?;
        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or(SinkError::BadFrame {
                width: frame.width(),
                height: frame.height(),
            })?;
        img.save(self.path_for(frame.index()))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        log::info!("Wrote {} image(s) to {}", self.written, self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_creates_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("annotated");
        let mut sink = ImageFileSink::new(&out);

        sink.write(&Frame::filled(20, 10, [50, 100, 200], 0)).unwrap();
        sink.write(&Frame::filled(20, 10, [50, 100, 200], 7)).unwrap();
        sink.close().unwrap();

        assert!(out.join("frame_000000.png").exists());
        assert!(out.join("frame_000007.png").exists());
        assert_eq!(sink.written(), 2);
    }

    #[test]
    fn test_png_preserves_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageFileSink::new(dir.path());
        sink.write(&Frame::filled(8, 8, [50, 100, 200], 1)).unwrap();

        let img = image::open(sink.path_for(1)).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [50, 100, 200]);
    }

    #[test]
    fn test_jpeg_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = ImageFileSink::new(dir.path())
            .with_extension(".JPG")
            .with_prefix("out-");
        sink.write(&Frame::filled(8, 8, [0, 0, 0], 3)).unwrap();
        assert!(dir.path().join("out-000003.jpg").exists());
    }

    #[test]
    fn test_unwritable_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let mut sink = ImageFileSink::new(blocker.join("sub"));
        assert!(sink.write(&Frame::filled(8, 8, [0, 0, 0], 0)).is_err());
    }
}
