use std::path::{Path, PathBuf};

use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_source::{FrameResult, FrameSource};

/// Treats a single image, or every image in a directory sorted by file
/// name, as a sequence of frames.
///
/// Images are decoded one at a time with the `image` crate as the loop
/// asks for them. Frames keep their own dimensions; metadata reports the
/// first image's.
pub struct ImageSequenceSource {
    location: PathBuf,
    fps: f64,
    files: Vec<PathBuf>,
}

impl ImageSequenceSource {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            fps: 0.0,
            files: Vec::new(),
        }
    }

    /// Nominal rate reported in the metadata, for sinks that need one.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn load_frame(path: &Path, index: usize) -> FrameResult {
    let img = image::open(path)
        .map_err(|e| format!("{}: {e}", path.display()))?
        .to_rgb8();
    let (w, h) = img.dimensions();
    Ok(Frame::new(img.into_raw(), w, h, 3, index))
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<SourceMetadata, Box<dyn std::error::Error>> {
        let files = if self.location.is_dir() {
            list_images(&self.location)?
        } else if self.location.is_file() {
            vec![self.location.clone()]
        } else {
            return Err(format!("No such file or directory: {}", self.location.display()).into());
        };
        let first = files
            .first()
            .ok_or_else(|| format!("No images found in {}", self.location.display()))?;
        let (width, height) = image::image_dimensions(first)?;

        let metadata = SourceMetadata {
            width,
            height,
            fps: self.fps,
            total_frames: files.len(),
            codec: String::new(),
            source_path: Some(self.location.clone()),
        };
        log::info!(
            "Opened {} image(s) from {}",
            files.len(),
            self.location.display()
        );
        self.files = files;
        Ok(metadata)
    }

    fn frames(&mut self) -> Box<dyn Iterator<Item = FrameResult> + '_> {
        if self.files.is_empty() {
            return Box::new(std::iter::once(Err("ImageSequenceSource: not opened".into())));
        }
        Box::new(
            self.files
                .iter()
                .enumerate()
                .map(|(i, path)| load_frame(path, i)),
        )
    }

    fn close(&mut self) {
        self.files.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_image(dir: &Path, name: &str, w: u32, h: u32, rgb: [u8; 3]) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::from_pixel(w, h, image::Rgb(rgb))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_single_image_is_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_image(dir.path(), "face.png", 100, 80, [50, 100, 200]);

        let mut source = ImageSequenceSource::new(&path);
        let meta = source.open().unwrap();
        assert_eq!((meta.width, meta.height), (100, 80));
        assert_eq!(meta.total_frames, 1);
        assert!(!meta.is_live());

        let frames: Vec<Frame> = source.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].index(), 0);
        assert_eq!(&frames[0].data()[..3], &[50, 100, 200]);
    }

    #[test]
    fn test_directory_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 10, 10, [2, 2, 2]);
        write_image(dir.path(), "a.png", 10, 10, [1, 1, 1]);
        write_image(dir.path(), "c.JPG", 12, 10, [3, 3, 3]);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let mut source = ImageSequenceSource::new(dir.path()).with_fps(5.0);
        let meta = source.open().unwrap();
        assert_eq!(meta.total_frames, 3);
        assert_eq!(meta.fps, 5.0);

        let frames: Vec<Frame> = source.frames().map(|f| f.unwrap()).collect();
        assert_eq!(frames[0].data()[0], 1);
        assert_eq!(frames[1].data()[0], 2);
        assert_eq!(frames[2].width(), 12);
        assert_eq!(frames[2].index(), 2);
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageSequenceSource::new(dir.path()).open().is_err());
    }

    #[test]
    fn test_missing_path_fails_to_open() {
        assert!(ImageSequenceSource::new("/nonexistent/images").open().is_err());
    }

    #[test]
    fn test_corrupt_file_yields_error() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 10, 10, [1, 1, 1]);
        let mut source = ImageSequenceSource::new(dir.path());
        source.open().unwrap();
        std::fs::write(dir.path().join("a.png"), b"not a png").unwrap();

        assert!(source.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_frames_without_open_yields_error() {
        let mut source = ImageSequenceSource::new("unused");
        assert!(source.frames().next().unwrap().is_err());
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("x.jpeg")));
        assert!(is_image_file(Path::new("x.PNG")));
        assert!(!is_image_file(Path::new("x.mp4")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
