use std::path::{Path, PathBuf};

use crate::shared::frame::Frame;
use crate::shared::source_metadata::SourceMetadata;
use crate::video::domain::frame_sink::{FrameSink, SinkError};

/// Frame rate used when the source reports none (image sets, some streams).
const FALLBACK_FPS: i32 = 30;

/// Encodes annotated frames to an MPEG-4 video file via ffmpeg-next.
pub struct FfmpegVideoSink {
    path: PathBuf,
    encoding: Option<Encoding>,
}

struct Encoding {
    octx: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::codec::encoder::video::Encoder,
    scaler: ffmpeg_next::software::scaling::Context,
    width: u32,
    height: u32,
    fps: i32,
    frame_count: usize,
}

// Safety: FfmpegVideoSink is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegVideoSink {}

impl FfmpegVideoSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            encoding: None,
        }
    }
}

fn video_err(e: impl std::fmt::Display) -> SinkError {
    SinkError::Video(e.to_string())
}

impl FrameSink for FfmpegVideoSink {
    fn open(&mut self, metadata: &SourceMetadata) -> Result<(), SinkError> {
        ffmpeg_next::init().map_err(video_err)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut octx = ffmpeg_next::format::output(&self.path).map_err(video_err)?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(ffmpeg_next::codec::Id::MPEG4)
            .ok_or_else(|| SinkError::Video("MPEG4 encoder not found".into()))?;
        let mut ost = octx.add_stream(Some(codec)).map_err(video_err)?;

        let mut encoder_ctx = ffmpeg_next::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(video_err)?;

        let fps = match metadata.fps.round() as i32 {
            f if f > 0 => f,
            _ => FALLBACK_FPS,
        };
        encoder_ctx.set_width(metadata.width);
        encoder_ctx.set_height(metadata.height);
        encoder_ctx.set_format(ffmpeg_next::format::Pixel::YUV420P);
        encoder_ctx.set_time_base(ffmpeg_next::Rational(1, fps));
        encoder_ctx.set_frame_rate(Some(ffmpeg_next::Rational(fps, 1)));
        if global_header {
            encoder_ctx.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let encoder = encoder_ctx
            .open_with(ffmpeg_next::Dictionary::new())
            .map_err(video_err)?;
        ost.set_parameters(&encoder);
        octx.write_header().map_err(video_err)?;

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            metadata.width,
            metadata.height,
            ffmpeg_next::format::Pixel::YUV420P,
            metadata.width,
            metadata.height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(video_err)?;

        log::info!(
            "Writing {}x{} @ {fps} fps to {}",
            metadata.width,
            metadata.height,
            self.path.display()
        );
        self.encoding = Some(Encoding {
            octx,
            encoder,
            scaler,
            width: metadata.width,
            height: metadata.height,
            fps,
            frame_count: 0,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let enc = self.encoding.as_mut().ok_or(SinkError::NotOpen)?;
        if frame.width() != enc.width || frame.height() != enc.height || frame.channels() != 3 {
            return Err(SinkError::BadFrame {
                width: enc.width,
                height: enc.height,
            });
        }

        let mut rgb = ffmpeg_next::util::frame::video::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            enc.width,
            enc.height,
        );
        let stride = rgb.stride(0);
        let row_bytes = enc.width as usize * 3;
        let dst = rgb.data_mut(0);
        for (row, src) in frame.data().chunks_exact(row_bytes).enumerate() {
            dst[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
        enc.scaler.run(&rgb, &mut yuv).map_err(video_err)?;
        yuv.set_pts(Some(enc.frame_count as i64));
        enc.encoder.send_frame(&yuv).map_err(video_err)?;
        enc.write_packets()?;

        enc.frame_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut enc) = self.encoding.take() else {
            return Ok(());
        };
        enc.encoder.send_eof().map_err(video_err)?;
        enc.write_packets()?;
        enc.octx.write_trailer().map_err(video_err)?;
        log::info!("Wrote {} frames to {}", enc.frame_count, self.path.display());
        Ok(())
    }
}

impl Encoding {
    fn write_packets(&mut self) -> Result<(), SinkError> {
        let time_base = self
            .octx
            .stream(0)
            .ok_or_else(|| SinkError::Video("output stream missing".into()))?
            .time_base();
        let mut packet = ffmpeg_next::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(ffmpeg_next::Rational(1, self.fps), time_base);
            packet.write_interleaved(&mut self.octx).map_err(video_err)?;
        }
        Ok(())
    }
}
