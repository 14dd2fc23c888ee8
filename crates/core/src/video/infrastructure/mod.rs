pub mod ffmpeg_frame_source;
pub mod ffmpeg_video_sink;
pub mod image_file_sink;
pub mod image_sequence_source;
pub mod mjpeg_sink;
