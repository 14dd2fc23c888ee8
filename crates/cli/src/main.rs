use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use moodcam_core::annotation::infrastructure::overlay_annotator::OverlayAnnotator;
use moodcam_core::classification::domain::classifier::Classifier;
use moodcam_core::classification::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use moodcam_core::detection::infrastructure::onnx_yolo_locator::OnnxYoloLocator;
use moodcam_core::inference::domain::face_context::FaceContext;
use moodcam_core::inference::infrastructure::classifier_pool::ClassifierPool;
use moodcam_core::pipeline::annotate_stream_use_case::AnnotateStreamUseCase;
use moodcam_core::pipeline::pipeline_config::PipelineConfig;
use moodcam_core::pipeline::pipeline_logger::LogPipelineLogger;
use moodcam_core::shared::constants::{
    EMOTION_MODEL_NAME, EMOTION_MODEL_URL, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use moodcam_core::shared::model_resolver::ModelSource;
use moodcam_core::video::domain::frame_sink::FrameSink;
use moodcam_core::video::domain::frame_source::FrameSource;
use moodcam_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use moodcam_core::video::infrastructure::ffmpeg_video_sink::FfmpegVideoSink;
use moodcam_core::video::infrastructure::image_file_sink::ImageFileSink;
use moodcam_core::video::infrastructure::image_sequence_source::{
    is_image_file, ImageSequenceSource,
};
use moodcam_core::video::infrastructure::mjpeg_sink::{MjpegServerSink, MjpegSink};

/// Live face emotion annotation for videos, streams and image folders.
#[derive(Parser)]
#[command(name = "moodcam")]
struct Cli {
    /// Input video file, stream URL, image file or directory of images.
    input: String,

    /// Write annotated frames as numbered PNG files into this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Record the annotated frames as a video file.
    #[arg(long)]
    video_out: Option<PathBuf>,

    /// Serve the annotated frames as MJPEG over HTTP, e.g. 127.0.0.1:8080.
    #[arg(long)]
    serve: Option<String>,

    /// Write the MJPEG multipart stream to this file.
    #[arg(long)]
    mjpeg: Option<PathBuf>,

    /// JSON config file. Defaults to <config dir>/Moodcam/config.json when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Frames between classifications of the same face.
    #[arg(long)]
    interval: Option<usize>,

    /// Number of classifier worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Pending classification requests before new ones are shed.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Emotions listed under each face.
    #[arg(long)]
    top_k: Option<usize>,

    /// Hide emotions scoring below this percentage.
    #[arg(long)]
    min_score: Option<f32>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Dispatch new faces together instead of spreading them over the interval.
    #[arg(long)]
    no_stagger: bool,

    /// Do not draw the FPS / frame / faces strip.
    #[arg(long)]
    no_status_bar: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Nominal frame rate for image input (used by --video-out).
    #[arg(long, default_value = "10")]
    image_fps: f64,

    /// Face detection model file (downloaded if omitted).
    #[arg(long)]
    face_model: Option<PathBuf>,

    /// Emotion model file (downloaded if omitted).
    #[arg(long)]
    emotion_model: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    if cli.print_config {
        println!("{}", config.to_json()?);
        return Ok(());
    }
    validate(&cli)?;

    let source = open_source(&cli);
    let sink = open_sink(&cli)?;
    let locator = OnnxYoloLocator::new(
        &resolve_model(&cli.face_model, YOLO_MODEL_NAME, YOLO_MODEL_URL)?,
        config.locator_config(),
    )?;
    let pool = build_pool(&cli, &config)?;

    let annotator = OverlayAnnotator::new(config.label_policy()).with_status_bar(config.status_bar);
    let context = FaceContext::new(config.tracker_config(), config.scheduler_config());

    let mut use_case = AnnotateStreamUseCase::new(
        source,
        Box::new(locator),
        pool,
        Box::new(annotator),
        sink,
        context,
    )
    .with_logger(Box::new(LogPipelineLogger::default()))
    .with_max_frames(cli.max_frames);

    let summary = use_case.execute()?;
    log::info!(
        "Done: {} frames, {} classifications, {} shed",
        summary.frames,
        summary.results_applied,
        summary.shed
    );
    if let Some(e) = summary.source_error {
        return Err(format!("Input ended early: {e}").into());
    }
    Ok(())
}

/// File values first, flags on top.
fn load_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::load_or_default()?,
    };

    if let Some(v) = cli.interval {
        config.interval = v;
    }
    if let Some(v) = cli.workers {
        config.worker_pool_size = v;
    }
    if let Some(v) = cli.queue_capacity {
        config.queue_capacity = v;
    }
    if let Some(v) = cli.top_k {
        config.top_k = v;
    }
    if let Some(v) = cli.min_score {
        config.min_score = v;
    }
    if let Some(v) = cli.confidence {
        config.confidence = v;
    }
    if cli.no_stagger {
        config.stagger = false;
    }
    if cli.no_status_bar {
        config.status_bar = false;
    }

    config.validate()?;
    Ok(config)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !is_url(&cli.input) && !Path::new(&cli.input).exists() {
        return Err(format!("Input not found: {}", cli.input).into());
    }
    let outputs = [
        cli.output_dir.is_some(),
        cli.video_out.is_some(),
        cli.serve.is_some(),
        cli.mjpeg.is_some(),
    ];
    match outputs.iter().filter(|&&set| set).count() {
        0 => {
            return Err("One of --output-dir, --video-out, --serve or --mjpeg is required".into())
        }
        1 => {}
        _ => {
            return Err(
                "--output-dir, --video-out, --serve and --mjpeg are mutually exclusive".into(),
            )
        }
    }
    if !(cli.image_fps > 0.0) {
        return Err(format!("Image fps must be positive, got {}", cli.image_fps).into());
    }
    Ok(())
}

fn is_url(input: &str) -> bool {
    input.contains("://")
}

fn open_source(cli: &Cli) -> Box<dyn FrameSource> {
    let path = Path::new(&cli.input);
    if !is_url(&cli.input) && (path.is_dir() || is_image_file(path)) {
        Box::new(ImageSequenceSource::new(path).with_fps(cli.image_fps))
    } else {
        Box::new(FfmpegFrameSource::new(&cli.input))
    }
}

fn open_sink(cli: &Cli) -> Result<Box<dyn FrameSink>, Box<dyn std::error::Error>> {
    if let Some(dir) = &cli.output_dir {
        return Ok(Box::new(ImageFileSink::new(dir)));
    }
    if let Some(path) = &cli.video_out {
        return Ok(Box::new(FfmpegVideoSink::new(path)));
    }
    if let Some(addr) = &cli.serve {
        return Ok(Box::new(MjpegServerSink::bind(addr.as_str())?));
    }
    if let Some(path) = &cli.mjpeg {
        let file = File::create(path)
            .map_err(|e| format!("Cannot create {}: {e}", path.display()))?;
        return Ok(Box::new(MjpegSink::new(BufWriter::new(file))));
    }
    Err("No output selected".into())
}

fn build_pool(
    cli: &Cli,
    config: &PipelineConfig,
) -> Result<ClassifierPool, Box<dyn std::error::Error>> {
    let model_path = resolve_model(&cli.emotion_model, EMOTION_MODEL_NAME, EMOTION_MODEL_URL)?;
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    let intra_threads = (cores / config.worker_pool_size).max(1);

    let mut classifiers: Vec<Box<dyn Classifier>> = Vec::with_capacity(config.worker_pool_size);
    for _ in 0..config.worker_pool_size {
        classifiers.push(Box::new(OnnxEmotionClassifier::new(&model_path, intra_threads)?));
    }
    Ok(ClassifierPool::new(classifiers, config.queue_capacity))
}

fn resolve_model(
    explicit: &Option<PathBuf>,
    name: &str,
    url: &str,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let source = match explicit {
        Some(path) => ModelSource::File(path.clone()),
        None => ModelSource::remote(name, url),
    };
    log::info!("Resolving model: {name}");
    let label = name.to_string();
    let path = source.resolve(Some(Box::new(move |downloaded, total| {
        download_progress(&label, downloaded, total)
    })))?;
    Ok(path)
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading {name}... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading {name}... {downloaded} bytes");
    }
}
