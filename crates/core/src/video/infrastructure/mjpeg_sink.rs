//! Motion-JPEG output: each frame is a JPEG part of a
//! `multipart/x-mixed-replace` body, which browsers render as live video.
use std::convert::Infallible;
use std::io::Write;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, oneshot};

use crate::shared::constants::MJPEG_BOUNDARY;
use crate::shared::frame::Frame;
use crate::video::domain::frame_sink::{FrameSink, SinkError};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encodes a frame as a baseline JPEG.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, SinkError> {
    if frame.channels() != 3 {
        return Err(SinkError::BadFrame {
            width: frame.width(),
            height: frame.height(),
        });
    }
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode(
        frame.data(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

/// Writes one multipart part: boundary line, part headers, body.
pub fn write_part<W: Write>(out: &mut W, jpeg: &[u8]) -> std::io::Result<()> {
    write!(
        out,
        "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    )?;
    out.write_all(jpeg)?;
    out.write_all(b"\r\n")?;
    out.flush()
}

/// MJPEG parts written to any byte sink, e.g. a file or a socket.
pub struct MjpegSink<W: Write + Send> {
    out: Option<W>,
    quality: u8,
}

impl<W: Write + Send> MjpegSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Some(out),
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Returns the writer, closing the sink.
    pub fn into_inner(mut self) -> Option<W> {
        self.out.take()
    }
}

impl<W: Write + Send> FrameSink for MjpegSink<W> {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        let out = self.out.as_mut().ok_or(SinkError::NotOpen)?;
        let jpeg = encode_jpeg(frame, self.quality)?;
        write_part(out, &jpeg)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }
}

/// Parts buffered per viewer; a viewer further behind skips ahead.
const VIEWER_BACKLOG: usize = 4;
const SERVER_STOP_GRACE: Duration = Duration::from_secs(2);
const JOIN_POLL: Duration = Duration::from_millis(5);

const INDEX_HTML: &str = "<!doctype html><html><head><title>moodcam</title></head>\
<body style=\"margin:0;background:#000\"><img src=\"/video_feed\" style=\"width:100%\"></body></html>";

/// Serves the annotated stream over HTTP with axum: `/video_feed` is the
/// MJPEG stream, `/` a page embedding it.
///
/// The server runs on its own tokio runtime thread. `write` encodes the
/// frame once and publishes it on a broadcast channel without waiting;
/// each viewer's connection task copies parts out at its own pace and
/// skips parts it fell too far behind on. Frames produced while nobody
/// is watching are not encoded.
pub struct MjpegServerSink {
    parts: Option<broadcast::Sender<Bytes>>,
    /// Kept so that viewers can subscribe; not counted as a viewer.
    template: Arc<broadcast::Receiver<Bytes>>,
    local_addr: SocketAddr,
    stop_tx: Option<oneshot::Sender<()>>,
    server: Option<std::thread::JoinHandle<()>>,
    quality: u8,
}

impl MjpegServerSink {
    /// Binds the listener and starts serving. An unavailable address is a
    /// startup error.
    pub fn bind(addr: impl ToSocketAddrs) -> Result<Self, SinkError> {
        let std_listener = std::net::TcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let local_addr = std_listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("mjpeg-server")
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener)?
        };

        let (parts, template) = broadcast::channel::<Bytes>(VIEWER_BACKLOG);
        let template = Arc::new(template);
        let router = Router::new()
            .route("/", get(index))
            .route("/video_feed", get(video_feed))
            .with_state(template.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = std::thread::Builder::new()
            .name("mjpeg-server".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    let stop = async move {
                        stop_rx.await.ok();
                    };
                    if let Err(e) = axum::serve(listener, router)
                        .with_graceful_shutdown(stop)
                        .await
                    {
                        log::warn!("MJPEG server stopped: {e}");
                    }
                });
            })?;

        log::info!("Serving MJPEG on http://{local_addr}/");
        Ok(Self {
            parts: Some(parts),
            template,
            local_addr,
            stop_tx: Some(stop_tx),
            server: Some(server),
            quality: DEFAULT_JPEG_QUALITY,
        })
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connected stream viewers.
    pub fn viewers(&self) -> usize {
        self.parts
            .as_ref()
            .map_or(0, |tx| tx.receiver_count().saturating_sub(1))
    }

    fn stop_server(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            if stop_tx.send(()).is_err() {
                log::debug!("MJPEG server already stopped");
            }
        }
        let Some(handle) = self.server.take() else {
            return;
        };
        let deadline = Instant::now() + SERVER_STOP_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(JOIN_POLL);
        }
        if !handle.is_finished() {
            log::warn!("MJPEG server still shutting down after {SERVER_STOP_GRACE:?}; detaching");
        } else if handle.join().is_err() {
            log::warn!("MJPEG server thread panicked");
        }
    }
}

/// `Content-Type` of the stream response.
pub fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}")
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn video_feed(State(template): State<Arc<broadcast::Receiver<Bytes>>>) -> impl IntoResponse {
    log::info!("MJPEG viewer connected");
    let parts = futures::stream::unfold(template.resubscribe(), |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(part) => return Some((Ok::<Bytes, Infallible>(part), rx)),
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("MJPEG viewer behind; skipped {skipped} frame(s)");
                }
                Err(RecvError::Closed) => {
                    log::info!("MJPEG stream ended");
                    return None;
                }
            }
        }
    });
    (
        [
            (header::CONTENT_TYPE, stream_content_type()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
}

impl FrameSink for MjpegServerSink {
    fn write(&mut self, frame: &Frame) -> Result<(), SinkError> {
        if self.parts.is_none() {
            return Err(SinkError::NotOpen);
        }
        if self.viewers() == 0 {
            return Ok(());
        }
        let jpeg = encode_jpeg(frame, self.quality)?;
        let mut part = Vec::with_capacity(jpeg.len() + 96);
        write_part(&mut part, &jpeg)?;

        if let Some(tx) = &self.parts {
            if tx.send(Bytes::from(part)).is_err() {
                log::debug!("MJPEG viewers left; frame dropped");
            }
        }
        Ok(())
    }

    /// Ends every viewer's stream and stops the server.
    fn close(&mut self) -> Result<(), SinkError> {
        self.parts = None;
        self.stop_server();
        Ok(())
    }
}

impl Drop for MjpegServerSink {
    fn drop(&mut self) {
        self.parts = None;
        self.stop_server();
    }
}
