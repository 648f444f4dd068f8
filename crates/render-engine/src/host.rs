//! Host collaborators driven by an encoding job.
//!
//! The job never talks to a platform directly. It owns one implementation of
//! each trait below and reacts to [`HostEvent`]s that those implementations
//! (and the display scheduler) post onto the job's event queue.

use clipforge_audio::graph::CaptureTrack;
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::{FormatCandidate, Rgba};
use tokio::sync::mpsc;

/// Events consumed by the job state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Source duration and dimensions are known.
    MetadataReady,
    MetadataFailed(String),
    /// A requested seek has completed.
    Seeked,
    SeekFailed(String),
    /// The display is ready for the next frame.
    FrameReady,
    /// Playback reached the natural end of the source.
    Ended,
    /// A chunk of encoded output.
    EncoderData(Vec<u8>),
    /// The encoder flushed everything and stopped.
    EncoderStopped,
    EncoderFailed(String),
}

pub type EventSender = mpsc::UnboundedSender<HostEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// An RGBA8 image with its presentation time.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Presentation time on the source timeline.
    pub pts_secs: f64,
    /// Row-major RGBA, straight alpha, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Opaque black frame.
    pub fn new(width: u32, height: u32) -> Self {
        let mut data = vec![0u8; width as usize * height as usize * 4];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            width,
            height,
            pts_secs: 0.0,
            data,
        }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> ClipforgeResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(ClipforgeError::render(format!(
                "frame {width}x{height} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pts_secs: 0.0,
            data,
        })
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }
}

/// Facts about a loaded source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub has_video: bool,
    pub has_audio: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Paused,
    Playing,
    Ended,
}

/// Decode/playback source.
///
/// `load` posts `MetadataReady` or `MetadataFailed`; `seek` posts `Seeked`
/// or `SeekFailed`; reaching the end while playing posts `Ended`.
pub trait PlaybackSource: Send {
    fn load(&mut self, events: EventSender) -> ClipforgeResult<()>;

    fn metadata(&self) -> Option<&SourceMetadata>;

    fn seek(&mut self, secs: f64) -> ClipforgeResult<()>;

    fn play(&mut self) -> ClipforgeResult<()>;

    fn pause(&mut self);

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    fn state(&self) -> PlaybackState;

    /// Present the frame for the current display tick.
    ///
    /// Returns `None` when no new frame is available (for example after the
    /// source ended).
    fn current_frame(&mut self) -> ClipforgeResult<Option<&VideoFrame>>;

    /// Release the decode handle. Called once.
    fn release(&mut self);
}

/// Font used for caption text.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub size_px: f64,
}

/// Drop shadow drawn under text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextShadow {
    pub offset_x: f64,
    pub offset_y: f64,
    pub blur: f64,
    pub color: Rgba,
}

/// Frame buffer the job draws into.
pub trait RasterSurface: Send {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Draw a decoded frame scaled to fill the surface.
    fn draw_image(&mut self, frame: &VideoFrame);

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba);

    /// Rendered width of `text` in pixels.
    fn measure_text(&self, text: &str, font: &FontSpec) -> f64;

    /// Draw one line of text. `x` is the left edge, `y` the vertical middle
    /// of the line.
    fn fill_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        font: &FontSpec,
        color: Rgba,
        shadow: Option<&TextShadow>,
    );

    /// The composed frame.
    fn snapshot(&self) -> &VideoFrame;
}

/// Encoder configuration fixed at `MetadataLoaded`.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub candidate: FormatCandidate,
    pub video_bitrate_bps: u32,
    pub audio_bitrate_bps: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Upper bound on output duration, when the job records a range.
    pub max_duration_secs: Option<f64>,
}

/// Live signals handed to the encoder when recording starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureTracks {
    /// Frames will be pushed from the frame buffer.
    pub video: bool,
    pub audio: Option<CaptureTrack>,
}

/// Incremental stream encoder.
///
/// After `stop`, remaining output arrives as `EncoderData` events followed by
/// one `EncoderStopped` (or `EncoderFailed`).
pub trait StreamEncoder: Send {
    fn configure(&mut self, settings: EncoderSettings, events: EventSender) -> ClipforgeResult<()>;

    fn start(&mut self, tracks: &CaptureTracks) -> ClipforgeResult<()>;

    fn push_frame(&mut self, frame: &VideoFrame, timestamp_secs: f64) -> ClipforgeResult<()>;

    fn stop(&mut self) -> ClipforgeResult<()>;

    /// Release encoder resources. Called once.
    fn release(&mut self);
}

/// Whether the host can encode a given container/codec combination.
pub trait EncodeCapability: Send {
    fn can_encode(&self, candidate: &FormatCandidate) -> bool;
}

/// Display-refresh signal source.
///
/// Mirrors a request-animation-frame contract: each `request_frame` yields
/// at most one `FrameReady` on the next refresh tick.
pub trait DisplayScheduler: Send {
    fn start(&mut self, events: EventSender, fps: u32);

    fn request_frame(&mut self);

    fn stop(&mut self);
}
