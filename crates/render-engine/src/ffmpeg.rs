//! FFmpeg-backed host collaborators.
//!
//! Decoding, encoding and capability discovery all shell out to the
//! `ffmpeg`/`ffprobe` binaries. Raw RGBA frames travel over pipes; encoded
//! output is streamed back as [`HostEvent::EncoderData`] chunks from a
//! collector thread.
//!
//! Every pipe read and write happens on a dedicated thread, so the job loop
//! never blocks on ffmpeg and runs on any tokio runtime flavor.

use std::collections::HashSet;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::Deserialize;

use clipforge_audio::graph::{
    AudioGraphBackend, CaptureTrack, Destination, NodeId, TrackOrigin,
};
use clipforge_common::clock::MediaClock;
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::{AudioCodec, Container, FormatCandidate, VideoCodec};

use crate::host::{
    CaptureTracks, EncodeCapability, EncoderSettings, EventSender, HostEvent, PlaybackSource,
    PlaybackState, SourceMetadata, StreamEncoder, VideoFrame,
};

/// Size of each `EncoderData` chunk read from ffmpeg's stdout.
const OUTPUT_CHUNK_BYTES: usize = 64 * 1024;

/// Decoded frames buffered ahead of presentation.
const DECODE_QUEUE_FRAMES: usize = 4;

type DecodedFrame = Result<Vec<u8>, String>;

/// Check whether a binary is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn send(events: &Option<EventSender>, event: HostEvent) {
    if let Some(tx) = events {
        if tx.send(event).is_err() {
            tracing::trace!("Job event queue closed");
        }
    }
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    }))
}

/// Read fixed-size frames from `reader` on a worker thread. The channel
/// disconnects at end of stream; a trailing partial frame is dropped.
fn spawn_frame_reader<R>(mut reader: R, frame_len: usize) -> (Receiver<DecodedFrame>, JoinHandle<()>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(DECODE_QUEUE_FRAMES);
    let handle = std::thread::spawn(move || loop {
        let mut data = vec![0u8; frame_len];
        match reader.read_exact(&mut data) {
            Ok(()) => {
                if tx.send(Ok(data)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => {
                let _ = tx.send(Err(e.to_string()));
                break;
            }
        }
    });
    (rx, handle)
}

/// Write queued frames to `writer` on a worker thread. Dropping the sender
/// flushes the queue and then closes the writer.
fn spawn_frame_writer<W>(mut writer: W, events: Option<EventSender>) -> (Sender<Vec<u8>>, JoinHandle<()>)
where
    W: Write + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let handle = std::thread::spawn(move || {
        for data in rx {
            if let Err(e) = writer.write_all(&data) {
                send(
                    &events,
                    HostEvent::EncoderFailed(format!("Failed writing frame: {e}")),
                );
                return;
            }
        }
    });
    (tx, handle)
}

// ---------------------------------------------------------------------------
// Probe

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Turn `ffprobe -of json` output into source metadata.
pub fn parse_probe(json: &str) -> ClipforgeResult<SourceMetadata> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let duration_secs = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .ok_or_else(|| ClipforgeError::source_load("ffprobe reported no duration"))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(SourceMetadata {
        duration_secs,
        width: video.and_then(|s| s.width).unwrap_or(0),
        height: video.and_then(|s| s.height).unwrap_or(0),
        has_video: video.is_some(),
        has_audio,
    })
}

/// Run ffprobe on a file.
pub fn probe_source(path: &Path) -> ClipforgeResult<SourceMetadata> {
    if !path.exists() {
        return Err(ClipforgeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration:stream=codec_type,width,height",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| ClipforgeError::source_load(format!("Failed to start ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(ClipforgeError::source_load(format!(
            "ffprobe failed (status {}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

// ---------------------------------------------------------------------------
// Playback source

/// Decodes a media file into RGBA frames stepped at the display rate.
///
/// Media time only advances when a frame is taken, so the recorded timeline
/// follows presented frames rather than the wall clock.
pub struct FfmpegSource {
    path: PathBuf,
    fps: u32,
    clock: MediaClock,
    metadata: Option<SourceMetadata>,
    state: PlaybackState,
    events: Option<EventSender>,
    child: Option<Child>,
    frames: Option<Receiver<DecodedFrame>>,
    reader: Option<JoinHandle<()>>,
    frame: VideoFrame,
}

impl FfmpegSource {
    pub fn new(path: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            path: path.into(),
            fps: fps.max(1),
            clock: MediaClock::new(fps),
            metadata: None,
            state: PlaybackState::Paused,
            events: None,
            child: None,
            frames: None,
            reader: None,
            frame: VideoFrame::new(0, 0),
        }
    }

    fn spawn_decoder(&mut self) -> ClipforgeResult<()> {
        let origin = self.clock.next_frame_secs();
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{origin:.6}"), "-i"])
            .arg(&self.path)
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-r",
                &self.fps.to_string(),
                "-an",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ClipforgeError::source_load(format!("Failed to start ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipforgeError::source_load("Failed to capture ffmpeg decoder output"))?;
        let (frames, reader) = spawn_frame_reader(stdout, self.frame.data.len());
        self.frames = Some(frames);
        self.reader = Some(reader);
        tracing::debug!(pid = child.id(), origin_secs = origin, "Decoder started");
        self.child = Some(child);
        Ok(())
    }

    fn kill_decoder(&mut self) {
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::warn!("Decoder frame reader panicked");
            }
        }
    }

    fn reach_end(&mut self) {
        if self.state != PlaybackState::Ended {
            self.state = PlaybackState::Ended;
            self.kill_decoder();
            send(&self.events, HostEvent::Ended);
        }
    }
}

impl PlaybackSource for FfmpegSource {
    fn load(&mut self, events: EventSender) -> ClipforgeResult<()> {
        self.events = Some(events);
        match probe_source(&self.path) {
            Ok(meta) => {
                if meta.has_video {
                    self.frame = VideoFrame::new(meta.width, meta.height);
                }
                self.metadata = Some(meta);
                send(&self.events, HostEvent::MetadataReady);
            }
            Err(e) => send(&self.events, HostEvent::MetadataFailed(e.to_string())),
        }
        Ok(())
    }

    fn metadata(&self) -> Option<&SourceMetadata> {
        self.metadata.as_ref()
    }

    fn seek(&mut self, secs: f64) -> ClipforgeResult<()> {
        let duration = self.metadata.as_ref().map_or(0.0, |m| m.duration_secs);
        if secs < 0.0 || secs >= duration {
            send(
                &self.events,
                HostEvent::SeekFailed(format!("{secs:.3}s is outside the source")),
            );
            return Ok(());
        }
        self.kill_decoder();
        self.clock.seek(secs);
        self.state = PlaybackState::Paused;
        send(&self.events, HostEvent::Seeked);
        Ok(())
    }

    fn play(&mut self) -> ClipforgeResult<()> {
        let has_video = self.metadata.as_ref().is_some_and(|m| m.has_video);
        if has_video && self.child.is_none() {
            self.spawn_decoder()?;
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    fn current_time(&self) -> f64 {
        self.clock.current_secs()
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn current_frame(&mut self) -> ClipforgeResult<Option<&VideoFrame>> {
        if self.state != PlaybackState::Playing {
            return Ok(None);
        }
        let Some(meta) = self.metadata.as_ref() else {
            return Ok(None);
        };
        let pts = self.clock.next_frame_secs();
        if pts >= meta.duration_secs {
            self.reach_end();
            return Ok(None);
        }

        if let Some(frames) = self.frames.as_ref() {
            match frames.try_recv() {
                Ok(Ok(data)) => self.frame.data = data,
                Ok(Err(e)) => {
                    return Err(ClipforgeError::source_load(format!(
                        "Failed reading decoded frame: {e}"
                    )))
                }
                // Not decoded yet; the next tick asks again.
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    self.reach_end();
                    return Ok(None);
                }
            }
        }

        self.clock.advance_frame();
        self.frame.pts_secs = pts;
        Ok(Some(&self.frame))
    }

    fn release(&mut self) {
        self.kill_decoder();
        self.events = None;
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.kill_decoder();
    }
}

// ---------------------------------------------------------------------------
// Encoder

fn muxer_name(container: Container) -> &'static str {
    match container {
        Container::Mp4 => "mp4",
        Container::WebM => "webm",
        Container::Matroska => "matroska",
        Container::Ogg => "ogg",
    }
}

/// Encoder used for a candidate's video track, falling back to the
/// container's usual codec when none is pinned.
pub fn video_encoder_name(candidate: &FormatCandidate) -> &'static str {
    match candidate.video {
        Some(VideoCodec::Avc1Baseline | VideoCodec::Avc1) => "libx264",
        Some(VideoCodec::Vp9) => "libvpx-vp9",
        Some(VideoCodec::Vp8) => "libvpx",
        None => match candidate.container {
            Container::Mp4 | Container::Matroska => "libx264",
            Container::WebM => "libvpx-vp9",
            Container::Ogg => "libtheora",
        },
    }
}

pub fn audio_encoder_name(candidate: &FormatCandidate) -> &'static str {
    match candidate.audio {
        Some(AudioCodec::Aac) => "aac",
        Some(AudioCodec::Opus) => "libopus",
        None => match candidate.container {
            Container::Mp4 => "aac",
            _ => "libopus",
        },
    }
}

/// Full ffmpeg argument list for one encode.
pub fn encoder_args(settings: &EncoderSettings, tracks: &CaptureTracks) -> ClipforgeResult<Vec<String>> {
    let candidate = &settings.candidate;
    let mut args: Vec<String> = ["-hide_banner", "-v", "error", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let video = tracks.video && candidate.has_video();
    let audio_file = match &tracks.audio {
        Some(CaptureTrack {
            origin: TrackOrigin::File { path, offset_secs },
            ..
        }) if candidate.has_audio() => Some((path, *offset_secs)),
        Some(CaptureTrack {
            origin: TrackOrigin::Live,
            ..
        }) => {
            return Err(ClipforgeError::encoder(
                "live capture tracks are not supported by the ffmpeg encoder",
            ))
        }
        _ => None,
    };

    if !video && audio_file.is_none() {
        return Err(ClipforgeError::encoder("no tracks to encode"));
    }

    if video {
        args.extend([
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", settings.width, settings.height),
            "-r".into(),
            settings.fps.to_string(),
            "-i".into(),
            "pipe:0".into(),
        ]);
    }
    if let Some((path, offset)) = audio_file {
        if offset > 0.0 {
            args.extend(["-ss".into(), format!("{offset:.6}")]);
        }
        args.extend(["-i".into(), path.display().to_string()]);
    }

    if video {
        args.extend(["-map".into(), "0:v:0".into()]);
    }
    if audio_file.is_some() {
        let input = if video { 1 } else { 0 };
        args.extend(["-map".into(), format!("{input}:a:0")]);
    }

    if video {
        args.extend(["-c:v".into(), video_encoder_name(candidate).into()]);
        if candidate.video == Some(VideoCodec::Avc1Baseline) {
            args.extend(["-profile:v".into(), "baseline".into()]);
        }
        args.extend([
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            settings.video_bitrate_bps.to_string(),
        ]);
    } else {
        args.push("-vn".into());
    }
    if audio_file.is_some() {
        args.extend([
            "-c:a".into(),
            audio_encoder_name(candidate).into(),
            "-b:a".into(),
            settings.audio_bitrate_bps.to_string(),
        ]);
    } else {
        args.push("-an".into());
    }

    if let Some(max) = settings.max_duration_secs {
        args.extend(["-t".into(), format!("{max:.6}")]);
    }

    args.extend(["-f".into(), muxer_name(candidate.container).into()]);
    if candidate.container == Container::Mp4 {
        // Streaming to a pipe needs a fragmented layout.
        args.extend([
            "-movflags".into(),
            "frag_keyframe+empty_moov+default_base_moof".into(),
        ]);
    }
    args.push("pipe:1".into());
    Ok(args)
}

/// Streams frames into an ffmpeg child process.
#[derive(Default)]
pub struct FfmpegEncoder {
    settings: Option<EncoderSettings>,
    events: Option<EventSender>,
    child: Option<Arc<Mutex<Child>>>,
    input: Option<Sender<Vec<u8>>>,
    writer: Option<JoinHandle<()>>,
    collector: Option<JoinHandle<()>>,
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_collector(
        &mut self,
        child: Arc<Mutex<Child>>,
        mut stdout: ChildStdout,
        stderr_task: Option<JoinHandle<String>>,
    ) {
        let events = self.events.clone();
        self.collector = Some(std::thread::spawn(move || {
            let mut buf = vec![0u8; OUTPUT_CHUNK_BYTES];
            let mut total = 0usize;
            let read_error = loop {
                match stdout.read(&mut buf) {
                    Ok(0) => break None,
                    Ok(n) => {
                        total += n;
                        send(&events, HostEvent::EncoderData(buf[..n].to_vec()));
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => break Some(e),
                }
            };

            let status = match child.lock() {
                Ok(mut child) => child.wait(),
                Err(_) => Err(std::io::Error::other("encoder process lock poisoned")),
            };
            let stderr_output = stderr_task
                .map(|t| {
                    t.join()
                        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
                })
                .unwrap_or_default();

            let event = match (status, read_error) {
                (_, Some(e)) => {
                    HostEvent::EncoderFailed(format!("Failed reading encoder output: {e}"))
                }
                (Ok(status), None) if status.success() => {
                    tracing::debug!(bytes = total, "Encoder process finished");
                    HostEvent::EncoderStopped
                }
                (Ok(status), None) => HostEvent::EncoderFailed(format!(
                    "ffmpeg encode failed (status {}): {}",
                    status,
                    stderr_output.trim()
                )),
                (Err(e), None) => {
                    HostEvent::EncoderFailed(format!("Failed to wait on ffmpeg: {e}"))
                }
            };
            send(&events, event);
        }));
    }
}

impl StreamEncoder for FfmpegEncoder {
    fn configure(&mut self, settings: EncoderSettings, events: EventSender) -> ClipforgeResult<()> {
        tracing::debug!(format = %settings.candidate, width = settings.width, height = settings.height, "Encoder configured");
        self.settings = Some(settings);
        self.events = Some(events);
        Ok(())
    }

    fn start(&mut self, tracks: &CaptureTracks) -> ClipforgeResult<()> {
        let settings = self
            .settings
            .as_ref()
            .ok_or_else(|| ClipforgeError::encoder("encoder started before configure"))?;
        let args = encoder_args(settings, tracks)?;
        let video = tracks.video && settings.candidate.has_video();

        tracing::debug!(?args, "Running ffmpeg encoder");
        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(if video { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ClipforgeError::encoder(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), "ffmpeg encoder started");

        if let Some(stdin) = child.stdin.take() {
            let (input, writer) = spawn_frame_writer(stdin, self.events.clone());
            self.input = Some(input);
            self.writer = Some(writer);
        }
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClipforgeError::encoder("Failed to capture ffmpeg stdout"))?;
        // Drain stderr concurrently to avoid ffmpeg blocking on a full pipe.
        let stderr_task = drain_stderr(&mut child);

        let child = Arc::new(Mutex::new(child));
        self.child = Some(Arc::clone(&child));
        self.spawn_collector(child, stdout, stderr_task);
        Ok(())
    }

    fn push_frame(&mut self, frame: &VideoFrame, timestamp_secs: f64) -> ClipforgeResult<()> {
        let Some(input) = self.input.as_ref() else {
            return Err(ClipforgeError::encoder("encoder is not accepting frames"));
        };
        if let Some(settings) = &self.settings {
            if frame.width != settings.width || frame.height != settings.height {
                return Err(ClipforgeError::encoder(format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width, frame.height, settings.width, settings.height
                )));
            }
        }
        input
            .send(frame.data.clone())
            .map_err(|_| ClipforgeError::encoder("encoder input is closed"))?;
        self.frames_written += 1;
        tracing::trace!(timestamp_secs, frames = self.frames_written, "Frame queued");
        Ok(())
    }

    fn stop(&mut self) -> ClipforgeResult<()> {
        // The writer closes stdin once queued frames are written; ffmpeg then
        // flushes and the collector reports the rest.
        self.input = None;
        tracing::debug!(frames = self.frames_written, "Encoder input closed");
        Ok(())
    }

    fn release(&mut self) {
        self.input = None;
        if let Some(child) = self.child.take() {
            if let Ok(mut child) = child.lock() {
                if matches!(child.try_wait(), Ok(None)) {
                    let _ = child.kill();
                }
            }
        }
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                tracing::warn!("Encoder frame writer panicked");
            }
        }
        if let Some(collector) = self.collector.take() {
            if collector.join().is_err() {
                tracing::warn!("Encoder output collector panicked");
            }
        }
        self.events = None;
    }
}

// ---------------------------------------------------------------------------
// Capability

/// Encoders and muxers reported by the local ffmpeg build.
#[derive(Debug, Clone, Default)]
pub struct FfmpegCapability {
    encoders: HashSet<String>,
    muxers: HashSet<String>,
}

/// Second column of an `ffmpeg -encoders` / `-muxers` listing, after the
/// `--` separator. Comma-separated aliases are split.
fn parse_listing(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("--"))
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .flat_map(|names| names.split(','))
        .map(str::to_string)
        .collect()
}

impl FfmpegCapability {
    /// Query the ffmpeg binary. A missing binary supports nothing.
    pub fn probe() -> Self {
        if !command_exists("ffmpeg") {
            tracing::warn!("ffmpeg not found in PATH; no output formats available");
            return Self::default();
        }
        let list = |flag: &str| -> String {
            Command::new("ffmpeg")
                .args(["-hide_banner", flag])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).into_owned())
                .unwrap_or_default()
        };
        let capability = Self::from_listings(&list("-encoders"), &list("-muxers"));
        tracing::debug!(
            encoders = capability.encoders.len(),
            muxers = capability.muxers.len(),
            "Probed ffmpeg capabilities"
        );
        capability
    }

    pub fn from_listings(encoders: &str, muxers: &str) -> Self {
        Self {
            encoders: parse_listing(encoders),
            muxers: parse_listing(muxers),
        }
    }
}

impl EncodeCapability for FfmpegCapability {
    fn can_encode(&self, candidate: &FormatCandidate) -> bool {
        if !self.muxers.contains(muxer_name(candidate.container)) {
            return false;
        }
        if candidate.has_video() && !self.encoders.contains(video_encoder_name(candidate)) {
            return false;
        }
        if candidate.has_audio() && !self.encoders.contains(audio_encoder_name(candidate)) {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Audio graph

/// Audio graph whose capture tracks read straight from the source file.
///
/// ffmpeg has no live graph, so speaker connections are only recorded.
pub struct FfmpegAudioGraph {
    path: PathBuf,
    offset_secs: f64,
    next_id: u64,
    closed: bool,
}

impl FfmpegAudioGraph {
    pub fn new(path: impl Into<PathBuf>, offset_secs: f64) -> Self {
        Self {
            path: path.into(),
            offset_secs: offset_secs.max(0.0),
            next_id: 0,
            closed: false,
        }
    }
}

impl AudioGraphBackend for FfmpegAudioGraph {
    fn create_source_node(&mut self) -> ClipforgeResult<NodeId> {
        if self.closed {
            return Err(ClipforgeError::source_load("audio graph is closed"));
        }
        self.next_id += 1;
        Ok(NodeId(self.next_id))
    }

    fn connect(&mut self, node: NodeId, destination: Destination) -> ClipforgeResult<()> {
        tracing::debug!(node = node.0, ?destination, "Audio node connected");
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) {
        tracing::trace!(node = node.0, "Audio node disconnected");
    }

    fn capture_track(&mut self) -> ClipforgeResult<CaptureTrack> {
        Ok(CaptureTrack {
            id: self.next_id,
            origin: TrackOrigin::File {
                path: self.path.clone(),
                offset_secs: self.offset_secs,
            },
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_media_model::TrackLayout;

    fn settings(candidate: FormatCandidate) -> EncoderSettings {
        EncoderSettings {
            candidate,
            video_bitrate_bps: 8_000_000,
            audio_bitrate_bps: 128_000,
            width: 640,
            height: 360,
            fps: 30,
            max_duration_secs: Some(3.0),
        }
    }

    fn file_track(offset: f64) -> CaptureTrack {
        CaptureTrack {
            id: 1,
            origin: TrackOrigin::File {
                path: PathBuf::from("/media/in.mp4"),
                offset_secs: offset,
            },
        }
    }

    #[test]
    fn test_parse_probe() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 1280, "height": 720},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "10.000000"}
        }"#;
        let meta = parse_probe(json).unwrap();
        assert_eq!(meta.duration_secs, 10.0);
        assert_eq!((meta.width, meta.height), (1280, 720));
        assert!(meta.has_video && meta.has_audio);
    }

    #[test]
    fn test_parse_probe_audio_only_and_missing_duration() {
        let meta =
            parse_probe(r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"4.5"}}"#)
                .unwrap();
        assert!(!meta.has_video);
        assert_eq!(meta.width, 0);

        let err = parse_probe(r#"{"streams":[],"format":{}}"#).unwrap_err();
        assert!(matches!(err, ClipforgeError::SourceLoad { .. }));
    }

    #[test]
    fn test_muxed_mp4_args() {
        let candidate = FormatCandidate::new(Container::Mp4, TrackLayout::Muxed)
            .with_video(VideoCodec::Avc1Baseline)
            .with_audio(AudioCodec::Aac);
        let tracks = CaptureTracks {
            video: true,
            audio: Some(file_track(3.0)),
        };
        let args = encoder_args(&settings(candidate), &tracks).unwrap();
        let joined = args.join(" ");
        assert!(joined.contains("-s 640x360 -r 30 -i pipe:0"));
        assert!(joined.contains("-ss 3.000000 -i /media/in.mp4"));
        assert!(joined.contains("-map 0:v:0 -map 1:a:0"));
        assert!(joined.contains("-c:v libx264 -profile:v baseline"));
        assert!(joined.contains("-c:a aac"));
        assert!(joined.contains("-t 3.000000"));
        assert!(joined.contains("frag_keyframe"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_audio_only_args_skip_video_input() {
        let candidate =
            FormatCandidate::new(Container::WebM, TrackLayout::AudioOnly).with_audio(AudioCodec::Opus);
        let tracks = CaptureTracks {
            video: false,
            audio: Some(file_track(0.0)),
        };
        let args = encoder_args(&settings(candidate), &tracks).unwrap();
        assert!(!args.iter().any(|a| a == "pipe:0"));
        assert!(args.iter().any(|a| a == "-vn"));
        assert!(args.windows(2).any(|w| w[0] == "-map" && w[1] == "0:a:0"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "libopus"));
    }

    #[test]
    fn test_live_track_is_rejected() {
        let candidate = FormatCandidate::new(Container::WebM, TrackLayout::Muxed);
        let tracks = CaptureTracks {
            video: true,
            audio: Some(CaptureTrack {
                id: 1,
                origin: TrackOrigin::Live,
            }),
        };
        assert!(matches!(
            encoder_args(&settings(candidate), &tracks),
            Err(ClipforgeError::EncoderFailure { .. })
        ));
    }

    #[test]
    fn test_capability_from_listings() {
        let encoders = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264\n A....D aac                  AAC\n A....D libopus              libopus Opus\n";
        let muxers = "File formats:\n D. = Demuxing supported\n --\n  E mp4             MP4 (MPEG-4 Part 14)\n  E webm            WebM\n";
        let cap = FfmpegCapability::from_listings(encoders, muxers);

        let mp4 = FormatCandidate::new(Container::Mp4, TrackLayout::Muxed)
            .with_video(VideoCodec::Avc1)
            .with_audio(AudioCodec::Aac);
        assert!(cap.can_encode(&mp4));

        let vp9 = FormatCandidate::new(Container::WebM, TrackLayout::VideoOnly).with_video(VideoCodec::Vp9);
        assert!(!cap.can_encode(&vp9));

        let opus = FormatCandidate::new(Container::WebM, TrackLayout::AudioOnly).with_audio(AudioCodec::Opus);
        assert!(cap.can_encode(&opus));

        let mkv = FormatCandidate::new(Container::Matroska, TrackLayout::Muxed);
        assert!(!cap.can_encode(&mkv));
    }

    #[test]
    fn test_audio_graph_yields_file_tracks() {
        let mut graph = FfmpegAudioGraph::new("/media/in.mp4", 2.5);
        let node = graph.create_source_node().unwrap();
        graph.connect(node, Destination::CaptureSink).unwrap();
        let track = graph.capture_track().unwrap();
        assert_eq!(
            track.origin,
            TrackOrigin::File {
                path: PathBuf::from("/media/in.mp4"),
                offset_secs: 2.5
            }
        );
        graph.close();
        assert!(graph.create_source_node().is_err());
    }

    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frame_reader_drops_partial_tail() {
        let bytes: Vec<u8> = (0..20).collect();
        let (frames, reader) = spawn_frame_reader(std::io::Cursor::new(bytes), 8);
        reader.join().unwrap();

        assert_eq!(frames.recv().unwrap().unwrap(), (0..8).collect::<Vec<u8>>());
        assert_eq!(frames.recv().unwrap().unwrap(), (8..16).collect::<Vec<u8>>());
        assert!(frames.recv().is_err());
    }

    #[test]
    fn test_frame_reader_stops_when_receiver_drops() {
        let (frames, reader) = spawn_frame_reader(std::io::repeat(1), 4);
        assert_eq!(frames.recv().unwrap().unwrap(), vec![1; 4]);
        drop(frames);
        reader.join().unwrap();
    }

    #[test]
    fn test_frame_writer_keeps_order_and_drains_on_close() {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let (input, writer) = spawn_frame_writer(SharedSink(Arc::clone(&sink)), None);
        input.send(vec![1, 2]).unwrap();
        input.send(vec![3]).unwrap();
        drop(input);
        writer.join().unwrap();
        assert_eq!(*sink.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_frame_writer_reports_broken_pipe() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (input, writer) = spawn_frame_writer(ClosedPipe, Some(tx));
        input.send(vec![0; 16]).unwrap();
        writer.join().unwrap();

        match rx.try_recv() {
            Ok(HostEvent::EncoderFailed(message)) => assert!(message.contains("pipe closed")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(input.send(vec![0; 16]).is_err());
    }
}
