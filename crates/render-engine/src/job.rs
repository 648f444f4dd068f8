//! Render-capture synchronization loop.
//!
//! An [`EncodingJob`] drives a playback source, a frame buffer and a stream
//! encoder in lockstep to produce one burn-in, trim or convert artifact.
//!
//! ```text
//! Idle ── MetadataReady ──► MetadataLoaded ──┬─────────────► Recording
//!                                            └─► Seeking ──► Recording
//! Recording ── trim boundary ──────────────► Stopping ── EncoderStopped ──► Done
//! Recording ── Ended ── settle delay ──────► Stopping
//! any ── failure / cancel ──► Error
//! ```
//!
//! All waiting is suspension on the job's event queue. Every resource the
//! job owns is released by one idempotent teardown on every exit path.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use clipforge_audio::graph::{AudioGraphBackend, AudioRouter, RoutingMode};
use clipforge_common::cancel::CancelFlag;
use clipforge_common::clock::{frame_interval_secs, OperationClock};
use clipforge_common::config::EncodingDefaults;
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::{CaptionStyle, CueTrack, FormatCandidate, OperationKind};

use crate::compositor::draw_caption;
use crate::host::{
    CaptureTracks, DisplayScheduler, EncodeCapability, EncoderSettings, EventReceiver,
    EventSender, HostEvent, PlaybackSource, PlaybackState, RasterSurface, StreamEncoder,
};
use crate::negotiate::negotiate;
use crate::progress::{range_percent, JobProgress, ProgressTracker};

/// Slack when comparing media times against a boundary.
const TIME_EPSILON: f64 = 1e-6;

/// Named states of the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    MetadataLoaded,
    Seeking,
    Recording,
    Stopping,
    Done,
    Error,
}

/// What the job produces.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Permanently render captions onto the video.
    BurnIn { cues: CueTrack, style: CaptionStyle },

    /// Keep only `[start_secs, end_secs)` of the source.
    Trim { start_secs: f64, end_secs: f64 },

    /// Re-encode into the container family named by `target_ext`,
    /// optionally restricted to a time range.
    Convert {
        target_ext: String,
        range: Option<(f64, f64)>,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::BurnIn { .. } => OperationKind::BurnIn,
            Operation::Trim { .. } => OperationKind::Trim,
            Operation::Convert { .. } => OperationKind::Convert,
        }
    }

    /// Requested time range, if any.
    pub fn range(&self) -> Option<(f64, f64)> {
        match self {
            Operation::Trim {
                start_secs,
                end_secs,
            } => Some((*start_secs, *end_secs)),
            Operation::Convert { range, .. } => *range,
            Operation::BurnIn { .. } => None,
        }
    }

    pub fn target_ext(&self) -> Option<&str> {
        match self {
            Operation::Convert { target_ext, .. } => Some(target_ext),
            _ => None,
        }
    }

    /// Check parameters that do not depend on the source.
    pub fn validate(&self) -> ClipforgeResult<()> {
        if let Some((start, end)) = self.range() {
            if !start.is_finite() || !end.is_finite() || start < 0.0 {
                return Err(ClipforgeError::invalid_range(format!(
                    "[{start}, {end}] is not a valid time range"
                )));
            }
            if start >= end {
                return Err(ClipforgeError::invalid_range(format!(
                    "start {start:.3}s must be before end {end:.3}s"
                )));
            }
        }
        match self {
            Operation::BurnIn { cues, style } => {
                style
                    .validate()
                    .map_err(|e| ClipforgeError::config(e.to_string()))?;
                for cue in cues.cues() {
                    cue.validate()
                        .map_err(|e| ClipforgeError::config(e.to_string()))?;
                }
            }
            Operation::Convert { target_ext, .. } if target_ext.trim().is_empty() => {
                return Err(ClipforgeError::config("conversion target extension is empty"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Tunables for one job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub video_bitrate_bps: u32,
    pub audio_bitrate_bps: u32,
    /// Display refresh rate.
    pub fps: u32,
    /// Wait between natural end and stopping the encoder.
    pub settle_delay: Duration,
    /// Keep audio audible while recording.
    pub monitor_audio: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::from(&EncodingDefaults::default())
    }
}

impl From<&EncodingDefaults> for JobOptions {
    fn from(defaults: &EncodingDefaults) -> Self {
        Self {
            video_bitrate_bps: defaults.video_bitrate_bps,
            audio_bitrate_bps: defaults.audio_bitrate_kbps * 1000,
            fps: defaults.fps,
            settle_delay: defaults.settle_delay(),
            monitor_audio: false,
        }
    }
}

/// Platform collaborators owned by a job.
pub struct JobHost {
    pub source: Box<dyn PlaybackSource>,
    pub surface: Box<dyn RasterSurface>,
    pub encoder: Box<dyn StreamEncoder>,
    pub audio: Box<dyn AudioGraphBackend>,
    pub capability: Box<dyn EncodeCapability>,
    pub scheduler: Box<dyn DisplayScheduler>,
}

/// The finished output.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub format: FormatCandidate,
}

impl Artifact {
    pub fn file_extension(&self) -> &'static str {
        self.format.file_extension()
    }
}

enum Step {
    Continue,
    Finished,
}

enum Wake {
    Event(Option<HostEvent>),
    Settled,
}

/// One run of burn-in, trim or convert.
pub struct EncodingJob {
    operation: Operation,
    options: JobOptions,
    cancel: CancelFlag,
    state: JobState,

    source: Box<dyn PlaybackSource>,
    surface: Option<Box<dyn RasterSurface>>,
    encoder: Box<dyn StreamEncoder>,
    audio_backend: Option<Box<dyn AudioGraphBackend>>,
    router: Option<AudioRouter>,
    capability: Box<dyn EncodeCapability>,
    scheduler: Box<dyn DisplayScheduler>,

    events_tx: EventSender,
    events_rx: EventReceiver,
    progress: ProgressTracker,

    candidate: Option<FormatCandidate>,
    /// Recorded span on the source timeline.
    span: (f64, f64),
    /// Whether `span.1` is an explicit boundary rather than the natural end.
    bounded: bool,
    chunks: Vec<Vec<u8>>,
    encoder_stopped: bool,
    settle_deadline: Option<Instant>,
    frames_encoded: u64,
    clock: OperationClock,
    torn_down: bool,
}

impl EncodingJob {
    pub fn new(operation: Operation, host: JobHost, options: JobOptions) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            operation,
            options,
            cancel: CancelFlag::new(),
            state: JobState::Idle,
            source: host.source,
            surface: Some(host.surface),
            encoder: host.encoder,
            audio_backend: Some(host.audio),
            router: None,
            capability: host.capability,
            scheduler: host.scheduler,
            events_tx,
            events_rx,
            progress: ProgressTracker::new(),
            candidate: None,
            span: (0.0, 0.0),
            bounded: false,
            chunks: Vec::new(),
            encoder_stopped: false,
            settle_deadline: None,
            frames_encoded: 0,
            clock: OperationClock::start(),
            torn_down: false,
        }
    }

    /// Use an externally owned cancel flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn progress(&self) -> watch::Receiver<JobProgress> {
        self.progress.subscribe()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Spawn the job on the current runtime.
    pub fn start(
        self,
    ) -> (
        watch::Receiver<JobProgress>,
        JoinHandle<ClipforgeResult<Artifact>>,
    ) {
        let progress = self.progress();
        let handle = tokio::spawn(self.run());
        (progress, handle)
    }

    /// Run to completion, failure or cancellation.
    pub async fn run(mut self) -> ClipforgeResult<Artifact> {
        let result = self.drive().await;
        match &result {
            Ok(artifact) => tracing::info!(
                operation = %self.operation.kind(),
                mime_type = %artifact.mime_type,
                bytes = artifact.bytes.len(),
                frames = self.frames_encoded,
                elapsed_secs = self.clock.elapsed_secs(),
                "Encoding job finished"
            ),
            Err(ClipforgeError::Cancelled) => {
                self.transition(JobState::Error);
                tracing::info!(operation = %self.operation.kind(), "Encoding job cancelled");
            }
            Err(e) => {
                self.transition(JobState::Error);
                tracing::error!(
                    operation = %self.operation.kind(),
                    error = %e,
                    "Encoding job failed"
                );
            }
        }
        self.teardown();
        result
    }

    async fn drive(&mut self) -> ClipforgeResult<Artifact> {
        self.operation.validate()?;
        tracing::info!(
            operation = %self.operation.kind(),
            started_at = %self.clock.epoch_wall(),
            "Starting encoding job"
        );
        self.source.load(self.events_tx.clone())?;

        loop {
            let wake = match self.settle_deadline {
                Some(deadline) => tokio::select! {
                    event = self.events_rx.recv() => Wake::Event(event),
                    _ = tokio::time::sleep_until(deadline) => Wake::Settled,
                },
                None => Wake::Event(self.events_rx.recv().await),
            };

            if self.cancel.is_cancelled() {
                tracing::info!(state = ?self.state, "Cancellation requested");
                self.source.pause();
                return Err(ClipforgeError::Cancelled);
            }

            let step = match wake {
                Wake::Settled => {
                    self.settle_deadline = None;
                    tracing::debug!("Settle delay elapsed");
                    self.stop_encoder()?
                }
                Wake::Event(Some(event)) => self.handle(event)?,
                Wake::Event(None) => {
                    return Err(ClipforgeError::render("job event queue closed"));
                }
            };

            if let Step::Finished = step {
                return self.finish();
            }
        }
    }

    fn handle(&mut self, event: HostEvent) -> ClipforgeResult<Step> {
        match (self.state, event) {
            (_, HostEvent::MetadataFailed(message)) => Err(ClipforgeError::source_load(format!(
                "metadata failed to load: {message}"
            ))),
            (_, HostEvent::SeekFailed(message)) => Err(ClipforgeError::source_load(format!(
                "seek failed: {message}"
            ))),
            (_, HostEvent::EncoderFailed(message)) => Err(ClipforgeError::encoder(message)),
            (JobState::Idle, HostEvent::MetadataReady) => self.on_metadata(),
            (JobState::Seeking, HostEvent::Seeked) => self.begin_recording(),
            (JobState::Recording, HostEvent::FrameReady) => self.on_frame(),
            (JobState::Recording, HostEvent::Ended) => self.on_ended(),
            (_, HostEvent::EncoderData(bytes)) => {
                if !bytes.is_empty() {
                    self.chunks.push(bytes);
                }
                Ok(Step::Continue)
            }
            (JobState::Stopping, HostEvent::EncoderStopped) => Ok(Step::Finished),
            (JobState::Recording, HostEvent::EncoderStopped) => {
                tracing::debug!("Encoder finished before the source");
                self.encoder_stopped = true;
                Ok(Step::Continue)
            }
            (state, event) => {
                tracing::trace!(?state, ?event, "Ignoring event");
                Ok(Step::Continue)
            }
        }
    }

    fn on_metadata(&mut self) -> ClipforgeResult<Step> {
        let meta = self
            .source
            .metadata()
            .cloned()
            .ok_or_else(|| ClipforgeError::source_load("source reported no metadata"))?;
        if !(meta.duration_secs.is_finite() && meta.duration_secs > 0.0) {
            return Err(ClipforgeError::source_load(format!(
                "source has no playable duration ({})",
                meta.duration_secs
            )));
        }
        self.transition(JobState::MetadataLoaded);

        let tolerance = frame_interval_secs(self.options.fps);
        let (start, end, bounded) = match self.operation.range() {
            Some((start, end)) => {
                if start >= meta.duration_secs {
                    return Err(ClipforgeError::invalid_range(format!(
                        "start {start:.3}s is beyond the {:.3}s source",
                        meta.duration_secs
                    )));
                }
                if end > meta.duration_secs + tolerance {
                    return Err(ClipforgeError::invalid_range(format!(
                        "end {end:.3}s is beyond the {:.3}s source",
                        meta.duration_secs
                    )));
                }
                (start, end.min(meta.duration_secs), true)
            }
            None => (0.0, meta.duration_secs, false),
        };
        self.span = (start, end);
        self.bounded = bounded;

        let candidate = negotiate(
            self.operation.kind(),
            self.operation.target_ext(),
            meta.has_audio,
            self.capability.as_ref(),
        )?;
        self.candidate = Some(candidate);

        let (width, height) = if candidate.has_video() {
            if !meta.has_video {
                return Err(ClipforgeError::source_load(
                    "source has no video track for a video output",
                ));
            }
            let (w, h) = (meta.width & !1, meta.height & !1);
            if w == 0 || h == 0 {
                return Err(ClipforgeError::source_load(format!(
                    "source dimensions {}x{} are too small to encode",
                    meta.width, meta.height
                )));
            }
            if let Some(surface) = self.surface.as_deref_mut() {
                surface.resize(w, h);
            }
            (w, h)
        } else {
            // Audio-only outputs never touch a frame buffer.
            self.surface = None;
            (0, 0)
        };

        self.encoder.configure(
            EncoderSettings {
                candidate,
                video_bitrate_bps: self.options.video_bitrate_bps,
                audio_bitrate_bps: self.options.audio_bitrate_bps,
                width,
                height,
                fps: self.options.fps,
                max_duration_secs: bounded.then_some(end - start),
            },
            self.events_tx.clone(),
        )?;

        tracing::info!(
            duration_secs = meta.duration_secs,
            width,
            height,
            start_secs = start,
            end_secs = end,
            format = %candidate,
            "Metadata loaded"
        );

        if bounded {
            self.transition(JobState::Seeking);
            self.source.seek(start)?;
            Ok(Step::Continue)
        } else {
            self.begin_recording()
        }
    }

    fn begin_recording(&mut self) -> ClipforgeResult<Step> {
        let candidate = self
            .candidate
            .ok_or_else(|| ClipforgeError::encoder("recording started before negotiation"))?;

        let audio = if candidate.has_audio() {
            let backend = self
                .audio_backend
                .take()
                .ok_or_else(|| ClipforgeError::source_load("audio graph already consumed"))?;
            let mode = if self.options.monitor_audio {
                RoutingMode::Monitored
            } else {
                RoutingMode::CaptureOnly
            };
            let router = self.router.insert(AudioRouter::new(backend, mode));
            router.attach_for_play()?;
            router.capture_track()?
        } else {
            None
        };

        let tracks = CaptureTracks {
            video: candidate.has_video(),
            audio,
        };
        self.encoder.start(&tracks)?;
        self.source.play()?;

        self.transition(JobState::Recording);
        self.scheduler.start(self.events_tx.clone(), self.options.fps);
        self.scheduler.request_frame();
        Ok(Step::Continue)
    }

    fn on_frame(&mut self) -> ClipforgeResult<Step> {
        if self.source.state() != PlaybackState::Playing {
            self.scheduler.request_frame();
            return Ok(Step::Continue);
        }

        let (start, end) = self.span;
        let Some(frame) = self.source.current_frame()? else {
            self.scheduler.request_frame();
            return Ok(Step::Continue);
        };
        let t = frame.pts_secs;

        if self.bounded && t >= end - TIME_EPSILON {
            return self.reach_boundary(t);
        }

        if let Some(surface) = self.surface.as_deref_mut() {
            surface.draw_image(frame);
            if let Operation::BurnIn { cues, style } = &self.operation {
                if let Some(cue) = cues.active_at(t) {
                    draw_caption(surface, &cue.text, style);
                }
            }
            self.encoder.push_frame(surface.snapshot(), t - start)?;
            self.frames_encoded += 1;
        }

        self.progress.update(range_percent(t, start, end));
        self.scheduler.request_frame();
        Ok(Step::Continue)
    }

    fn on_ended(&mut self) -> ClipforgeResult<Step> {
        let t = self.source.current_time();
        self.scheduler.stop();

        if self.bounded {
            let (_, end) = self.span;
            let tolerance = frame_interval_secs(self.options.fps);
            if t + tolerance >= end - TIME_EPSILON {
                return self.reach_boundary(t);
            }
            return Err(ClipforgeError::invalid_range(format!(
                "source ended at {t:.3}s before the requested end {end:.3}s"
            )));
        }

        tracing::info!(
            position_secs = t,
            settle_ms = self.options.settle_delay.as_millis() as u64,
            "Source ended, settling before stopping encoder"
        );
        self.transition(JobState::Stopping);
        self.settle_deadline = Some(Instant::now() + self.options.settle_delay);
        Ok(Step::Continue)
    }

    fn reach_boundary(&mut self, t: f64) -> ClipforgeResult<Step> {
        tracing::info!(
            position_secs = t,
            end_secs = self.span.1,
            frames = self.frames_encoded,
            "Range end reached"
        );
        self.source.pause();
        self.scheduler.stop();
        self.transition(JobState::Stopping);
        self.stop_encoder()
    }

    fn stop_encoder(&mut self) -> ClipforgeResult<Step> {
        if self.encoder_stopped {
            return Ok(Step::Finished);
        }
        self.encoder.stop()?;
        Ok(Step::Continue)
    }

    fn finish(&mut self) -> ClipforgeResult<Artifact> {
        let format = self
            .candidate
            .ok_or_else(|| ClipforgeError::encoder("no output format was negotiated"))?;

        let total: usize = self.chunks.iter().map(Vec::len).sum();
        if total == 0 {
            return Err(ClipforgeError::encoder("encoder produced no output"));
        }
        let mut bytes = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            bytes.extend_from_slice(&chunk);
        }

        self.state = JobState::Done;
        self.progress.complete();
        Ok(Artifact {
            bytes,
            mime_type: format.mime_type(),
            format,
        })
    }

    fn transition(&mut self, next: JobState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = ?self.state, to = ?next, "Job state changed");
        self.state = next;
        self.progress.set_state(next);
    }

    /// Release every owned resource. Safe to call repeatedly.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        self.scheduler.stop();
        self.settle_deadline = None;
        if self.source.state() == PlaybackState::Playing {
            self.source.pause();
        }
        self.source.release();
        if let Some(mut router) = self.router.take() {
            router.teardown();
        }
        if let Some(mut backend) = self.audio_backend.take() {
            backend.close();
        }
        self.encoder.release();
        self.surface = None;

        tracing::debug!(
            state = ?self.state,
            frames = self.frames_encoded,
            "Job resources released"
        );
    }
}

impl Drop for EncodingJob {
    fn drop(&mut self) {
        self.teardown();
    }
}
