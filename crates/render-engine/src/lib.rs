//! Clipforge Render Engine
//!
//! Produces burn-in, trim and convert artifacts by playing a source in real
//! time, drawing each presented frame into a frame buffer and feeding that
//! buffer (plus the routed audio) to a stream encoder.
//!
//! # Pipeline Architecture
//!
//! ```text
//! source ──► PlaybackSource ──► RasterSurface ──► StreamEncoder ──► Artifact
//!                 │                  ▲                  ▲
//!                 │       captions ──┘                  │
//!                 └──► AudioRouter ──── capture track ──┘
//! ```
//!
//! [`job::EncodingJob`] owns one implementation of each host trait and
//! advances on display-refresh events. [`ffmpeg`] and [`raster`] provide
//! the stock implementations.

pub mod compositor;
pub mod ffmpeg;
pub mod host;
pub mod job;
pub mod negotiate;
pub mod progress;
pub mod raster;
pub mod scheduler;

pub use job::{Artifact, EncodingJob, JobHost, JobOptions, JobState, Operation};
pub use progress::JobProgress;
