//! Clipforge Media Model
//!
//! Plain data shared by the audio and video pipelines:
//! - Caption cues and cue tracks
//! - Caption styles
//! - Decoded (planar) audio buffers
//! - Typed container/codec descriptors for format negotiation

pub mod audio;
pub mod cue;
pub mod error;
pub mod format;
pub mod style;

pub use audio::AudioBuffer;
pub use cue::{Cue, CueTrack};
pub use error::MediaModelError;
pub use format::*;
pub use style::{CaptionStyle, Rgba, VerticalPosition};
