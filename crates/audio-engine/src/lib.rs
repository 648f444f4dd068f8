//! Clipforge Audio
//!
//! Buffer-level audio work, synchronous from the caller's perspective:
//! - **Decoding:** container/codec audio into planar float buffers
//! - **Peaks:** fixed-resolution min/max envelopes for waveform display
//! - **WAV / MP3:** 16-bit PCM container writer and block-encoder driver
//! - **Routing:** audio graph driver used by the video pipeline
//! - **Mixing:** offline concatenation of tracks into one stereo buffer

pub mod decode;
pub mod graph;
pub mod mix;
pub mod mp3;
pub mod pcm;
pub mod peaks;
pub mod wav;

pub use decode::{decode_bytes, decode_file};
pub use graph::{AudioGraphBackend, AudioRouter, CaptureTrack, Destination, RoutingMode};
pub use mix::{concat_tracks, OfflineRenderer, SoftwareRenderer};
pub use mp3::{encode_blocks, BlockEncoder, Mp3Settings};
pub use peaks::{PeakCache, PeakEnvelope};
pub use wav::encode_wav;
