//! Decoded audio buffers.
//!
//! Samples are stored planar: one `Vec<f32>` per channel, all of the same
//! length. Amplitude is conventionally in `[-1, 1]` but not enforced.

use crate::error::MediaModelError;

/// Multi-channel linear PCM owned by a single operation.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// Requires a non-zero sample rate, at least one channel, and every
    /// channel of equal length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, MediaModelError> {
        if sample_rate == 0 {
            return Err(MediaModelError::InvalidBuffer {
                message: "sample rate must be non-zero".to_string(),
            });
        }
        let Some(first) = channels.first() else {
            return Err(MediaModelError::InvalidBuffer {
                message: "buffer has no channels".to_string(),
            });
        };
        let frames = first.len();
        if let Some((idx, ch)) = channels.iter().enumerate().find(|(_, c)| c.len() != frames) {
            return Err(MediaModelError::InvalidBuffer {
                message: format!(
                    "channel {idx} has {} frames, expected {frames}",
                    ch.len()
                ),
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// A zero-filled buffer.
    pub fn silent(
        sample_rate: u32,
        channel_count: usize,
        frames: usize,
    ) -> Result<Self, MediaModelError> {
        Self::new(sample_rate, vec![vec![0.0; frames]; channel_count])
    }

    /// Split interleaved samples into a planar buffer. Trailing samples that
    /// do not fill a whole frame are dropped.
    pub fn from_interleaved(
        sample_rate: u32,
        channel_count: usize,
        samples: &[f32],
    ) -> Result<Self, MediaModelError> {
        if channel_count == 0 {
            return Err(MediaModelError::InvalidBuffer {
                message: "buffer has no channels".to_string(),
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in channels.iter_mut().zip(frame) {
                ch.push(s);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn channel(&self, idx: usize) -> Option<&[f32]> {
        self.channels.get(idx).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Frame-by-frame interleaving (channel 0, channel 1, ...).
    pub fn interleaved(&self) -> Vec<f32> {
        let n = self.channel_count();
        let mut out = Vec::with_capacity(self.frames() * n);
        for i in 0..self.frames() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// A new buffer holding `[start, end)` of this one.
    pub fn slice_secs(&self, start_secs: f64, end_secs: f64) -> Result<Self, MediaModelError> {
        let duration = self.duration_secs();
        if !(start_secs.is_finite() && end_secs.is_finite()) || start_secs < 0.0 {
            return Err(MediaModelError::InvalidRange {
                message: format!("[{start_secs}, {end_secs}] is not a valid range"),
            });
        }
        if start_secs >= end_secs {
            return Err(MediaModelError::InvalidRange {
                message: format!("start {start_secs:.3}s must be before end {end_secs:.3}s"),
            });
        }
        if start_secs >= duration {
            return Err(MediaModelError::InvalidRange {
                message: format!(
                    "start {start_secs:.3}s is past the end of a {duration:.3}s buffer"
                ),
            });
        }

        let rate = self.sample_rate as f64;
        let from = (start_secs * rate).floor() as usize;
        let to = ((end_secs * rate).ceil() as usize).min(self.frames());
        let channels = self
            .channels
            .iter()
            .map(|ch| ch[from..to].to_vec())
            .collect();
        Self::new(self.sample_rate, channels)
    }
}
