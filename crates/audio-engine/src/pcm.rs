//! Float to 16-bit PCM conversion.

use clipforge_media_model::AudioBuffer;

/// Convert one float sample to signed 16-bit.
///
/// The sample is clamped to `[-1, 1]` and scaled asymmetrically: negative
/// values by 32768, non-negative values by 32767, so `+1.0` never overflows.
/// NaN maps to silence.
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Convert a single channel.
pub fn channel_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(f32_to_i16).collect()
}

/// Interleave all channels frame by frame and convert to 16-bit.
pub fn interleave_i16(buffer: &AudioBuffer) -> Vec<i16> {
    buffer.interleaved().into_iter().map(f32_to_i16).collect()
}
