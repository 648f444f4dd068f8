//! Peak envelope reduction for waveform display.
//!
//! A long sample array is partitioned into `ceil(len / buckets)`-sized
//! windows and each window is reduced to its minimum and maximum. Extrema
//! (rather than RMS) keep short transients visible at low resolution.

use std::sync::Arc;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::AudioBuffer;
use serde::Serialize;

/// Fixed-resolution min/max summary of one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakEnvelope {
    min: Vec<f32>,
    max: Vec<f32>,
}

impl PeakEnvelope {
    /// Reduce `samples` into exactly `buckets` min/max pairs.
    ///
    /// Buckets past the end of a short input are `0.0 / 0.0`. Values are
    /// clamped into `[-1, 1]`; NaN samples are ignored.
    pub fn compute(samples: &[f32], buckets: usize) -> Self {
        let mut min = vec![0.0f32; buckets];
        let mut max = vec![0.0f32; buckets];
        if buckets == 0 || samples.is_empty() {
            return Self { min, max };
        }

        let window = samples.len().div_ceil(buckets);
        for (bucket, chunk) in samples.chunks(window).enumerate().take(buckets) {
            let mut lo = f32::INFINITY;
            let mut hi = f32::NEG_INFINITY;
            for &s in chunk.iter().filter(|s| !s.is_nan()) {
                lo = lo.min(s);
                hi = hi.max(s);
            }
            if lo <= hi {
                min[bucket] = lo.clamp(-1.0, 1.0);
                max[bucket] = hi.clamp(-1.0, 1.0);
            }
        }

        Self { min, max }
    }

    /// Envelope of one channel of a decoded buffer.
    pub fn from_buffer(
        buffer: &AudioBuffer,
        channel: usize,
        buckets: usize,
    ) -> ClipforgeResult<Self> {
        let samples = buffer.channel(channel).ok_or_else(|| {
            ClipforgeError::config(format!(
                "channel {channel} requested from a {}-channel buffer",
                buffer.channel_count()
            ))
        })?;
        Ok(Self::compute(samples, buckets))
    }

    pub fn bucket_count(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f32] {
        &self.min
    }

    pub fn max(&self) -> &[f32] {
        &self.max
    }

    /// `(min, max)` of one bucket.
    pub fn bucket(&self, idx: usize) -> Option<(f32, f32)> {
        Some((*self.min.get(idx)?, *self.max.get(idx)?))
    }

    /// `[min0, max0, min1, max1, ...]`, always `2 x bucket_count` long.
    pub fn interleaved(&self) -> Vec<f32> {
        self.min
            .iter()
            .zip(&self.max)
            .flat_map(|(&lo, &hi)| [lo, hi])
            .collect()
    }
}

/// Memoizes the envelope of the most recently requested buffer.
///
/// The cached value is reused for as long as callers pass the same `Arc`
/// (pointer identity); any other buffer reference recomputes.
#[derive(Debug)]
pub struct PeakCache {
    buckets: usize,
    entry: Option<CacheEntry>,
    computations: usize,
}

#[derive(Debug)]
struct CacheEntry {
    buffer: Arc<AudioBuffer>,
    channel: usize,
    envelope: Arc<PeakEnvelope>,
}

impl PeakCache {
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets,
            entry: None,
            computations: 0,
        }
    }

    pub fn get(
        &mut self,
        buffer: &Arc<AudioBuffer>,
        channel: usize,
    ) -> ClipforgeResult<Arc<PeakEnvelope>> {
        if let Some(entry) = &self.entry {
            if Arc::ptr_eq(&entry.buffer, buffer) && entry.channel == channel {
                return Ok(Arc::clone(&entry.envelope));
            }
        }

        let envelope = Arc::new(PeakEnvelope::from_buffer(buffer, channel, self.buckets)?);
        self.computations += 1;
        tracing::debug!(
            buckets = self.buckets,
            frames = buffer.frames(),
            channel,
            "Computed peak envelope"
        );
        self.entry = Some(CacheEntry {
            buffer: Arc::clone(buffer),
            channel,
            envelope: Arc::clone(&envelope),
        });
        Ok(envelope)
    }

    /// Drop the cached envelope.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of envelopes computed so far.
    pub fn computations(&self) -> usize {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_windows_keep_extrema() {
        let samples = [0.1, -0.5, 0.9, 0.0, -0.2, 0.3];
        let env = PeakEnvelope::compute(&samples, 2);
        assert_eq!(env.bucket(0), Some((-0.5, 0.9)));
        assert_eq!(env.bucket(1), Some((-0.2, 0.3)));
    }

    #[test]
    fn test_short_input_leaves_zero_buckets() {
        let env = PeakEnvelope::compute(&[0.5, -0.5], 5);
        assert_eq!(env.bucket_count(), 5);
        assert_eq!(env.bucket(0), Some((0.5, 0.5)));
        assert_eq!(env.bucket(1), Some((-0.5, -0.5)));
        assert_eq!(env.bucket(4), Some((0.0, 0.0)));
        assert_eq!(env.interleaved().len(), 10);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let env = PeakEnvelope::compute(&[4.0, -3.0], 1);
        assert_eq!(env.bucket(0), Some((-1.0, 1.0)));
    }

    #[test]
    fn test_cache_reuses_same_buffer() {
        let buffer = Arc::new(AudioBuffer::new(8_000, vec![vec![0.25; 100]]).unwrap());
        let mut cache = PeakCache::new(10);

        let a = cache.get(&buffer, 0).unwrap();
        let b = cache.get(&buffer, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.computations(), 1);

        let other = Arc::new((*buffer).clone());
        cache.get(&other, 0).unwrap();
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn test_missing_channel_is_an_error() {
        let buffer = Arc::new(AudioBuffer::silent(8_000, 1, 10).unwrap());
        let mut cache = PeakCache::new(4);
        assert!(cache.get(&buffer, 1).is_err());
    }

    proptest! {
        #[test]
        fn prop_envelope_invariants(
            samples in prop::collection::vec(-2.0f32..2.0, 0..5_000),
            buckets in 1usize..3_000,
        ) {
            let env = PeakEnvelope::compute(&samples, buckets);
            prop_assert_eq!(env.interleaved().len(), 2 * buckets);
            for i in 0..buckets {
                let (lo, hi) = env.bucket(i).unwrap();
                prop_assert!(lo <= hi);
                prop_assert!((-1.0..=1.0).contains(&lo));
                prop_assert!((-1.0..=1.0).contains(&hi));
            }
        }
    }
}
