//! MP3 output through a block-based lossy encoder.
//!
//! The driver converts each channel to 16-bit PCM and feeds the encoder
//! fixed-size blocks in order. Compressed fragments are concatenated in
//! emission order; MP3 frames carry no index, so order is the only thing
//! tying the stream together.

use clipforge_common::cancel::CancelFlag;
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::AudioBuffer;

use crate::pcm::channel_to_i16;

/// Samples per MP3 frame (MPEG-1 Layer III).
pub const MP3_FRAME_SAMPLES: usize = 1152;

/// A third-party encoder that turns PCM blocks into compressed bytes.
pub trait BlockEncoder {
    /// Encode one block. `right` is `None` for mono and otherwise has the
    /// same length as `left`. May return an empty fragment while the
    /// encoder buffers input.
    fn encode_block(&mut self, left: &[i16], right: Option<&[i16]>) -> ClipforgeResult<Vec<u8>>;

    /// Emit any buffered trailing samples.
    fn flush(&mut self) -> ClipforgeResult<Vec<u8>>;
}

/// Settings for a single MP3 encode.
#[derive(Debug, Clone)]
pub struct Mp3Settings {
    pub bitrate_kbps: u32,

    /// Block size in samples per channel, rounded up to a whole number of
    /// MP3 frames.
    pub block_samples: usize,
}

impl Default for Mp3Settings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 128,
            block_samples: MP3_FRAME_SAMPLES,
        }
    }
}

impl Mp3Settings {
    fn aligned_block(&self) -> usize {
        self.block_samples
            .max(1)
            .div_ceil(MP3_FRAME_SAMPLES)
            .saturating_mul(MP3_FRAME_SAMPLES)
    }
}

/// Number of channels the encoder receives: mono stays mono, anything wider
/// is reduced to its first two channels.
pub fn encoder_channels(buffer: &AudioBuffer) -> usize {
    if buffer.channel_count() == 1 {
        1
    } else {
        2
    }
}

/// Drive `encoder` over the whole buffer.
///
/// `on_progress` receives the completed fraction in `[0, 1]` after each
/// block. The cancel flag is checked between blocks.
pub fn encode_blocks<E, F>(
    buffer: &AudioBuffer,
    encoder: &mut E,
    settings: &Mp3Settings,
    cancel: &CancelFlag,
    mut on_progress: F,
) -> ClipforgeResult<Vec<u8>>
where
    E: BlockEncoder + ?Sized,
    F: FnMut(f64),
{
    let block = settings.aligned_block();
    let left = buffer.channel(0).map(channel_to_i16).unwrap_or_default();
    let right = if encoder_channels(buffer) == 2 {
        buffer.channel(1).map(channel_to_i16)
    } else {
        None
    };

    if buffer.channel_count() > 2 {
        tracing::debug!(
            channels = buffer.channel_count(),
            "Encoding the first two channels only"
        );
    }

    let total = left.len();
    let mut out = Vec::new();
    let mut offset = 0;
    while offset < total {
        if cancel.is_cancelled() {
            return Err(ClipforgeError::Cancelled);
        }
        let end = (offset + block).min(total);
        let fragment = encoder.encode_block(
            &left[offset..end],
            right.as_deref().map(|r| &r[offset..end]),
        )?;
        if !fragment.is_empty() {
            out.extend_from_slice(&fragment);
        }
        offset = end;
        on_progress(offset as f64 / total as f64);
    }

    let tail = encoder.flush()?;
    out.extend_from_slice(&tail);
    on_progress(1.0);

    tracing::debug!(
        frames = total,
        block,
        bytes = out.len(),
        "MP3 encode complete"
    );
    Ok(out)
}

/// Encode a buffer to MP3 with libmp3lame.
pub fn encode_mp3(
    buffer: &AudioBuffer,
    settings: &Mp3Settings,
    cancel: &CancelFlag,
    on_progress: impl FnMut(f64),
) -> ClipforgeResult<Vec<u8>> {
    let mut encoder = lame::LameEncoder::new(
        encoder_channels(buffer) as u8,
        buffer.sample_rate(),
        settings.bitrate_kbps,
    )?;
    encode_blocks(buffer, &mut encoder, settings, cancel, on_progress)
}

pub mod lame {
    //! [`BlockEncoder`] backed by `mp3lame-encoder`.

    use mp3lame_encoder::{
        max_required_buffer_size, Bitrate, Builder, DualPcm, Encoder, FlushNoGap, MonoPcm,
        Quality,
    };

    use super::BlockEncoder;
    use clipforge_common::error::{ClipforgeError, ClipforgeResult};

    /// Output space LAME needs to flush its internal buffers.
    const FLUSH_BUFFER_BYTES: usize = 7200;

    pub struct LameEncoder {
        inner: Encoder,
    }

    impl LameEncoder {
        pub fn new(channels: u8, sample_rate: u32, bitrate_kbps: u32) -> ClipforgeResult<Self> {
            let mut builder =
                Builder::new().ok_or_else(|| ClipforgeError::encoder("LAME is unavailable"))?;
            builder
                .set_num_channels(channels)
                .map_err(|e| ClipforgeError::encoder(format!("LAME channels: {e:?}")))?;
            builder
                .set_sample_rate(sample_rate)
                .map_err(|e| ClipforgeError::encoder(format!("LAME sample rate: {e:?}")))?;
            builder
                .set_brate(bitrate(bitrate_kbps))
                .map_err(|e| ClipforgeError::encoder(format!("LAME bitrate: {e:?}")))?;
            builder
                .set_quality(Quality::Good)
                .map_err(|e| ClipforgeError::encoder(format!("LAME quality: {e:?}")))?;
            let inner = builder
                .build()
                .map_err(|e| ClipforgeError::encoder(format!("LAME init: {e:?}")))?;
            Ok(Self { inner })
        }
    }

    /// Nearest supported constant bitrate at or below the request.
    fn bitrate(kbps: u32) -> Bitrate {
        match kbps {
            0..=63 => Bitrate::Kbps32,
            64..=95 => Bitrate::Kbps64,
            96..=127 => Bitrate::Kbps96,
            128..=159 => Bitrate::Kbps128,
            160..=191 => Bitrate::Kbps160,
            192..=255 => Bitrate::Kbps192,
            256..=319 => Bitrate::Kbps256,
            _ => Bitrate::Kbps320,
        }
    }

    impl BlockEncoder for LameEncoder {
        fn encode_block(
            &mut self,
            left: &[i16],
            right: Option<&[i16]>,
        ) -> ClipforgeResult<Vec<u8>> {
            let mut out = Vec::with_capacity(max_required_buffer_size(left.len()));
            let result = match right {
                Some(right) => self.inner.encode_to_vec(DualPcm { left, right }, &mut out),
                None => self.inner.encode_to_vec(MonoPcm(left), &mut out),
            };
            result.map_err(|e| ClipforgeError::encoder(format!("LAME encode: {e:?}")))?;
            Ok(out)
        }

        fn flush(&mut self) -> ClipforgeResult<Vec<u8>> {
            let mut out = Vec::with_capacity(FLUSH_BUFFER_BYTES);
            self.inner
                .flush_to_vec::<FlushNoGap>(&mut out)
                .map_err(|e| ClipforgeError::encoder(format!("LAME flush: {e:?}")))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records each block and emits a tagged fragment for it.
    #[derive(Default)]
    struct RecordingEncoder {
        blocks: Vec<(usize, bool)>,
        flushed: bool,
    }

    impl BlockEncoder for RecordingEncoder {
        fn encode_block(
            &mut self,
            left: &[i16],
            right: Option<&[i16]>,
        ) -> ClipforgeResult<Vec<u8>> {
            if let Some(r) = right {
                assert_eq!(r.len(), left.len());
            }
            self.blocks.push((left.len(), right.is_some()));
            // Buffer the first block to exercise empty fragments.
            if self.blocks.len() == 1 {
                return Ok(Vec::new());
            }
            Ok(vec![self.blocks.len() as u8])
        }

        fn flush(&mut self) -> ClipforgeResult<Vec<u8>> {
            self.flushed = true;
            Ok(vec![0xFF])
        }
    }

    #[test]
    fn test_stereo_blocks_and_ordering() {
        let frames = MP3_FRAME_SAMPLES * 2 + 100;
        let buffer = AudioBuffer::silent(44_100, 2, frames).unwrap();
        let mut enc = RecordingEncoder::default();
        let mut progress = Vec::new();

        let bytes = encode_blocks(
            &buffer,
            &mut enc,
            &Mp3Settings::default(),
            &CancelFlag::new(),
            |p| progress.push(p),
        )
        .unwrap();

        assert_eq!(
            enc.blocks,
            vec![
                (MP3_FRAME_SAMPLES, true),
                (MP3_FRAME_SAMPLES, true),
                (100, true)
            ]
        );
        assert!(enc.flushed);
        assert_eq!(bytes, vec![2, 3, 0xFF]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(1.0));
    }

    #[test]
    fn test_mono_passes_single_channel() {
        let buffer = AudioBuffer::silent(22_050, 1, 10).unwrap();
        let mut enc = RecordingEncoder::default();
        encode_blocks(
            &buffer,
            &mut enc,
            &Mp3Settings::default(),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();
        assert_eq!(enc.blocks, vec![(10, false)]);
    }

    #[test]
    fn test_block_size_rounds_to_frame_multiple() {
        let settings = Mp3Settings {
            block_samples: 2000,
            ..Default::default()
        };
        assert_eq!(settings.aligned_block(), MP3_FRAME_SAMPLES * 2);
    }

    #[test]
    fn test_empty_buffer_only_flushes() {
        let buffer = AudioBuffer::silent(44_100, 2, 0).unwrap();
        let mut enc = RecordingEncoder::default();
        let bytes = encode_blocks(
            &buffer,
            &mut enc,
            &Mp3Settings::default(),
            &CancelFlag::new(),
            |_| {},
        )
        .unwrap();
        assert!(enc.blocks.is_empty());
        assert_eq!(bytes, vec![0xFF]);
    }

    #[test]
    fn test_cancel_stops_before_next_block() {
        let buffer = AudioBuffer::silent(44_100, 1, MP3_FRAME_SAMPLES * 4).unwrap();
        let mut enc = RecordingEncoder::default();
        let cancel = CancelFlag::new();
        let observer = cancel.clone();

        let result = encode_blocks(&buffer, &mut enc, &Mp3Settings::default(), &cancel, |_| {
            observer.cancel()
        });
        assert!(matches!(result, Err(ClipforgeError::Cancelled)));
        assert_eq!(enc.blocks.len(), 1);
        assert!(!enc.flushed);
    }

    fn sine(rate: u32, channels: usize, secs: f64) -> AudioBuffer {
        let frames = (rate as f64 * secs) as usize;
        let plane: Vec<f32> = (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5)
            .collect();
        AudioBuffer::new(rate, vec![plane; channels]).unwrap()
    }

    fn starts_with_frame_sync(bytes: &[u8]) -> bool {
        bytes.len() > 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0
    }

    #[test]
    fn test_lame_encodes_stereo_sine() {
        let buffer = sine(44_100, 2, 1.0);
        let mut progress = Vec::new();
        let bytes = encode_mp3(&buffer, &Mp3Settings::default(), &CancelFlag::new(), |p| {
            progress.push(p)
        })
        .unwrap();

        assert!(starts_with_frame_sync(&bytes), "{:02x?}", &bytes[..bytes.len().min(4)]);
        // 128 kbps for one second is roughly 16 KB.
        assert!((8_000..32_000).contains(&bytes.len()), "{} bytes", bytes.len());
        assert_eq!(progress.last().copied(), Some(1.0));
    }

    #[test]
    fn test_lame_encodes_mono_with_large_blocks() {
        let buffer = sine(22_050, 1, 0.5);
        let settings = Mp3Settings {
            bitrate_kbps: 64,
            block_samples: MP3_FRAME_SAMPLES * 8,
        };
        let bytes = encode_mp3(&buffer, &settings, &CancelFlag::new(), |_| {}).unwrap();
        assert!(starts_with_frame_sync(&bytes));
    }
}
