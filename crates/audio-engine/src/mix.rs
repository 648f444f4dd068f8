//! Offline (non-real-time) mixing.
//!
//! Tracks are concatenated: track `i` starts where tracks `0..i` end. The
//! output is always stereo at the mixer rate; the renderer resamples and
//! up/down-mixes each input as it schedules it.
//!
//! Positions are whole output frames. Each track occupies
//! `ceil(frames x out_rate / in_rate)` frames, so neighbours touch exactly.

use std::sync::Arc;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::AudioBuffer;

/// Output sample rate of the mixer.
pub const MIX_SAMPLE_RATE: u32 = 44_100;

/// Output channel count of the mixer.
pub const MIX_CHANNELS: usize = 2;

/// A buffer scheduled to start at an output frame.
#[derive(Debug, Clone)]
pub struct ScheduledSource {
    pub buffer: Arc<AudioBuffer>,
    pub start_frame: usize,
}

/// Renders scheduled buffers into one output buffer, synchronously.
pub trait OfflineRenderer {
    fn render(
        &mut self,
        channels: usize,
        frames: usize,
        sample_rate: u32,
        sources: &[ScheduledSource],
    ) -> ClipforgeResult<AudioBuffer>;
}

/// Pure-Rust renderer: linear-interpolation resampling, additive mixing and
/// a final clamp to `[-1, 1]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareRenderer;

impl OfflineRenderer for SoftwareRenderer {
    fn render(
        &mut self,
        channels: usize,
        frames: usize,
        sample_rate: u32,
        sources: &[ScheduledSource],
    ) -> ClipforgeResult<AudioBuffer> {
        if channels == 0 || sample_rate == 0 {
            return Err(ClipforgeError::render(format!(
                "cannot render {channels} channels at {sample_rate} Hz"
            )));
        }

        let mut out = Vec::new();
        out.try_reserve_exact(channels).map_err(alloc_failure(frames))?;
        for _ in 0..channels {
            let mut plane = Vec::new();
            plane
                .try_reserve_exact(frames)
                .map_err(alloc_failure(frames))?;
            plane.resize(frames, 0.0f32);
            out.push(plane);
        }

        for source in sources {
            mix_into(&mut out, sample_rate, source);
        }

        for plane in &mut out {
            for s in plane.iter_mut() {
                *s = s.clamp(-1.0, 1.0);
            }
        }

        AudioBuffer::new(sample_rate, out).map_err(|e| ClipforgeError::render(e.to_string()))
    }
}

fn alloc_failure(frames: usize) -> impl Fn(std::collections::TryReserveError) -> ClipforgeError {
    move |e| ClipforgeError::render(format!("cannot allocate {frames} output frames: {e}"))
}

fn mix_into(out: &mut [Vec<f32>], out_rate: u32, source: &ScheduledSource) {
    let buffer = &source.buffer;
    let src_frames = buffer.frames();
    if src_frames == 0 {
        return;
    }
    let out_frames = out.first().map_or(0, Vec::len);
    let start = source.start_frame;
    let step = f64::from(buffer.sample_rate()) / f64::from(out_rate);
    let out_channels = out.len();
    let src_channels = buffer.channel_count();

    for dst in start..out_frames {
        let src_pos = (dst - start) as f64 * step;
        let f0 = src_pos.floor() as usize;
        if f0 >= src_frames {
            break;
        }
        let f1 = (f0 + 1).min(src_frames - 1);
        let frac = (src_pos - f0 as f64) as f32;
        let sample = |ch: usize| -> f32 {
            let plane = &buffer.channels()[ch];
            plane[f0] + (plane[f1] - plane[f0]) * frac
        };

        for (c, plane) in out.iter_mut().enumerate() {
            let v = if src_channels == 1 {
                sample(0)
            } else if out_channels == 1 {
                (0..src_channels).map(sample).sum::<f32>() / src_channels as f32
            } else if c < src_channels {
                sample(c)
            } else {
                0.0
            };
            plane[dst] += v;
        }
    }
}

/// Frames a buffer occupies once resampled to `sample_rate`.
pub fn resampled_frames(buffer: &AudioBuffer, sample_rate: u32) -> Option<usize> {
    let scaled = (buffer.frames() as u128) * u128::from(sample_rate);
    let frames = scaled.div_ceil(u128::from(buffer.sample_rate()));
    usize::try_from(frames).ok()
}

/// Start frame of each track when placed end to end, plus the total length.
pub fn concat_offsets(
    tracks: &[Arc<AudioBuffer>],
    sample_rate: u32,
) -> ClipforgeResult<(Vec<usize>, usize)> {
    let mut offsets = Vec::with_capacity(tracks.len());
    let mut cursor = 0usize;
    for track in tracks {
        offsets.push(cursor);
        cursor = resampled_frames(track, sample_rate)
            .and_then(|len| cursor.checked_add(len))
            .ok_or_else(|| ClipforgeError::render("combined duration is too long to render"))?;
    }
    Ok((offsets, cursor))
}

/// Concatenate tracks into one stereo buffer at `sample_rate`.
///
/// Output length is the sum of each track's resampled length, never less
/// than `sample_rate x sum(durations)` frames. Any failure, including
/// allocation failure, is a `RenderFailure`; no partial output is returned.
pub fn concat_tracks(
    tracks: &[Arc<AudioBuffer>],
    sample_rate: u32,
    renderer: &mut dyn OfflineRenderer,
) -> ClipforgeResult<AudioBuffer> {
    if sample_rate == 0 {
        return Err(ClipforgeError::render("mixer sample rate must be non-zero"));
    }
    let (offsets, frames) = concat_offsets(tracks, sample_rate)?;
    let total_secs: f64 = tracks.iter().map(|t| t.duration_secs()).sum();

    let sources: Vec<ScheduledSource> = tracks
        .iter()
        .zip(offsets)
        .map(|(buffer, start_frame)| ScheduledSource {
            buffer: Arc::clone(buffer),
            start_frame,
        })
        .collect();

    tracing::info!(
        tracks = tracks.len(),
        total_secs,
        frames,
        sample_rate,
        "Rendering offline mix"
    );

    let mixed = renderer.render(MIX_CHANNELS, frames, sample_rate, &sources)?;
    if mixed.frames() != frames || mixed.channel_count() != MIX_CHANNELS {
        return Err(ClipforgeError::render(format!(
            "renderer produced {}x{} frames, expected {}x{}",
            mixed.channel_count(),
            mixed.frames(),
            MIX_CHANNELS,
            frames
        )));
    }
    Ok(mixed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(rate: u32, channels: usize, secs: f64, value: f32) -> Arc<AudioBuffer> {
        let frames = (rate as f64 * secs).round() as usize;
        Arc::new(AudioBuffer::new(rate, vec![vec![value; frames]; channels]).unwrap())
    }

    #[test]
    fn test_concat_places_tracks_back_to_back() {
        let a = constant(22_050, 1, 0.5, 0.0);
        let b = constant(48_000, 2, 0.25, 0.5);
        let mixed = concat_tracks(&[a, b], MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();

        assert_eq!(mixed.channel_count(), 2);
        assert_eq!(mixed.sample_rate(), MIX_SAMPLE_RATE);
        assert!(mixed.duration_secs() >= 0.75 - 1e-9);

        let boundary = (MIX_SAMPLE_RATE as f64 * 0.5) as usize;
        for ch in mixed.channels() {
            assert!(ch[..boundary].iter().all(|&s| s == 0.0));
            assert!((ch[boundary] - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mono_is_upmixed() {
        let a = constant(44_100, 1, 0.1, 0.25);
        let mixed = concat_tracks(&[a], MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
        assert!((mixed.channel(0).unwrap()[10] - 0.25).abs() < 1e-6);
        assert!((mixed.channel(1).unwrap()[10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_output_length_is_ceiled() {
        let a = Arc::new(AudioBuffer::silent(48_000, 2, 1).unwrap());
        let mixed = concat_tracks(&[a], MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
        assert_eq!(mixed.frames(), 1);
    }

    #[test]
    fn test_offsets() {
        let tracks = vec![
            constant(10, 1, 1.0, 0.0),
            constant(10, 1, 2.0, 0.0),
            constant(10, 1, 0.5, 0.0),
        ];
        let (offsets, total) = concat_offsets(&tracks, 10).unwrap();
        assert_eq!(offsets, vec![0, 10, 30]);
        assert_eq!(total, 35);

        let (offsets, total) = concat_offsets(&tracks, 15).unwrap();
        assert_eq!(offsets, vec![0, 15, 45]);
        assert_eq!(total, 53);
    }

    #[test]
    fn test_back_to_back_tracks_leave_no_gap() {
        let tracks = vec![
            Arc::new(AudioBuffer::new(44_100, vec![vec![0.1; 4_410]; 2]).unwrap()),
            Arc::new(AudioBuffer::new(44_100, vec![vec![0.2; 8_820]; 2]).unwrap()),
            Arc::new(AudioBuffer::new(44_100, vec![vec![0.3; 13_230]; 2]).unwrap()),
        ];
        let mixed = concat_tracks(&tracks, MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
        assert_eq!(mixed.frames(), 26_460);

        for plane in mixed.channels() {
            assert!(plane.iter().all(|&s| s != 0.0));
            assert_eq!(plane[4_409], 0.1);
            assert_eq!(plane[4_410], 0.2);
            assert_eq!(plane[13_229], 0.2);
            assert_eq!(plane[13_230], 0.3);
            assert_eq!(plane[26_459], 0.3);
        }
    }

    #[test]
    fn test_resampled_tracks_touch() {
        let tracks = vec![constant(22_050, 1, 0.1, 0.5), constant(48_000, 2, 0.1, -0.5)];
        let mixed = concat_tracks(&tracks, MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
        assert_eq!(mixed.frames(), 4_410 + 4_410);
        let left = mixed.channel(0).unwrap();
        assert!(left.iter().all(|&s| s != 0.0));
        assert_eq!(left[4_409], 0.5);
        assert_eq!(left[4_410], -0.5);
    }

    #[test]
    fn test_allocation_failure_is_render_failure() {
        let mut renderer = SoftwareRenderer;
        let err = renderer.render(2, usize::MAX / 2, 44_100, &[]).unwrap_err();
        assert!(matches!(err, ClipforgeError::RenderFailure { .. }));
    }

    #[test]
    fn test_sum_is_clamped() {
        let a = constant(44_100, 2, 0.1, 0.9);
        let sources = vec![
            ScheduledSource {
                buffer: Arc::clone(&a),
                start_frame: 0,
            },
            ScheduledSource {
                buffer: a,
                start_frame: 0,
            },
        ];
        let out = SoftwareRenderer.render(2, 100, 44_100, &sources).unwrap();
        assert_eq!(out.channel(0).unwrap()[0], 1.0);
    }
}
