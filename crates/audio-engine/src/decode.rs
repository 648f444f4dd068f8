//! Decode compressed or container audio into planar float buffers.

use std::io::Cursor;
use std::path::Path;

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::AudioBuffer;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decode the first audio track of a file.
pub fn decode_file(path: &Path) -> ClipforgeResult<AudioBuffer> {
    if !path.exists() {
        return Err(ClipforgeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = std::fs::File::open(path)?;
    let ext = path.extension().and_then(|s| s.to_str());
    decode_source(Box::new(file), ext).map_err(|e| match e {
        ClipforgeError::SourceLoad { message } => {
            ClipforgeError::source_load(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Decode an in-memory file. `ext` is an optional format hint.
pub fn decode_bytes(bytes: Vec<u8>, ext: Option<&str>) -> ClipforgeResult<AudioBuffer> {
    decode_source(Box::new(Cursor::new(bytes)), ext)
}

fn hint_for(ext: Option<&str>) -> Hint {
    let mut hint = Hint::new();
    if let Some(ext) = ext {
        match ext.to_ascii_lowercase().as_str() {
            "m4a" | "mp4" | "mov" | "3gp" => {
                hint.with_extension("m4a");
            }
            "ogg" | "oga" | "opus" => {
                hint.with_extension("ogg");
            }
            "mkv" | "webm" | "weba" => {
                hint.with_extension("mkv");
            }
            other => {
                hint.with_extension(other);
            }
        }
    }
    hint
}

fn decode_source(source: Box<dyn MediaSource>, ext: Option<&str>) -> ClipforgeResult<AudioBuffer> {
    let mss = MediaSourceStream::new(source, Default::default());
    let hint = hint_for(ext);

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| ClipforgeError::source_load(format!("unrecognized audio format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ClipforgeError::source_load("no audio track found"))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track.codec_params.channels.map(|c| c.count());
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ClipforgeError::source_load(format!("unsupported audio codec: {e}")))?;

    debug!(?sample_rate, ?channel_count, "Decoding audio track");

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(Error::ResetRequired) => break,
            Err(e) => return Err(ClipforgeError::source_load(format!("read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                let channels = spec.channels.count();
                sample_rate.get_or_insert(spec.rate);
                if *channel_count.get_or_insert(channels) != channels {
                    warn!(channels, "Skipping packet with a different channel layout");
                    continue;
                }

                let mut buf = match sample_buf.take() {
                    Some(b) => b,
                    None => SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec),
                };
                buf.copy_interleaved_ref(audio_buf);
                samples.extend_from_slice(buf.samples());
                sample_buf = Some(buf);
            }
            Err(Error::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(ClipforgeError::source_load(format!("decode error: {e}"))),
        }
    }

    let sample_rate =
        sample_rate.ok_or_else(|| ClipforgeError::source_load("audio track has no sample rate"))?;
    let channels = channel_count.unwrap_or(1).max(1);
    let buffer = AudioBuffer::from_interleaved(sample_rate, channels, &samples)
        .map_err(|e| ClipforgeError::source_load(e.to_string()))?;
    debug!(
        frames = buffer.frames(),
        channels = buffer.channel_count(),
        sample_rate,
        "Decoded audio"
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::encode_wav;

    #[test]
    fn test_decodes_wav_written_by_writer() {
        let left: Vec<f32> = (0..480).map(|i| (i as f32 / 480.0) - 0.5).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let original = AudioBuffer::new(48_000, vec![left, right]).unwrap();
        let wav = encode_wav(&original).unwrap();

        let decoded = decode_bytes(wav, Some("wav")).unwrap();
        assert_eq!(decoded.sample_rate(), 48_000);
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.frames(), 480);

        for (a, b) in original.channels()[1].iter().zip(&decoded.channels()[1]) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_garbage_is_source_load_error() {
        let err = decode_bytes(vec![0u8; 64], None).unwrap_err();
        assert!(matches!(err, ClipforgeError::SourceLoad { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = decode_file(Path::new("/definitely/not/here.wav")).unwrap_err();
        assert!(matches!(err, ClipforgeError::FileNotFound { .. }));
    }
}
