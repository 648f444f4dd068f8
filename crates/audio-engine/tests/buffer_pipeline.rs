//! Decode, trim, join, reduce and write buffers through the public API.

use std::io::Cursor;
use std::sync::Arc;

use clipforge_audio::mix::{concat_tracks, SoftwareRenderer, MIX_SAMPLE_RATE};
use clipforge_audio::{decode_bytes, encode_wav, PeakCache};
use clipforge_media_model::AudioBuffer;

fn constant_wav(rate: u32, channels: usize, secs: f64, value: f32) -> Vec<u8> {
    let frames = (rate as f64 * secs).round() as usize;
    let buffer = AudioBuffer::new(rate, vec![vec![value; frames]; channels]).unwrap();
    encode_wav(&buffer).unwrap()
}

#[test]
fn joined_tracks_keep_second_track_silent_until_first_ends() {
    let first = decode_bytes(constant_wav(48_000, 1, 0.5, 0.0), Some("wav")).unwrap();
    let second = decode_bytes(constant_wav(22_050, 2, 0.25, 0.5), Some("wav")).unwrap();
    let (d1, d2) = (first.duration_secs(), second.duration_secs());

    let mixed = concat_tracks(
        &[Arc::new(first), Arc::new(second)],
        MIX_SAMPLE_RATE,
        &mut SoftwareRenderer,
    )
    .unwrap();

    assert_eq!(mixed.sample_rate(), MIX_SAMPLE_RATE);
    assert_eq!(mixed.channel_count(), 2);
    assert!(mixed.duration_secs() >= d1 + d2 - 1e-9);

    let boundary = (MIX_SAMPLE_RATE as f64 * d1) as usize;
    for plane in mixed.channels() {
        assert!(plane[..boundary].iter().all(|s| *s == 0.0));
        assert!((plane[boundary + 10] - 0.5).abs() < 1e-3);
    }
}

#[test]
fn mixed_output_reads_back_as_sixteen_bit_stereo() {
    let track = decode_bytes(constant_wav(8_000, 1, 0.1, -1.0), Some("wav")).unwrap();
    let mixed = concat_tracks(&[Arc::new(track)], MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
    let bytes = encode_wav(&mixed).unwrap();
    assert_eq!(bytes.len(), 44 + mixed.frames() * 2 * 2);

    let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, MIX_SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);

    let samples: Vec<i16> = reader.into_samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(samples.len(), mixed.frames() * 2);
    assert_eq!(samples[0], i16::MIN);
}

#[test]
fn sliced_buffer_envelope_is_cached_per_buffer() {
    let mut samples: Vec<f32> = (0..4_000).map(|i| ((i % 100) as f32 / 50.0) - 1.0).collect();
    samples[3_999] = 0.75;
    let buffer = AudioBuffer::new(4_000, vec![samples]).unwrap();
    let trimmed = Arc::new(buffer.slice_secs(0.5, 1.0).unwrap());
    assert_eq!(trimmed.frames(), 2_000);

    let mut cache = PeakCache::new(20);
    let envelope = cache.get(&trimmed, 0).unwrap();
    assert_eq!(envelope.bucket_count(), 20);
    assert_eq!(envelope.interleaved().len(), 40);
    for idx in 0..20 {
        let (min, max) = envelope.bucket(idx).unwrap();
        assert!(min <= max);
        assert!((-1.0..=1.0).contains(&min) && (-1.0..=1.0).contains(&max));
    }

    let again = cache.get(&trimmed, 0).unwrap();
    assert!(Arc::ptr_eq(&envelope, &again));
    assert_eq!(cache.computations(), 1);

    let copy = Arc::new((*trimmed).clone());
    cache.get(&copy, 0).unwrap();
    assert_eq!(cache.computations(), 2);
}

#[test]
fn joining_nothing_yields_an_empty_buffer() {
    let mixed = concat_tracks(&[], MIX_SAMPLE_RATE, &mut SoftwareRenderer).unwrap();
    assert_eq!(mixed.frames(), 0);
    assert_eq!(encode_wav(&mixed).unwrap().len(), 44);
}
