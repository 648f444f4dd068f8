//! Buffer-level audio commands.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clipforge_audio::mix::{concat_tracks, SoftwareRenderer};
use clipforge_audio::mp3::{encode_mp3, Mp3Settings};
use clipforge_audio::peaks::PeakCache;
use clipforge_audio::{decode_file, encode_wav};
use clipforge_common::cancel::CancelFlag;
use clipforge_common::config::EncodingDefaults;
use clipforge_common::error::ClipforgeError;

use super::{default_output, ensure_exists, write_output};

pub fn wav(
    input: PathBuf,
    range: Option<(f64, f64)>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut buffer = decode_file(&input)?;
    if let Some((start, end)) = range {
        buffer = buffer
            .slice_secs(start, end)
            .map_err(|e| ClipforgeError::invalid_range(e.to_string()))?;
    }

    let bytes = encode_wav(&buffer)?;
    let output = output.unwrap_or_else(|| default_output(&input, "pcm", "wav"));
    write_output(&output, &bytes)?;
    println!(
        "Wrote {} ({} Hz, {} ch, {:.2}s)",
        output.display(),
        buffer.sample_rate(),
        buffer.channel_count(),
        buffer.duration_secs()
    );
    Ok(())
}

pub fn mp3(
    input: PathBuf,
    bitrate: Option<u32>,
    output: Option<PathBuf>,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    let buffer = decode_file(&input)?;
    let settings = Mp3Settings {
        bitrate_kbps: bitrate.unwrap_or(defaults.audio_bitrate_kbps),
        ..Mp3Settings::default()
    };
    let bytes = encode_mp3(&buffer, &settings, &CancelFlag::new(), |fraction| {
        print!("\r  Progress: {:>3.0}%", fraction * 100.0);
        let _ = std::io::stdout().flush();
    })?;
    println!();

    let output = output.unwrap_or_else(|| default_output(&input, "audio", "mp3"));
    write_output(&output, &bytes)?;
    println!("Wrote {} ({} kbps)", output.display(), settings.bitrate_kbps);
    Ok(())
}

pub fn concat(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    let mut tracks = Vec::with_capacity(inputs.len());
    for path in &inputs {
        ensure_exists(path)?;
        let buffer = decode_file(path)?;
        tracing::info!(
            path = %path.display(),
            duration_secs = buffer.duration_secs(),
            "Decoded track"
        );
        tracks.push(Arc::new(buffer));
    }

    let mixed = concat_tracks(&tracks, defaults.mix_sample_rate, &mut SoftwareRenderer)?;
    let bytes = encode_wav(&mixed)?;
    write_output(&output, &bytes)?;
    println!(
        "Joined {} tracks into {} ({:.2}s)",
        tracks.len(),
        output.display(),
        mixed.duration_secs()
    );
    Ok(())
}

pub fn peaks(
    input: PathBuf,
    buckets: Option<usize>,
    channel: usize,
    output: Option<PathBuf>,
    defaults: &EncodingDefaults,
) -> anyhow::Result<()> {
    let buckets = buckets.unwrap_or(defaults.peak_buckets);
    if buckets == 0 {
        return Err(ClipforgeError::config("bucket count must be at least 1").into());
    }

    let buffer = Arc::new(decode_file(&input)?);
    let mut cache = PeakCache::new(buckets);
    let envelope = cache.get(&buffer, channel)?;
    let json = serde_json::to_string(envelope.as_ref())?;

    match output {
        Some(path) => {
            write_output(&path, json.as_bytes())?;
            println!("Wrote {} buckets to {}", envelope.bucket_count(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
