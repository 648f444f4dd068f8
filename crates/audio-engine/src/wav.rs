//! 16-bit PCM WAV writer.
//!
//! The header is written by hand: a canonical 44-byte RIFF/WAVE header with a
//! single `fmt ` chunk (format code 1) followed by one `data` chunk of
//! interleaved little-endian samples.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::AudioBuffer;

use crate::pcm::interleave_i16;

pub const WAV_HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const PCM_FORMAT: u16 = 1;

/// Total file size for a buffer of the given shape.
pub fn wav_len(frames: usize, channels: usize) -> usize {
    WAV_HEADER_LEN + frames * channels * 2
}

/// Serialize a buffer into an in-memory WAV file.
///
/// An empty buffer yields a header with a zero-length data chunk.
pub fn encode_wav(buffer: &AudioBuffer) -> ClipforgeResult<Vec<u8>> {
    let mut out = Vec::with_capacity(wav_len(buffer.frames(), buffer.channel_count()));
    write_wav(buffer, &mut out)?;
    Ok(out)
}

/// Stream a WAV file into `writer`.
pub fn write_wav<W: Write>(buffer: &AudioBuffer, mut writer: W) -> ClipforgeResult<()> {
    let channels = u16::try_from(buffer.channel_count()).map_err(|_| {
        ClipforgeError::encoder(format!(
            "WAV cannot hold {} channels",
            buffer.channel_count()
        ))
    })?;
    let block_align = channels
        .checked_mul(BITS_PER_SAMPLE / 8)
        .ok_or_else(|| ClipforgeError::encoder(format!("WAV cannot hold {channels} channels")))?;
    let byte_rate = buffer
        .sample_rate()
        .checked_mul(u32::from(block_align))
        .ok_or_else(|| {
            ClipforgeError::encoder(format!(
                "WAV byte rate overflows at {} Hz x {channels} channels",
                buffer.sample_rate()
            ))
        })?;
    let data_len = buffer
        .frames()
        .checked_mul(usize::from(block_align))
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| *len <= u32::MAX - 36)
        .ok_or_else(|| ClipforgeError::encoder("WAV data exceeds 4 GiB"))?;

    writer.write_all(b"RIFF")?;
    writer.write_u32::<LittleEndian>(36 + data_len)?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_u32::<LittleEndian>(16)?;
    writer.write_u16::<LittleEndian>(PCM_FORMAT)?;
    writer.write_u16::<LittleEndian>(channels)?;
    writer.write_u32::<LittleEndian>(buffer.sample_rate())?;
    writer.write_u32::<LittleEndian>(byte_rate)?;
    writer.write_u16::<LittleEndian>(block_align)?;
    writer.write_u16::<LittleEndian>(BITS_PER_SAMPLE)?;

    writer.write_all(b"data")?;
    writer.write_u32::<LittleEndian>(data_len)?;

    for sample in interleave_i16(buffer) {
        writer.write_i16::<LittleEndian>(sample)?;
    }

    tracing::debug!(
        frames = buffer.frames(),
        channels,
        sample_rate = buffer.sample_rate(),
        data_len,
        "Wrote WAV"
    );
    Ok(())
}
