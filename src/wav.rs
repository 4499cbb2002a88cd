//! Streaming WAV headers.
//!
//! A live stream has no known length, so both the RIFF and `data` chunk
//! sizes carry the all-bits-set sentinel (`-1` as a signed 32-bit field).

use std::io::Write;

use crate::error::WavError;

/// Length in bytes of the header emitted by [`write_header`].
pub const HEADER_LEN: usize = 44;

const UNKNOWN_LENGTH: u32 = u32::MAX;
const FORMAT_PCM: u16 = 1;

/// Write a RIFF/WAVE header for an unbounded PCM stream.
pub fn write_header<W>(
    sink: &mut W,
    channels: u32,
    bits_per_sample: u32,
    sample_rate: u64,
) -> Result<(), WavError>
where
    W: Write + ?Sized,
{
    let header = header_bytes(channels, bits_per_sample, sample_rate)?;
    sink.write_all(&header)?;
    sink.flush()?;
    Ok(())
}

/// Build the header without writing it anywhere.
pub fn header_bytes(
    channels: u32,
    bits_per_sample: u32,
    sample_rate: u64,
) -> Result<[u8; HEADER_LEN], WavError> {
    if !(1..=u16::MAX as u32).contains(&channels) {
        return Err(WavError::InvalidArgument(format!(
            "channels must be within 1 to 65535, got {}",
            channels
        )));
    }
    if !(2..=u16::MAX as u32).contains(&bits_per_sample) {
        return Err(WavError::InvalidArgument(format!(
            "bits per sample must be within 2 to 65535, got {}",
            bits_per_sample
        )));
    }
    let sample_rate = u32::try_from(sample_rate).map_err(|_| {
        WavError::InvalidArgument(format!("sample rate {} does not fit in 32 bits", sample_rate))
    })?;

    let block_align = (bits_per_sample + 7) / 8 * channels;
    let block_align = u16::try_from(block_align).map_err(|_| {
        WavError::InvalidArgument(format!("block align {} does not fit in 16 bits", block_align))
    })?;
    let byte_rate = u32::try_from(sample_rate as u64 * block_align as u64).map_err(|_| {
        WavError::InvalidArgument("byte rate does not fit in 32 bits".to_owned())
    })?;

    let mut header = [0u8; HEADER_LEN];
    let fields: [&[u8]; 13] = [
        b"RIFF",
        &UNKNOWN_LENGTH.to_le_bytes(),
        b"WAVE",
        b"fmt ",
        &16u32.to_le_bytes(),
        &FORMAT_PCM.to_le_bytes(),
        &(channels as u16).to_le_bytes(),
        &sample_rate.to_le_bytes(),
        &byte_rate.to_le_bytes(),
        &block_align.to_le_bytes(),
        &(bits_per_sample as u16).to_le_bytes(),
        b"data",
        &UNKNOWN_LENGTH.to_le_bytes(),
    ];
    let mut pos = 0;
    for field in fields {
        header[pos..pos + field.len()].copy_from_slice(field);
        pos += field.len();
    }
    debug_assert_eq!(pos, HEADER_LEN);
    Ok(header)
}
