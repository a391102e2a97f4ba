//! Raw audio decoding into normalized sample buffers.
//!
//! The pipeline accepts one wire format only: a 44-byte WAV-style header
//! followed by little-endian 16-bit PCM mono samples at 16 kHz. Anything else
//! must be converted upstream before it reaches this module.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fixed sample rate of the pipeline.
pub const SAMPLE_RATE: u32 = 16_000;

const HEADER_LEN: usize = 44;
const CHUNK_LEN: usize = 8192;
const PCM_SCALE: f32 = 32_767.0;

#[derive(thiserror::Error, Debug)]
pub enum AudioError {
    #[error("audio header too short: read {0} of 44 bytes")]
    ShortHeader(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decode a raw PCM stream into normalized mono samples.
///
/// Reads in bounded chunks so peak memory stays proportional to the chunk
/// size, not the stream size. An odd trailing byte at a chunk boundary is
/// carried over and prefixed to the next chunk, so chunking never splits a
/// sample. `size_hint` (total byte length including the header, when known)
/// is used to pre-reserve the output buffer.
pub fn read_pcm_samples<R: Read>(
    mut reader: R,
    size_hint: Option<u64>,
) -> Result<Vec<f32>, AudioError> {
    let mut header = [0u8; HEADER_LEN];
    skip_header(&mut reader, &mut header)?;

    let capacity = size_hint
        .map(|len| (len.saturating_sub(HEADER_LEN as u64) / 2) as usize)
        .unwrap_or(0);
    let mut samples = Vec::with_capacity(capacity);

    let mut chunk = [0u8; CHUNK_LEN];
    let mut carry: Option<u8> = None;

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let mut bytes = &chunk[..n];

        // The leftover byte from the previous chunk is the low half of the
        // next sample.
        if let Some(low) = carry.take() {
            samples.push(decode_sample(low, bytes[0]));
            bytes = &bytes[1..];
        }

        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            samples.push(decode_sample(pair[0], pair[1]));
        }
        if let [odd] = pairs.remainder() {
            carry = Some(*odd);
        }
    }

    Ok(samples)
}

/// Convenience wrapper: decode a WAV file from disk, reserving the output
/// buffer from the file size.
pub fn read_wav_samples(path: &Path) -> Result<Vec<f32>, AudioError> {
    let file = File::open(path)?;
    let size = file.metadata().ok().map(|m| m.len());
    read_pcm_samples(file, size)
}

fn decode_sample(lo: u8, hi: u8) -> f32 {
    (i16::from_le_bytes([lo, hi]) as f32 / PCM_SCALE).clamp(-1.0, 1.0)
}

fn skip_header<R: Read>(reader: &mut R, buf: &mut [u8; HEADER_LEN]) -> Result<(), AudioError> {
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(AudioError::ShortHeader(filled));
        }
        filled += n;
    }
    Ok(())
}
