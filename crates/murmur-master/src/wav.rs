//! WAV encoding for rendered frames.
//!
//! One canonical layout only: a 44-byte RIFF/WAVE header for
//! uncompressed 16-bit stereo PCM, followed by the interleaved frame
//! pairs little-endian.

use murmur_engine::Frame;
use std::io::Write;

const HEADER_LEN: u32 = 44;
const NUM_CHANNELS: u16 = 2;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_FRAME: u32 = NUM_CHANNELS as u32 * BITS_PER_SAMPLE as u32 / 8;

/// Write `frames` as a complete WAV file.
pub fn write_wav(w: &mut impl Write, frames: &[Frame], sample_rate: u32) -> std::io::Result<()> {
    let data_len = frames.len() as u32 * BYTES_PER_FRAME;

    w.write_all(b"RIFF")?;
    w.write_all(&(HEADER_LEN - 8 + data_len).to_le_bytes())?;
    w.write_all(b"WAVE")?;

    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?; // fmt chunk length
    w.write_all(&1u16.to_le_bytes())?; // uncompressed PCM
    w.write_all(&NUM_CHANNELS.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * BYTES_PER_FRAME).to_le_bytes())?; // byte rate
    w.write_all(&(BYTES_PER_FRAME as u16).to_le_bytes())?; // block align
    w.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    w.write_all(b"data")?;
    w.write_all(&data_len.to_le_bytes())?;
    for frame in frames {
        let [left_lo, left_hi] = frame.left.to_le_bytes();
        let [right_lo, right_hi] = frame.right.to_le_bytes();
        w.write_all(&[left_lo, left_hi, right_lo, right_hi])?;
    }
    Ok(())
}

/// Encode `frames` into an in-memory WAV file.
pub fn frames_to_wav(frames: &[Frame], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN as usize + frames.len() * BYTES_PER_FRAME as usize);
    write_wav(&mut buf, frames, sample_rate).expect("Vec<u8> write cannot fail");
    buf
}
