//! Decoded PCM assets.
//!
//! A `Sample` holds already-decoded sound data: signed 16-bit values,
//! interleaved when stereo, with optional loop points and an intrinsic
//! framerate expressed as a ratio to the output rate. Samples are
//! read-mostly after loading; notes hold shared references into them for
//! as long as they play.

use alloc::vec::Vec;
use arrayvec::ArrayString;
use core::fmt;

/// Raw PCM layout of input data handed to [`Sample::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PcmFormat {
    /// Bits per sample; 8 and 16 are supported.
    pub bits: u8,
    /// Signed values; unsigned input is re-centred during decode.
    pub signed: bool,
    /// Byte order of 16-bit input (ignored for 8-bit).
    pub big_endian: bool,
}

impl PcmFormat {
    pub const fn signed_16_le() -> Self {
        Self {
            bits: 16,
            signed: true,
            big_endian: false,
        }
    }

    pub const fn signed_16_be() -> Self {
        Self {
            bits: 16,
            signed: true,
            big_endian: true,
        }
    }

    pub const fn unsigned_8() -> Self {
        Self {
            bits: 8,
            signed: false,
            big_endian: false,
        }
    }
}

/// Validation failure while decoding sample data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleError {
    /// Only 8- and 16-bit input is supported.
    UnsupportedBits(u8),
    /// The raw buffer is shorter than the declared frame count requires.
    ShortData { needed: usize, got: usize },
    /// A previous load failed; the sample refuses further loads.
    Poisoned,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::UnsupportedBits(bits) => {
                write!(f, "unsupported sample depth: {} bits (8 or 16 only)", bits)
            }
            SampleError::ShortData { needed, got } => {
                write!(f, "sample data too short: need {} bytes, got {}", needed, got)
            }
            SampleError::Poisoned => write!(f, "sample previously failed to load"),
        }
    }
}

impl core::error::Error for SampleError {}

/// An immutable, decoded PCM asset.
#[derive(Clone, Debug, Default)]
pub struct Sample {
    /// Short display name.
    pub name: ArrayString<32>,
    /// Decoded values in `[-0x7FFF, 0x7FFF]`, interleaved if stereo.
    pub data: Vec<i16>,
    /// Frame count (`data.len() / num_channels`).
    pub num_frames: usize,
    /// 1 or 2.
    pub num_channels: usize,
    /// Source frames per second divided by output frames per second;
    /// 1.0 plays at natural pitch.
    pub framerate: f64,
    /// Loop start frame; meaningful only when [`Sample::has_loop`].
    pub loop_start: usize,
    /// Loop end frame (exclusive); `loop_end <= num_frames`.
    pub loop_end: usize,
    loaded: bool,
    error: bool,
}

impl Sample {
    /// An empty, unloaded sample.
    pub fn new(name: &str) -> Self {
        let mut sample = Self::default();
        let _ = sample.name.try_push_str(name);
        sample
    }

    /// Build a sample from frames that are already signed 16-bit.
    /// Out-of-range or inverted loop points are dropped.
    pub fn from_frames(
        name: &str,
        data: Vec<i16>,
        num_channels: usize,
        framerate: f64,
        loop_points: Option<(usize, usize)>,
    ) -> Self {
        let mut sample = Self::new(name);
        sample.num_frames = data.len() / num_channels;
        sample.num_channels = num_channels;
        sample.framerate = framerate;
        sample.data = data;
        if let Some((start, end)) = loop_points {
            if start < end && end <= sample.num_frames {
                sample.loop_start = start;
                sample.loop_end = end;
            }
        }
        sample.loaded = true;
        sample
    }

    /// Decode raw PCM bytes into the sample.
    ///
    /// Inputs with more than two channels keep their first two; loop
    /// points that are inverted or negative are treated as no loop.
    /// Loading an already-loaded sample is a no-op; a failed load
    /// poisons the sample and later calls return [`SampleError::Poisoned`].
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &mut self,
        raw: &[u8],
        fmt: PcmFormat,
        num_channels: usize,
        num_frames: usize,
        loop_points: (i64, i64),
        source_rate: u32,
        output_rate: u32,
    ) -> Result<(), SampleError> {
        if self.error {
            return Err(SampleError::Poisoned);
        }
        if self.loaded {
            return Ok(());
        }

        if fmt.bits != 8 && fmt.bits != 16 {
            self.error = true;
            return Err(SampleError::UnsupportedBits(fmt.bits));
        }

        let bytes_per_value = (fmt.bits / 8) as usize;
        let needed = num_frames * num_channels * bytes_per_value;
        if raw.len() < needed {
            self.error = true;
            return Err(SampleError::ShortData {
                needed,
                got: raw.len(),
            });
        }

        let channels_out = num_channels.min(2);
        let mut data = Vec::with_capacity(num_frames * channels_out);
        let stride = num_channels * bytes_per_value;

        for frame in raw[..needed].chunks_exact(stride) {
            for ch in 0..channels_out {
                let at = ch * bytes_per_value;
                let value = if fmt.bits == 8 {
                    decode_8(frame[at], fmt.signed)
                } else if fmt.big_endian {
                    decode_16(frame[at], frame[at + 1], fmt.signed)
                } else {
                    decode_16(frame[at + 1], frame[at], fmt.signed)
                };
                data.push(value);
            }
        }

        self.data = data;
        self.num_frames = num_frames;
        self.num_channels = channels_out;
        self.framerate = f64::from(source_rate) / f64::from(output_rate);

        let (loop_start, loop_end) = loop_points;
        if loop_start >= 0 && loop_end > loop_start && loop_end as usize <= num_frames {
            self.loop_start = loop_start as usize;
            self.loop_end = loop_end as usize;
        } else {
            self.loop_start = 0;
            self.loop_end = 0;
        }

        self.loaded = true;
        Ok(())
    }

    /// Release the decoded data, keeping the sample reloadable.
    pub fn unload(&mut self) {
        if self.error {
            return;
        }
        self.data = Vec::new();
        self.loaded = false;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Returns true if the sample has a loop section.
    pub fn has_loop(&self) -> bool {
        self.loop_end > self.loop_start
    }

    /// Length of the loop section in frames.
    pub fn loop_len(&self) -> usize {
        self.loop_end - self.loop_start
    }
}

/// Widen one 8-bit sample to centred signed 16-bit.
fn decode_8(byte: u8, signed: bool) -> i16 {
    let byte = if signed { byte } else { byte ^ 0x80 };
    let val = if byte & 0x80 != 0 {
        -0x80 + (byte & 0x7F) as i32
    } else {
        byte as i32
    };
    (val * 0x100) as i16
}

/// Assemble a 16-bit sample from high and low bytes, sign-extending the
/// high byte.
fn decode_16(hi: u8, lo: u8, signed: bool) -> i16 {
    let hi = if signed { hi } else { hi ^ 0x80 };
    let val = if hi & 0x80 != 0 {
        (-0x80 + (hi & 0x7F) as i32) * 0x100
    } else {
        hi as i32 * 0x100
    };
    (val | lo as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn decode_16_signed_round_trip() {
        for value in [-0x7FFF_i16, -0x100, -1, 0, 1, 0x100, 0x7FFF] {
            let [lo, hi] = value.to_le_bytes();
            assert_eq!(decode_16(hi, lo, true), value);
        }
    }

    #[test]
    fn decode_16_unsigned_recentres() {
        // Unsigned midpoint 0x8000 is silence.
        assert_eq!(decode_16(0x80, 0x00, false), 0);
        assert_eq!(decode_16(0x00, 0x00, false), -0x8000);
        assert_eq!(decode_16(0xFF, 0xFF, false), 0x7FFF);
    }

    #[test]
    fn decode_8_widens() {
        assert_eq!(decode_8(0x7F, true), 0x7F00);
        assert_eq!(decode_8(0x80, true), -0x8000);
        assert_eq!(decode_8(0x80, false), 0);
    }

    #[test]
    fn load_16le_mono() {
        let mut sample = Sample::new("blip");
        let raw: Vec<u8> = [0i16, 1000, -1000, 0x7FFF]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        sample
            .load(&raw, PcmFormat::signed_16_le(), 1, 4, (0, 0), 44100, 44100)
            .unwrap();
        assert_eq!(sample.data, vec![0, 1000, -1000, 0x7FFF]);
        assert_eq!(sample.num_frames, 4);
        assert_eq!(sample.framerate, 1.0);
        assert!(!sample.has_loop());
        assert!(sample.is_loaded());
    }

    #[test]
    fn load_folds_extra_channels() {
        // 3-channel input keeps the first two.
        let raw: Vec<u8> = [1i16, 2, 3, 4, 5, 6]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut sample = Sample::new("tri");
        sample
            .load(&raw, PcmFormat::signed_16_le(), 3, 2, (0, 0), 22050, 44100)
            .unwrap();
        assert_eq!(sample.num_channels, 2);
        assert_eq!(sample.data, vec![1, 2, 4, 5]);
        assert_eq!(sample.framerate, 0.5);
    }

    #[test]
    fn inverted_loop_is_dropped() {
        let mut sample = Sample::new("noloop");
        sample
            .load(&[0, 0, 0, 0], PcmFormat::signed_16_le(), 1, 2, (1, 1), 44100, 44100)
            .unwrap();
        assert!(!sample.has_loop());
    }

    #[test]
    fn short_data_poisons() {
        let mut sample = Sample::new("short");
        let err = sample
            .load(&[0, 0], PcmFormat::signed_16_le(), 1, 4, (0, 0), 44100, 44100)
            .unwrap_err();
        assert_eq!(err, SampleError::ShortData { needed: 8, got: 2 });
        assert!(sample.has_error());
        assert_eq!(
            sample
                .load(&[0; 8], PcmFormat::signed_16_le(), 1, 4, (0, 0), 44100, 44100)
                .unwrap_err(),
            SampleError::Poisoned
        );
    }

    #[test]
    fn reload_is_noop() {
        let mut sample = Sample::new("twice");
        sample
            .load(&[0, 0], PcmFormat::signed_16_le(), 1, 1, (0, 0), 44100, 44100)
            .unwrap();
        // A second load must not clobber the data.
        sample
            .load(&[1, 1, 1, 1], PcmFormat::signed_16_le(), 1, 2, (0, 0), 44100, 44100)
            .unwrap();
        assert_eq!(sample.num_frames, 1);
    }
}
