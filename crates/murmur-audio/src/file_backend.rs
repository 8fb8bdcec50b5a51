//! Raw-PCM file backend.
//!
//! Writes interleaved signed 16-bit PCM to a file, mainly for offline
//! rendering and tests. Recognised options: `end=big|little` (byte
//! order, defaulting to the machine's), `time=SECONDS` (output length,
//! default 5.0), `buffersize=BYTES` (buffer granularity, default
//! 16384).

use std::fs::File;
use std::io::{BufWriter, Write};

use murmur_engine::{Control, Frame, Mixer};
use tracing::info;

use crate::options::SinkOptions;
use crate::traits::{AudioError, AudioOutput, TickFn};

const DEFAULT_RATE: u32 = 44100;
const DEFAULT_FILENAME: &str = "murmur-out.raw";
const DEFAULT_BUFFER_BYTES: usize = 16384;

/// File sink producing headerless 16-bit stereo PCM.
pub struct FileOutput {
    file: Option<BufWriter<File>>,
    big_endian: bool,
    sample_rate: u32,
    frames_per_buffer: usize,
    /// Stop after this many frames have been written.
    max_time: i64,
    cur_time: i64,
    sum: Vec<i32>,
    raw: Vec<u8>,
}

impl FileOutput {
    pub fn new(
        path: Option<&str>,
        rate: Option<u32>,
        verbose: bool,
        options: &SinkOptions,
    ) -> Result<Self, AudioError> {
        let big_endian = match options.get("end") {
            Some("big") => true,
            Some("little") => false,
            _ => cfg!(target_endian = "big"),
        };
        let max_secs = options.get_f64("time").unwrap_or(5.0);
        let buffer_bytes = options
            .get_usize("buffersize")
            .unwrap_or(DEFAULT_BUFFER_BYTES);
        if options.flag("listdevices") {
            info!("device list: give any writable file as a device name");
        }

        let sample_rate = rate.unwrap_or(DEFAULT_RATE);
        let path = path.unwrap_or(DEFAULT_FILENAME);
        let file = File::create(path)?;

        // 2 channels, 2 bytes per sample.
        let frames_per_buffer = buffer_bytes / 4;
        let max_time = (max_secs * f64::from(sample_rate)) as i64;

        if verbose {
            info!(
                path,
                sample_rate,
                frames_per_buffer,
                byte_order = if big_endian { "big-endian" } else { "little-endian" },
                seconds = max_secs,
                "file sink open"
            );
        }

        Ok(Self {
            file: Some(BufWriter::new(file)),
            big_endian,
            sample_rate,
            frames_per_buffer,
            max_time,
            cur_time: 0,
            sum: vec![0i32; 2 * frames_per_buffer],
            raw: Vec::with_capacity(buffer_bytes),
        })
    }
}

impl AudioOutput for FileOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    fn run(&mut self, mixer: &mut Mixer, tick: &mut TickFn<'_>) -> Result<(), AudioError> {
        loop {
            if let Control::Stop = mixer.generate(&mut self.sum, tick)? {
                return Ok(());
            }

            self.raw.clear();
            for pair in self.sum.chunks_exact(2) {
                let frame = Frame::from_sum(pair[0], pair[1]);
                if self.big_endian {
                    self.raw.extend_from_slice(&frame.left.to_be_bytes());
                    self.raw.extend_from_slice(&frame.right.to_be_bytes());
                } else {
                    self.raw.extend_from_slice(&frame.left.to_le_bytes());
                    self.raw.extend_from_slice(&frame.right.to_le_bytes());
                }
            }

            let file = self
                .file
                .as_mut()
                .ok_or_else(|| AudioError::Playback("file sink is closed".to_owned()))?;
            file.write_all(&self.raw)?;

            self.cur_time += self.frames_per_buffer as i64;
            if self.cur_time >= self.max_time {
                return Ok(());
            }
        }
    }

    fn close(&mut self) -> Result<(), AudioError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_engine::{Control, Mixer, Note};
    use murmur_ir::{Pan, Sample};
    use std::rc::Rc;

    #[test]
    fn writes_time_limited_pcm() {
        let dir = std::env::temp_dir().join("murmur-file-sink-test.raw");
        let path = dir.to_str().unwrap();

        // 256-frame buffers, 0.1 s at 1024 fps => 103 frames, rounded
        // up to a whole buffer.
        let options = SinkOptions::parse(["time=0.1", "buffersize=1024", "end=little"]);
        let mut sink = FileOutput::new(Some(path), Some(1024), false, &options).unwrap();
        assert_eq!(sink.frames_per_buffer(), 256);

        let mut mixer = Mixer::new(sink.frames_per_buffer());
        let sample = Rc::new(Sample::from_frames(
            "dc",
            vec![1000i16; 64],
            1,
            1.0,
            None,
        ));
        mixer.add_note(Note::once(sample, 1.0, 1.0, Pan::identity(), 0));

        let mut tick = |_: &mut Mixer, _: i64| Ok(Control::Continue);
        sink.run(&mut mixer, &mut tick).unwrap();
        sink.close().unwrap();

        let bytes = std::fs::read(path).unwrap();
        assert_eq!(bytes.len(), 256 * 4);
        // First frame: 1000 on both sides, little-endian.
        assert_eq!(&bytes[0..4], &[0xE8, 0x03, 0xE8, 0x03]);
        std::fs::remove_file(path).ok();
    }
}
