//! CPAL-based live output backend.
//!
//! The mixer thread fills an SPSC ring of frames; the device callback
//! drains it, zero-filling on underflow rather than blocking. Options:
//! `buffercount=N` sizes the ring in buffers (default 4),
//! `buffersize=BYTES` sets the mix buffer granularity (default 4096
//! frames' worth), `listdevices` logs the host's output devices.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use murmur_engine::{Control, Frame, Mixer};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::options::SinkOptions;
use crate::traits::{AudioError, AudioOutput, TickFn};

const DEFAULT_FRAMES_PER_BUFFER: usize = 4096;

/// Live audio output through the system's default host.
pub struct CpalOutput {
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
    frames_per_buffer: usize,
    sum: Vec<i32>,
}

impl CpalOutput {
    /// Open an output device and build the (initially paused) stream.
    pub fn new(
        device_name: Option<&str>,
        rate: Option<u32>,
        verbose: bool,
        options: &SinkOptions,
    ) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        if options.flag("listdevices") {
            list_devices(&host);
        }

        let device = match device_name {
            Some(name) => find_device(&host, name)?,
            None => host.default_output_device().ok_or(AudioError::NoDevice)?,
        };

        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = default_config.into();
        // The stream callback assumes 2-channel interleaving.
        config.channels = 2;
        if let Some(rate) = rate {
            config.sample_rate = cpal::SampleRate(rate);
        }

        let frames_per_buffer = options
            .get_usize("buffersize")
            .map(|bytes| bytes / 4)
            .unwrap_or(DEFAULT_FRAMES_PER_BUFFER)
            .max(1);
        let buffer_count = options.get_usize("buffercount").unwrap_or(4).max(2);

        if verbose {
            info!(
                sample_rate = config.sample_rate.0,
                frames_per_buffer,
                buffer_count,
                "cpal sink open"
            );
        }

        let ring = HeapRb::<Frame>::new(frames_per_buffer * buffer_count);
        let (producer, mut consumer) = ring.split();
        let running = Arc::new(AtomicBool::new(false));

        let stream = {
            let running = running.clone();
            let channels = config.channels as usize;
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            data.fill(0.0);
                            return;
                        }
                        for chunk in data.chunks_mut(channels) {
                            match consumer.try_pop() {
                                Some(frame) => {
                                    let left = f32::from(frame.left) / 32768.0;
                                    let right = f32::from(frame.right) / 32768.0;
                                    for (i, sample) in chunk.iter_mut().enumerate() {
                                        *sample = match i {
                                            0 => left,
                                            1 => right,
                                            _ => 0.0,
                                        };
                                    }
                                }
                                // Underflow: emit silence, never block
                                // the device thread.
                                None => chunk.fill(0.0),
                            }
                        }
                    },
                    |err| warn!("audio stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioError::StreamCreate(e.to_string()))?
        };

        Ok(Self {
            config,
            stream: Some(stream),
            producer,
            running,
            frames_per_buffer,
            sum: vec![0i32; 2 * frames_per_buffer],
        })
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    fn run(&mut self, mixer: &mut Mixer, tick: &mut TickFn<'_>) -> Result<(), AudioError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::Playback("cpal sink is closed".to_owned()))?;
        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        self.running.store(true, Ordering::Relaxed);

        loop {
            if let Control::Stop = mixer.generate(&mut self.sum, tick)? {
                return Ok(());
            }

            let Self { sum, producer, .. } = &mut *self;
            for pair in sum.chunks_exact(2) {
                let frame = Frame::from_sum(pair[0], pair[1]);
                // Spin until the ring has room; the device callback is
                // draining it at the output rate. Stopping the loop is
                // the tick callback's job (Control::Stop above).
                while producer.try_push(frame).is_err() {
                    std::hint::spin_loop();
                }
            }
        }
    }

    fn close(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.take();

        // Let the queued tail play out before the stream is disposed.
        // The callback only drains while `running` is set, so the flag
        // must stay up until the ring reports empty; flipping it first
        // would turn the pending frames into silence.
        if stream.is_some() && self.running.load(Ordering::Relaxed) {
            let queued = self.producer.occupied_len() as u64;
            let mut patience_ms = queued * 2000 / u64::from(self.sample_rate().max(1)) + 100;
            while self.producer.occupied_len() > 0 && patience_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(1));
                patience_ms -= 1;
            }
        }

        self.running.store(false, Ordering::Relaxed);
        if let Some(stream) = stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

fn find_device(host: &cpal::Host, name: &str) -> Result<Device, AudioError> {
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::DeviceInit(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceInit(format!(
        "no output device named {:?}",
        name
    )))
}

fn list_devices(host: &cpal::Host) {
    match host.output_devices() {
        Ok(devices) => {
            for device in devices {
                info!(
                    "output device: {}",
                    device.name().unwrap_or_else(|_| "<unnamed>".to_owned())
                );
            }
        }
        Err(err) => warn!("cannot list output devices: {}", err),
    }
}
