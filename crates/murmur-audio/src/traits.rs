//! Audio output trait and error types.

use murmur_engine::Mixer;

/// Error type for audio operations.
#[derive(Debug)]
pub enum AudioError {
    /// Failed to initialize audio device
    DeviceInit(String),
    /// Failed to create audio stream
    StreamCreate(String),
    /// Playback error
    Playback(String),
    /// No audio device available
    NoDevice,
    /// I/O failure on a file-backed sink
    Io(std::io::Error),
    /// The tick callback reported a fatal error
    Tick(String),
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioError::DeviceInit(msg) => write!(f, "Device init error: {}", msg),
            AudioError::StreamCreate(msg) => write!(f, "Stream create error: {}", msg),
            AudioError::Playback(msg) => write!(f, "Playback error: {}", msg),
            AudioError::NoDevice => write!(f, "No audio device available"),
            AudioError::Io(err) => write!(f, "I/O error: {}", err),
            AudioError::Tick(msg) => write!(f, "Tick callback error: {}", msg),
        }
    }
}

impl std::error::Error for AudioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AudioError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::Io(err)
    }
}

/// The tick callback as sinks see it: errors are [`AudioError`]s.
pub type TickFn<'a> = murmur_engine::TickFn<'a, AudioError>;

/// Trait for audio output backends.
///
/// A backend negotiates rate, channel count (always 2) and sample
/// format (signed 16-bit) at construction, then drives the mixer from
/// [`AudioOutput::run`]: tick, generate, convert, deliver, for as long
/// as the tick callback keeps returning
/// [`Control::Continue`](murmur_engine::Control::Continue). The mixer
/// passed in must have been created with this sink's
/// [`frames_per_buffer`](AudioOutput::frames_per_buffer).
pub trait AudioOutput {
    /// Negotiated output rate in frames per second.
    fn sample_rate(&self) -> u32;

    /// Frames the mixer produces per buffer.
    fn frames_per_buffer(&self) -> usize;

    /// Produce output as fast as the device accepts it (blocking).
    ///
    /// Returns `Ok` after a graceful stop from the tick callback or a
    /// backend-imposed limit; device write errors and tick errors
    /// propagate. Recoverable device hiccups are retried internally
    /// without dropping the buffer.
    fn run(&mut self, mixer: &mut Mixer, tick: &mut TickFn<'_>) -> Result<(), AudioError>;

    /// Drain pending output and release the device.
    fn close(&mut self) -> Result<(), AudioError>;
}
