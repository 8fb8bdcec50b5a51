//! Headless driver for the murmur soundscape engine.
//!
//! Provides offline rendering (frames or WAV, no device needed) and a
//! threaded live-playback helper, so CLIs and embeddings share one
//! driving path.

mod wav;

use murmur_audio::{AudioError, AudioOutput, CpalOutput, SinkOptions, TickFn};
use murmur_engine::{Control, Mixer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

// Re-export common types so callers don't need the engine crate directly.
pub use murmur_engine::Frame;

pub use wav::{frames_to_wav, write_wav};

/// Drive the mixer without a device, collecting up to `max_frames`
/// output frames (or fewer if the tick callback stops the run).
pub fn render_frames(
    mixer: &mut Mixer,
    tick: &mut TickFn<'_>,
    max_frames: usize,
) -> Result<Vec<Frame>, AudioError> {
    let mut sum = vec![0i32; 2 * mixer.frames_per_buffer()];
    let mut frames = Vec::with_capacity(max_frames);
    while frames.len() < max_frames {
        if let Control::Stop = mixer.generate(&mut sum, tick)? {
            break;
        }
        for pair in sum.chunks_exact(2) {
            frames.push(Frame::from_sum(pair[0], pair[1]));
        }
    }
    frames.truncate(max_frames);
    Ok(frames)
}

/// Offline render straight to an in-memory WAV file.
pub fn render_to_wav(
    mixer: &mut Mixer,
    tick: &mut TickFn<'_>,
    sample_rate: u32,
    max_seconds: f64,
) -> Result<Vec<u8>, AudioError> {
    let max_frames = (max_seconds * f64::from(sample_rate)) as usize;
    let frames = render_frames(mixer, tick, max_frames)?;
    Ok(wav::frames_to_wav(&frames, sample_rate))
}

/// Live playback running on its own thread.
///
/// The scene builder runs on the audio thread once the device is open
/// and its rate and buffer size are known; the mixer and tick callback
/// it returns stay on that thread for the whole session.
pub struct LivePlayback {
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LivePlayback {
    pub fn spawn<F, T>(scene: F) -> Self
    where
        F: FnOnce(u32, usize) -> (Mixer, T) + Send + 'static,
        T: FnMut(&mut Mixer, i64) -> Result<Control, AudioError> + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let done = finished.clone();
        let thread = std::thread::spawn(move || {
            audio_thread(scene, stop, done);
        });

        Self {
            stop_signal,
            finished,
            thread: Some(thread),
        }
    }

    /// Ask the audio thread to stop after its current buffer, then wait
    /// for it.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Drop for LivePlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread<F, T>(scene: F, stop_signal: Arc<AtomicBool>, finished: Arc<AtomicBool>)
where
    F: FnOnce(u32, usize) -> (Mixer, T) + Send + 'static,
    T: FnMut(&mut Mixer, i64) -> Result<Control, AudioError> + 'static,
{
    let options = SinkOptions::new();
    let mut sink = match CpalOutput::new(None, None, false, &options) {
        Ok(sink) => sink,
        Err(err) => {
            warn!("cannot open audio output: {}", err);
            finished.store(true, Ordering::Relaxed);
            return;
        }
    };

    let (mut mixer, mut tick) = scene(sink.sample_rate(), sink.frames_per_buffer());

    let mut guarded_tick = |mixer: &mut Mixer, time: i64| -> Result<Control, AudioError> {
        if stop_signal.load(Ordering::Relaxed) {
            return Ok(Control::Stop);
        }
        tick(mixer, time)
    };

    if let Err(err) = sink.run(&mut mixer, &mut guarded_tick) {
        warn!("playback failed: {}", err);
    }
    if let Err(err) = sink.close() {
        warn!("closing audio output failed: {}", err);
    }
    finished.store(true, Ordering::Relaxed);
}
