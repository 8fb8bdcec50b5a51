//! Scheduled playback instances.

use alloc::boxed::Box;
use alloc::rc::Rc;

use murmur_ir::{ChannelHandle, Pan, Sample};

/// Callback fired exactly once when a note is reaped from the queue.
pub type RemoveFn = Box<dyn FnOnce()>;

/// A scheduled playback of a [`Sample`], owned by the note queue from
/// the moment it is added until it is reaped or purged.
pub struct Note {
    /// The sound to play. Shared, never mutated by the engine.
    pub sample: Rc<Sample>,
    /// Absolute frame time at which playback begins.
    pub start_time: i64,
    /// 1.0 plays the sample at its natural pitch.
    pub pitch: f64,
    /// 0.0 is mute, 1.0 full volume; higher values overdrive.
    pub volume: f64,
    /// Base stereo placement, composed with the channel tree's
    /// transforms every buffer.
    pub pan: Pan,
    /// The channel this note plays on, if any.
    pub channel: Option<ChannelHandle>,
    /// Fired when the note is reaped after playing out. Not fired on a
    /// channel purge.
    pub on_remove: Option<RemoveFn>,

    /// Source-frame cursor.
    pub(crate) frame_pos: i64,
    /// Fractional cursor, 0.16 fixed point.
    pub(crate) frame_frac: i64,
    /// Passes through the loop section remaining after the current one.
    pub(crate) reps_left: i64,
}

impl Note {
    /// A note that plays the sample through once.
    pub fn once(sample: Rc<Sample>, pitch: f64, volume: f64, pan: Pan, start_time: i64) -> Self {
        Self::with_reps(sample, pitch, volume, pan, start_time, 1)
    }

    /// A note that plays the loop section `reps` times in total.
    /// Without a loop section the note plays through once.
    pub fn with_reps(
        sample: Rc<Sample>,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        reps: i64,
    ) -> Self {
        let reps = if sample.has_loop() { reps.max(1) } else { 1 };
        Self {
            sample,
            start_time,
            pitch,
            volume,
            pan,
            channel: None,
            on_remove: None,
            frame_pos: 0,
            frame_frac: 0,
            reps_left: reps - 1,
        }
    }

    /// A note sized to last roughly `duration` output frames: the
    /// repetition count is the smallest that reaches `duration`.
    pub fn with_duration(
        sample: Rc<Sample>,
        pitch: f64,
        volume: f64,
        pan: Pan,
        start_time: i64,
        duration: i64,
    ) -> Self {
        let reps = if !sample.has_loop() {
            1
        } else {
            let loop_len = sample.loop_len() as i64;
            let margins = sample.num_frames as i64 - loop_len;
            let duration_src = (duration as f64 * (sample.framerate * pitch)) as i64;
            (duration_src - margins + (loop_len - 1)) / loop_len
        };
        Self::with_reps(sample, pitch, volume, pan, start_time, reps)
    }

    /// How many output frames this note will take to play out.
    pub fn duration_frames(&self) -> i64 {
        let ratio = self.sample.framerate * self.pitch;
        let num_frames = self.sample.num_frames as f64;
        if self.reps_left == 0 {
            (num_frames / ratio) as i64
        } else {
            let extra = (self.sample.loop_len() * self.reps_left as usize) as f64;
            ((num_frames + extra) / ratio) as i64
        }
    }
}
