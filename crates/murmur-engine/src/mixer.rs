//! Per-buffer sound generation.
//!
//! [`Mixer::generate`] is the bottom loop of the engine. Once per output
//! buffer it runs the tick callback, then walks the note queue up to the
//! buffer's end time. For each live note it composes the channel tree's
//! volume and stereo state into per-side gains (constant factors where
//! possible, per-frame ramp ranges where a fade or pan swoop overlaps
//! the buffer), resamples the source by linear interpolation with loop
//! wrap, and accumulates into an interleaved stereo sum buffer of `i32`.
//! Notes that play out are reaped and their completion callbacks fired
//! in queue order. The sum buffer is never clamped here; sinks hard-clip
//! during PCM conversion.

use alloc::vec::Vec;

use murmur_ir::{point_gains, Pan, StereoWindow};

use crate::note::Note;
use crate::queue::NoteQueue;
use crate::ranges::{BaseVol, VarVol, VolRange};

/// Whether the run loop should keep producing buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

/// The tick callback: invoked once per buffer, before mixing, with the
/// frame time of the buffer's first frame. It may schedule notes, mutate
/// channels, or shift the timebase; returning [`Control::Stop`] ends the
/// run loop gracefully, and an error terminates it.
pub type TickFn<'a, E> = dyn FnMut(&mut Mixer, i64) -> Result<Control, E> + 'a;

/// All mixing state: the note queue, the frame clock, and the reusable
/// ramp-range scratch.
pub struct Mixer {
    queue: NoteQueue,
    current_time: i64,
    frames_per_buffer: usize,
    ranges: Vec<VolRange>,
}

impl Mixer {
    pub fn new(frames_per_buffer: usize) -> Self {
        Self {
            queue: NoteQueue::new(),
            current_time: 0,
            frames_per_buffer,
            ranges: Vec::with_capacity(2),
        }
    }

    /// Frame time of the next sample to be produced.
    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.frames_per_buffer
    }

    pub fn note_count(&self) -> usize {
        self.queue.len()
    }

    /// Queued notes in time order.
    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.queue.iter()
    }

    /// Schedule a note. Returns how many output frames it will last.
    pub fn add_note(&mut self, note: Note) -> i64 {
        let duration = note.duration_frames();
        self.queue.push(note);
        duration
    }

    /// Drop every queued note on `channel` or any channel below it.
    /// Completion callbacks do not fire on this path.
    pub fn destroy_notes_by_channel(&mut self, channel: &murmur_ir::ChannelHandle) -> usize {
        self.queue.purge_channel(channel)
    }

    /// Rebase the frame clock: subtract `offset` from `current_time`
    /// and from every queued note's start time, preserving their
    /// relative offsets.
    pub fn adjust_timebase(&mut self, offset: i64) {
        self.current_time -= offset;
        self.queue.adjust_timebase(offset);
    }

    /// Produce one buffer of sound into `buffer`, which must hold
    /// `2 * frames_per_buffer` interleaved values.
    pub fn generate<E>(
        &mut self,
        buffer: &mut [i32],
        tick: &mut TickFn<'_, E>,
    ) -> Result<Control, E> {
        let now = self.current_time;
        if let Control::Stop = tick(self, now)? {
            return Ok(Control::Stop);
        }
        // The tick may have rebased the clock; read it afterwards.
        let current_time = self.current_time;
        let end_time = current_time + self.frames_per_buffer as i64;

        assert_eq!(buffer.len(), 2 * self.frames_per_buffer);
        buffer.fill(0);

        let Self {
            queue,
            ranges,
            frames_per_buffer,
            ..
        } = &mut *self;
        let frames_per_buffer = *frames_per_buffer;

        let mut prev: Option<usize> = None;
        let mut cursor = queue.head();
        while let Some(idx) = cursor {
            if queue.note(idx).start_time >= end_time {
                break;
            }

            ranges.clear();
            let finished = mix_note(
                queue.note_mut(idx),
                buffer,
                current_time,
                end_time,
                frames_per_buffer,
                ranges,
            );

            if finished {
                let note = queue.remove_after(prev);
                if let Some(on_remove) = note.on_remove {
                    on_remove();
                }
                cursor = match prev {
                    Some(p) => queue.next_of(p),
                    None => queue.head(),
                };
            } else {
                prev = Some(idx);
                cursor = queue.next_of(idx);
            }
        }

        self.current_time = end_time;
        Ok(Control::Continue)
    }
}

/// Volume and pan state composed from a note's channel tree for one
/// buffer. While no pan swoop has been seen, `pan_start` carries the
/// whole transform; the first swoop forks `pan_end` off it and raises
/// `sweeping`.
struct WalkState {
    volume: f64,
    pan_start: Pan,
    pan_end: Pan,
    sweeping: bool,
}

fn compose_channels(
    note: &Note,
    current_time: i64,
    end_time: i64,
    ranges: &mut Vec<VolRange>,
) -> WalkState {
    let mut state = WalkState {
        volume: note.volume,
        pan_start: note.pan,
        pan_end: note.pan,
        sweeping: false,
    };

    let mut cursor = note.channel.clone();
    while let Some(chan) = cursor {
        if let Some(w) = chan.volume_window() {
            if current_time >= w.end {
                state.volume *= w.to;
            } else if w.start >= end_time {
                state.volume *= w.from;
            } else {
                // Mid-fade: becomes a per-frame range instead of a
                // constant factor.
                ranges.push(VolRange::new(w.start, w.end, w.from, w.to));
            }
        }

        if let Some(w) = chan.stereo_window() {
            let constant = if current_time >= w.end {
                Some(w.to)
            } else if w.start >= end_time {
                Some(w.from)
            } else {
                None
            };
            match constant {
                Some(pan) => {
                    state.pan_start.compose(&pan);
                    if state.sweeping {
                        state.pan_end.compose(&pan);
                    }
                }
                None => {
                    if !state.sweeping {
                        state.pan_end = state.pan_start;
                        state.sweeping = true;
                    }
                    state.pan_start.compose(&window_pan_at(&w, current_time));
                    state.pan_end.compose(&window_pan_at(&w, end_time));
                }
            }
        }

        cursor = chan.parent();
    }

    state
}

/// The window's pan value at time `t`, clamped to its endpoints outside
/// the interval.
fn window_pan_at(w: &StereoWindow, t: i64) -> Pan {
    if t >= w.end {
        w.to
    } else if t >= w.start {
        let ratio = (t - w.start) as f64 / (w.end - w.start) as f64;
        Pan::lerp(&w.from, &w.to, ratio)
    } else {
        w.from
    }
}

/// Which point of the stereo field a source channel radiates from.
#[derive(Clone, Copy)]
enum SourcePos {
    /// Mono source: the transform's shift point.
    Centre,
    /// Left channel of a stereo source: one scale unit left of centre.
    Left,
    /// Right channel of a stereo source: one scale unit right.
    Right,
}

impl SourcePos {
    fn locate(self, pan: &Pan) -> (f64, f64) {
        match self {
            SourcePos::Centre => (pan.shift_x, pan.shift_y),
            SourcePos::Left => (pan.shift_x - pan.scale_x, pan.shift_y),
            SourcePos::Right => (pan.shift_x + pan.scale_x, pan.shift_y),
        }
    }
}

/// Left/right gain state for one source channel over one buffer: either
/// two constant bases, or (during a pan swoop) unit bases plus a pair of
/// ramps spanning the buffer.
struct SourceGains {
    left: BaseVol,
    right: BaseVol,
    sweep: Option<(VolRange, VolRange)>,
}

impl SourceGains {
    fn resolve(walk: &WalkState, pos: SourcePos, current_time: i64, end_time: i64) -> Self {
        if !walk.sweeping {
            let (x, y) = pos.locate(&walk.pan_start);
            let (l, r) = point_gains(x, y);
            Self {
                left: BaseVol::new(walk.volume * l),
                right: BaseVol::new(walk.volume * r),
                sweep: None,
            }
        } else {
            let (x0, y0) = pos.locate(&walk.pan_start);
            let (x1, y1) = pos.locate(&walk.pan_end);
            let (l0, r0) = point_gains(x0, y0);
            let (l1, r1) = point_gains(x1, y1);
            Self {
                left: BaseVol::new(walk.volume),
                right: BaseVol::new(walk.volume),
                sweep: Some((
                    VolRange::new(current_time, end_time, l0, l1),
                    VolRange::new(current_time, end_time, r0, r1),
                )),
            }
        }
    }

    /// Gains when no ramp or swoop touches the buffer.
    fn fixed(&self) -> (i64, i64) {
        (self.left.fixed(), self.right.fixed())
    }

    /// Per-frame gains: `var` has already folded the shared volume
    /// ranges; the swoop ramps (if any) fold per side on top.
    fn at(&self, var: &VarVol, t: i64) -> (i64, i64) {
        match &self.sweep {
            None => (var.gain(&self.left), var.gain(&self.right)),
            Some((ramp_l, ramp_r)) => {
                let mut var_l = *var;
                let mut var_r = *var;
                var_l.fold(ramp_l, t);
                var_r.fold(ramp_r, t);
                (var_l.gain(&self.left), var_r.gain(&self.right))
            }
        }
    }
}

/// Mix one note's contribution into the buffer. Returns true when the
/// note has played out and should be reaped.
fn mix_note(
    note: &mut Note,
    buffer: &mut [i32],
    current_time: i64,
    end_time: i64,
    frames_per_buffer: usize,
    ranges: &mut Vec<VolRange>,
) -> bool {
    let sample = note.sample.clone();
    if !sample.is_loaded() || sample.data.is_empty() {
        // A sample that failed validation plays silence and falls out
        // of the queue without a callback-worthy performance; the
        // ordinary reap path still runs.
        return true;
    }

    let walk = compose_channels(note, current_time, end_time, ranges);
    let has_ramps = !ranges.is_empty() || walk.sweeping;

    let lpitch = {
        let step = sample.framerate * note.pitch * 65536.0;
        (step as i64).clamp(1, 0x1000_0000)
    };

    let note_start = if note.start_time >= current_time {
        (note.start_time - current_time) as usize
    } else {
        // Scheduled in the past: begins at the buffer's first frame.
        0
    };

    let data = &sample.data[..];
    let num_frames = sample.num_frames as i64;
    let loop_end = sample.loop_end as i64;
    let loop_len = sample.loop_len() as i64;

    let mut frame_pos = note.frame_pos;
    let mut frame_frac = note.frame_frac;
    let mut reps_left = note.reps_left;
    let mut finished = false;

    if sample.num_channels == 1 {
        let gains = SourceGains::resolve(&walk, SourcePos::Centre, current_time, end_time);
        let (base_l, base_r) = gains.fixed();

        for lx in note_start..frames_per_buffer {
            let cur = frame_pos as usize;
            let next = if frame_pos + 1 == loop_end && reps_left > 0 {
                (frame_pos + 1 - loop_len) as usize
            } else {
                (frame_pos + 1).min(num_frames - 1) as usize
            };
            let interp = data[cur] as i64 * (0x10000 - frame_frac) + data[next] as i64 * frame_frac;

            let (gain_l, gain_r) = if has_ramps {
                let t = current_time + lx as i64;
                let mut var = VarVol::unit();
                for range in ranges.iter() {
                    var.fold(range, t);
                }
                gains.at(&var, t)
            } else {
                (base_l, base_r)
            };

            buffer[2 * lx] += (((interp >> 16) * gain_l) >> 16) as i32;
            buffer[2 * lx + 1] += (((interp >> 16) * gain_r) >> 16) as i32;

            frame_frac += lpitch;
            frame_pos += frame_frac >> 16;
            frame_frac &= 0xFFFF;

            while reps_left > 0 && frame_pos >= loop_end {
                frame_pos -= loop_len;
                reps_left -= 1;
            }
            if frame_pos + 1 >= num_frames && reps_left == 0 {
                finished = true;
                break;
            }
        }
    } else {
        // Stereo source: the left and right source channels radiate
        // from points one scale unit either side of the shift point,
        // giving a 2x2 panning matrix.
        let gains_l = SourceGains::resolve(&walk, SourcePos::Left, current_time, end_time);
        let gains_r = SourceGains::resolve(&walk, SourcePos::Right, current_time, end_time);
        let (base_0l, base_0r) = gains_l.fixed();
        let (base_1l, base_1r) = gains_r.fixed();

        for lx in note_start..frames_per_buffer {
            let cur = (frame_pos * 2) as usize;
            let next = if frame_pos + 1 == loop_end && reps_left > 0 {
                ((frame_pos + 1 - loop_len) * 2) as usize
            } else {
                ((frame_pos + 1).min(num_frames - 1) * 2) as usize
            };
            let interp_0 =
                data[cur] as i64 * (0x10000 - frame_frac) + data[next] as i64 * frame_frac;
            let interp_1 =
                data[cur + 1] as i64 * (0x10000 - frame_frac) + data[next + 1] as i64 * frame_frac;

            let ((gain_0l, gain_0r), (gain_1l, gain_1r)) = if has_ramps {
                let t = current_time + lx as i64;
                let mut var = VarVol::unit();
                for range in ranges.iter() {
                    var.fold(range, t);
                }
                (gains_l.at(&var, t), gains_r.at(&var, t))
            } else {
                ((base_0l, base_0r), (base_1l, base_1r))
            };

            let left =
                (((interp_0 >> 16) * gain_0l) >> 16) + (((interp_1 >> 16) * gain_1l) >> 16);
            let right =
                (((interp_0 >> 16) * gain_0r) >> 16) + (((interp_1 >> 16) * gain_1r) >> 16);
            buffer[2 * lx] += left as i32;
            buffer[2 * lx + 1] += right as i32;

            frame_frac += lpitch;
            frame_pos += frame_frac >> 16;
            frame_frac &= 0xFFFF;

            while reps_left > 0 && frame_pos >= loop_end {
                frame_pos -= loop_len;
                reps_left -= 1;
            }
            if frame_pos + 1 >= num_frames && reps_left == 0 {
                finished = true;
                break;
            }
        }
    }

    note.frame_pos = frame_pos;
    note.frame_frac = frame_frac;
    note.reps_left = reps_left;
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::Cell;
    use murmur_ir::{ChannelNode, Sample, StereoWindow, VolumeWindow};

    const FRAMES: usize = 1024;

    fn continue_tick(_: &mut Mixer, _: i64) -> Result<Control, ()> {
        Ok(Control::Continue)
    }

    fn run_buffer(mixer: &mut Mixer) -> Vec<i32> {
        let mut buffer = vec![0i32; 2 * FRAMES];
        mixer
            .generate::<()>(&mut buffer, &mut continue_tick)
            .unwrap();
        buffer
    }

    fn impulse_sample() -> Rc<Sample> {
        // One peak at frame 1, silence elsewhere.
        Rc::new(Sample::from_frames(
            "impulse",
            vec![0, 32767, 0, 0],
            1,
            1.0,
            None,
        ))
    }

    #[test]
    fn empty_queue_generates_silence() {
        let mut mixer = Mixer::new(FRAMES);
        let buffer = run_buffer(&mut mixer);
        assert!(buffer.iter().all(|&v| v == 0));
        assert_eq!(mixer.current_time(), FRAMES as i64);
    }

    #[test]
    fn mono_impulse_at_centre() {
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 0));
        let buffer = run_buffer(&mut mixer);

        assert_eq!(buffer[2], 32767);
        assert_eq!(buffer[3], 32767);
        for (i, &v) in buffer.iter().enumerate() {
            if i != 2 && i != 3 {
                assert_eq!(v, 0, "unexpected signal at sample {}", i);
            }
        }
        assert_eq!(mixer.note_count(), 0, "note should be reaped");
    }

    #[test]
    fn pan_hard_left_silences_right() {
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::shift(-1.0), 0));
        let buffer = run_buffer(&mut mixer);
        assert_eq!(buffer[2], 32767);
        assert_eq!(buffer[3], 0);
    }

    #[test]
    fn volume_scales_output() {
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(impulse_sample(), 1.0, 0.5, Pan::identity(), 0));
        let buffer = run_buffer(&mut mixer);
        assert_eq!(buffer[2], 32767 / 2);
    }

    #[test]
    fn future_note_starts_at_offset() {
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 100));
        let buffer = run_buffer(&mut mixer);
        assert_eq!(buffer[2 * 100], 0);
        assert_eq!(buffer[2 * 101], 32767);
    }

    #[test]
    fn past_note_starts_at_frame_zero() {
        let mut mixer = Mixer::new(FRAMES);
        let mut buffer = vec![0i32; 2 * FRAMES];
        mixer
            .generate::<()>(&mut buffer, &mut continue_tick)
            .unwrap();
        // current_time is now 1024; a note stamped earlier still plays,
        // beginning at the next buffer's first frame.
        mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 500));
        let buffer = run_buffer(&mut mixer);
        assert_eq!(buffer[2], 32767);
    }

    #[test]
    fn looping_note_plays_exact_frame_count() {
        // 8 frames, loop [2, 6), reps 3: 8 + 2*4 = 16 source frames.
        let sample = Rc::new(Sample::from_frames(
            "looper",
            vec![1000i16; 8],
            1,
            1.0,
            Some((2, 6)),
        ));
        let mut mixer = Mixer::new(FRAMES);
        let duration = mixer.add_note(Note::with_reps(sample, 1.0, 1.0, Pan::identity(), 0, 3));
        assert_eq!(duration, 16);

        let buffer = run_buffer(&mut mixer);
        // 16 source frames are consumed; the last one is the
        // interpolation partner of frame 14 and is never emitted itself.
        let audible = buffer.chunks(2).take_while(|f| f[0] != 0).count();
        assert_eq!(audible, 15);
        assert_eq!(mixer.note_count(), 0);
    }

    #[test]
    fn half_pitch_doubles_duration() {
        let sample = Rc::new(Sample::from_frames("slow", vec![1000i16; 8], 1, 1.0, None));
        let mut mixer = Mixer::new(FRAMES);
        let duration = mixer.add_note(Note::once(sample, 0.5, 1.0, Pan::identity(), 0));
        assert_eq!(duration, 16);
        let buffer = run_buffer(&mut mixer);
        // Last interpolated frame tails off; the bulk must be audible.
        let audible = buffer.chunks(2).take_while(|f| f[0] != 0).count();
        assert!((15..=16).contains(&audible), "audible = {}", audible);
    }

    #[test]
    fn constant_channel_volume_multiplies() {
        let chan = ChannelNode::root();
        chan.set_volume(Some(VolumeWindow::constant(0.5)));

        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 0);
        note.channel = Some(chan.handle());
        mixer.add_note(note);

        let buffer = run_buffer(&mut mixer);
        let direct = 32767 / 2;
        assert!(
            (buffer[2] - direct).abs() <= 1,
            "channel at 0.5 should halve the impulse: {} vs {}",
            buffer[2],
            direct
        );
    }

    #[test]
    fn parent_volumes_compose() {
        let root = ChannelNode::root();
        root.set_volume(Some(VolumeWindow::constant(0.5)));
        let child = ChannelNode::child(&root);
        child.set_volume(Some(VolumeWindow::constant(0.5)));

        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 0);
        note.channel = Some(child.handle());
        mixer.add_note(note);

        let buffer = run_buffer(&mut mixer);
        assert!((buffer[2] - 32767 / 4).abs() <= 2);
    }

    #[test]
    fn volume_fade_ramps_across_buffer() {
        // Fade 0 -> 1 over 4096 frames starting at time 0; the first
        // buffer should rise to roughly a quarter amplitude.
        let chan = ChannelNode::root();
        chan.set_volume(Some(VolumeWindow::fade(0, 4096, 0.0, 1.0)));

        let sample = Rc::new(Sample::from_frames(
            "steady",
            vec![32000i16; 8192],
            1,
            1.0,
            None,
        ));
        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(sample, 1.0, 1.0, Pan::identity(), 0);
        note.channel = Some(chan.handle());
        mixer.add_note(note);

        let buffer = run_buffer(&mut mixer);
        // The fixed-point ramp quantises to 256 steps across the fade.
        let tolerance = 32000 / 256 + 2;
        for &i in &[0usize, 256, 512, 1023] {
            let expected = (32000.0 * i as f64 / 4096.0) as i32;
            let got = buffer[2 * i];
            assert!(
                (got - expected).abs() <= tolerance,
                "frame {}: got {}, expected {}",
                i,
                got,
                expected
            );
        }
    }

    #[test]
    fn pan_sweep_moves_left_to_right() {
        let chan = ChannelNode::root();
        chan.set_stereo(Some(StereoWindow::sweep(
            0,
            FRAMES as i64,
            Pan::shift(-1.0),
            Pan::shift(1.0),
        )));

        let sample = Rc::new(Sample::from_frames(
            "steady",
            vec![32000i16; 2048],
            1,
            1.0,
            None,
        ));
        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(sample, 1.0, 1.0, Pan::identity(), 0);
        note.channel = Some(chan.handle());
        mixer.add_note(note);

        let buffer = run_buffer(&mut mixer);
        // Frame 0: fully left.
        assert!(buffer[0] > 31000, "left at start: {}", buffer[0]);
        assert!(buffer[1] < 200, "right at start: {}", buffer[1]);
        // Final frame: essentially fully right.
        assert!(buffer[2 * 1023] < 500, "left at end: {}", buffer[2 * 1023]);
        assert!(buffer[2 * 1023 + 1] > 31000, "right at end: {}", buffer[2 * 1023 + 1]);
        // Midpoint: both sides audible and roughly equal.
        let mid_l = buffer[2 * 512];
        let mid_r = buffer[2 * 512 + 1];
        assert!((mid_l - mid_r).abs() < 1000, "mid {} vs {}", mid_l, mid_r);
    }

    #[test]
    fn stereo_sample_keeps_sides_apart() {
        // Left source full scale, right source silent.
        let mut data = Vec::new();
        for _ in 0..16 {
            data.push(20000i16);
            data.push(0i16);
        }
        let sample = Rc::new(Sample::from_frames("wide", data, 2, 1.0, None));
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(sample, 1.0, 1.0, Pan::identity(), 0));

        let buffer = run_buffer(&mut mixer);
        // Identity pan places sources at x = -1 and x = +1: the left
        // source reaches only the left output.
        assert!(buffer[0] > 19000, "left: {}", buffer[0]);
        assert_eq!(buffer[1], 0);
    }

    #[test]
    fn completion_callback_fires_once() {
        let fired = Rc::new(Cell::new(0));
        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 0);
        let counter = fired.clone();
        note.on_remove = Some(Box::new(move || counter.set(counter.get() + 1)));
        mixer.add_note(note);

        run_buffer(&mut mixer);
        assert_eq!(fired.get(), 1);
        run_buffer(&mut mixer);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn channel_purge_skips_callbacks() {
        let chan = ChannelNode::root();
        let fired = Rc::new(Cell::new(0));
        let mut mixer = Mixer::new(FRAMES);
        let mut note = Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), 0);
        note.channel = Some(chan.handle());
        let counter = fired.clone();
        note.on_remove = Some(Box::new(move || counter.set(counter.get() + 1)));
        mixer.add_note(note);

        assert_eq!(mixer.destroy_notes_by_channel(&chan.handle()), 1);
        assert_eq!(fired.get(), 0);
        let buffer = run_buffer(&mut mixer);
        assert!(buffer.iter().all(|&v| v == 0));
    }

    #[test]
    fn adjust_timebase_preserves_relative_offsets() {
        let mut mixer = Mixer::new(FRAMES);
        for t in [2000i64, 3000, 5000] {
            mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), t));
        }
        let offsets: Vec<i64> = mixer
            .notes()
            .map(|n| n.start_time - mixer.current_time())
            .collect();

        mixer.adjust_timebase(1500);
        let shifted: Vec<i64> = mixer
            .notes()
            .map(|n| n.start_time - mixer.current_time())
            .collect();
        assert_eq!(offsets, shifted);
        assert_eq!(mixer.current_time(), -1500);
    }

    #[test]
    fn tick_can_schedule_and_stop() {
        let sample = impulse_sample();
        let mut mixer = Mixer::new(FRAMES);
        let mut buffer = vec![0i32; 2 * FRAMES];
        let mut calls = 0;

        let mut tick = |mixer: &mut Mixer, time: i64| -> Result<Control, ()> {
            calls += 1;
            if calls == 1 {
                mixer.add_note(Note::once(sample.clone(), 1.0, 1.0, Pan::identity(), time));
                Ok(Control::Continue)
            } else {
                Ok(Control::Stop)
            }
        };

        assert_eq!(
            mixer.generate(&mut buffer, &mut tick).unwrap(),
            Control::Continue
        );
        assert_eq!(buffer[2], 32767);
        assert_eq!(
            mixer.generate(&mut buffer, &mut tick).unwrap(),
            Control::Stop
        );
    }

    #[test]
    fn tick_error_propagates() {
        let mut mixer = Mixer::new(FRAMES);
        let mut buffer = vec![0i32; 2 * FRAMES];
        let mut tick = |_: &mut Mixer, _: i64| -> Result<Control, &'static str> { Err("boom") };
        assert_eq!(mixer.generate(&mut buffer, &mut tick), Err("boom"));
    }

    #[test]
    fn unloaded_sample_plays_silence_and_reaps() {
        let mut sample = Sample::from_frames("gone", vec![1000i16; 8], 1, 1.0, None);
        sample.unload();
        let mut mixer = Mixer::new(FRAMES);
        mixer.add_note(Note::once(Rc::new(sample), 1.0, 1.0, Pan::identity(), 0));

        let buffer = run_buffer(&mut mixer);
        assert!(buffer.iter().all(|&v| v == 0));
        assert_eq!(mixer.note_count(), 0);
    }

    #[test]
    fn notes_stay_ordered_after_mixed_operations() {
        let mut mixer = Mixer::new(FRAMES);
        for t in [9000i64, 3000, 7000, 3000, 12000] {
            mixer.add_note(Note::once(impulse_sample(), 1.0, 1.0, Pan::identity(), t));
        }
        mixer.adjust_timebase(2500);
        let times: Vec<i64> = mixer.notes().map(|n| n.start_time).collect();
        let mut sorted = times.clone();
        sorted.sort_unstable();
        assert_eq!(times, sorted);
    }
}
