//! murmur — demo soundscape CLI.
//!
//! Builds a small procedural scene (a looping drone behind periodic
//! chimes that wander across the stereo field) and plays or renders it.
//!
//! Usage:
//!   murmur --wav out.wav [--seconds N]
//!   murmur --raw out.raw [--seconds N] [-o key=value]...
//!   murmur --live [--seconds N]

use murmur_audio::{AudioError, AudioOutput, FileOutput, SinkOptions};
use murmur_engine::{Control, Mixer, Note};
use murmur_ir::{ChannelNode, Pan, Sample, StereoWindow, VolumeWindow};
use std::f64::consts::TAU;
use std::rc::Rc;
use std::{env, fs};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let seconds: f64 = flag_value(&args, "--seconds")
        .map(|s| {
            s.parse().unwrap_or_else(|_| {
                eprintln!("--seconds requires a number");
                std::process::exit(1);
            })
        })
        .unwrap_or(10.0);

    let extra: Vec<String> = args
        .windows(2)
        .filter(|pair| pair[0] == "-o")
        .map(|pair| pair[1].clone())
        .collect();
    let options = SinkOptions::parse(&extra);

    if let Some(path) = flag_value(&args, "--wav") {
        render_wav(&path, seconds);
    } else if let Some(path) = flag_value(&args, "--raw") {
        render_raw(&path, seconds, &options);
    } else if args.iter().any(|a| a == "--live") {
        play_live(seconds);
    } else {
        eprintln!("Usage: murmur --wav FILE | --raw FILE | --live [--seconds N] [-o key=value]");
        std::process::exit(1);
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn render_wav(path: &str, seconds: f64) {
    let sample_rate = 44100;
    let mut scene = Soundscape::new(sample_rate, seconds);
    let mut mixer = Mixer::new(4096);
    let mut tick =
        |mixer: &mut Mixer, time: i64| -> Result<Control, AudioError> { scene.tick(mixer, time) };

    let wav = murmur_master::render_to_wav(&mut mixer, &mut tick, sample_rate, seconds)
        .unwrap_or_else(|e| {
            eprintln!("Render failed: {}", e);
            std::process::exit(1);
        });
    fs::write(path, wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });
    println!("Wrote {} ({}s at {} fps)", path, seconds, sample_rate);
}

fn render_raw(path: &str, seconds: f64, options: &SinkOptions) {
    let mut options = options.clone();
    if options.get("time").is_none() {
        options.push("time", Some(&seconds.to_string()));
    }

    let mut sink = FileOutput::new(Some(path), None, true, &options).unwrap_or_else(|e| {
        eprintln!("Failed to open {}: {}", path, e);
        std::process::exit(1);
    });

    let mut scene = Soundscape::new(sink.sample_rate(), seconds);
    let mut mixer = Mixer::new(sink.frames_per_buffer());
    let mut tick =
        |mixer: &mut Mixer, time: i64| -> Result<Control, AudioError> { scene.tick(mixer, time) };

    if let Err(e) = sink.run(&mut mixer, &mut tick) {
        eprintln!("Playback failed: {}", e);
        std::process::exit(1);
    }
    sink.close().ok();
    println!("Wrote {}", path);
}

fn play_live(seconds: f64) {
    let playback = murmur_master::LivePlayback::spawn(move |sample_rate, frames_per_buffer| {
        let mut scene = Soundscape::new(sample_rate, seconds);
        let mixer = Mixer::new(frames_per_buffer);
        let tick = move |mixer: &mut Mixer, time: i64| scene.tick(mixer, time);
        (mixer, tick)
    });

    while !playback.is_finished() {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
}

/// The demo scene: a faded-in drone on the root channel plus a chime
/// every couple of seconds on a child channel that sweeps each chime
/// across the stereo field.
struct Soundscape {
    drone: Rc<Sample>,
    chime: Rc<Sample>,
    root: Rc<ChannelNode>,
    chimes: Rc<ChannelNode>,
    sample_rate: u32,
    end_time: i64,
    next_chime: i64,
    chime_count: u32,
    started: bool,
}

impl Soundscape {
    fn new(sample_rate: u32, seconds: f64) -> Self {
        let root = ChannelNode::root();
        let chimes = ChannelNode::child(&root);
        Self {
            drone: Rc::new(drone_sample(sample_rate)),
            chime: Rc::new(chime_sample(sample_rate)),
            root,
            chimes,
            sample_rate,
            end_time: (seconds * f64::from(sample_rate)) as i64,
            next_chime: sample_rate as i64 / 2,
            chime_count: 0,
            started: false,
        }
    }

    fn tick(&mut self, mixer: &mut Mixer, time: i64) -> Result<Control, AudioError> {
        if time >= self.end_time {
            return Ok(Control::Stop);
        }

        if !self.started {
            self.started = true;
            // Fade the whole scene in over the first two seconds.
            let fade_len = 2 * self.sample_rate as i64;
            self.root
                .set_volume(Some(VolumeWindow::fade(time, time + fade_len, 0.0, 0.8)));

            let mut drone = Note::with_duration(
                self.drone.clone(),
                1.0,
                0.6,
                Pan::identity(),
                time,
                self.end_time - time,
            );
            drone.channel = Some(self.root.handle());
            mixer.add_note(drone);
        }

        // Schedule the next chime once it falls within reach of this
        // buffer.
        let horizon = time + mixer.frames_per_buffer() as i64;
        while self.next_chime < horizon {
            let across = [-1.0, -0.3, 0.3, 1.0][(self.chime_count % 4) as usize];
            let sweep_len = self.sample_rate as i64;
            self.chimes.set_stereo(Some(StereoWindow::sweep(
                self.next_chime,
                self.next_chime + sweep_len,
                Pan::shift(across),
                Pan::shift(-across),
            )));

            let pitch = [1.0, 1.25, 1.5][(self.chime_count % 3) as usize];
            let mut note = Note::once(
                self.chime.clone(),
                pitch,
                0.9,
                Pan::identity(),
                self.next_chime,
            );
            note.channel = Some(self.chimes.handle());
            mixer.add_note(note);

            self.chime_count += 1;
            self.next_chime += 2 * self.sample_rate as i64;
        }

        Ok(Control::Continue)
    }
}

/// One second of a soft two-partial drone, loopable over its middle.
fn drone_sample(sample_rate: u32) -> Sample {
    let frames = sample_rate as usize;
    let mut data = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f64 / f64::from(sample_rate);
        let value = 6000.0 * (TAU * 55.0 * t).sin() + 3000.0 * (TAU * 110.5 * t).sin();
        data.push(value as i16);
    }
    // Loop the middle half of the tone.
    let loop_start = frames / 4;
    let loop_end = loop_start + frames / 2;
    Sample::from_frames("drone", data, 1, 1.0, Some((loop_start, loop_end)))
}

/// A short decaying bell tone.
fn chime_sample(sample_rate: u32) -> Sample {
    let frames = sample_rate as usize / 2;
    let mut data = Vec::with_capacity(frames);
    for i in 0..frames {
        let t = i as f64 / f64::from(sample_rate);
        let envelope = (-6.0 * t).exp();
        let value =
            envelope * (9000.0 * (TAU * 880.0 * t).sin() + 4000.0 * (TAU * 1320.0 * t).sin());
        data.push(value as i16);
    }
    Sample::from_frames("chime", data, 1, 1.0, None)
}
