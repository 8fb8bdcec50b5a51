//! Mixing engine for the murmur soundscape engine.
//!
//! Owns the note queue and the per-buffer generation loop: channel-tree
//! volume/pan composition, linear-interpolation resampling with loop
//! playback, and fixed-point accumulation into a stereo sum buffer.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod frame;
mod mixer;
mod note;
mod queue;
mod ranges;

pub use frame::Frame;
pub use mixer::{Control, Mixer, TickFn};
pub use note::{Note, RemoveFn};
pub use queue::NoteQueue;
