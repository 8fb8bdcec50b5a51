//! Data model for the murmur soundscape engine.
//!
//! This crate defines the types shared between the mixing engine and its
//! embeddings: decoded PCM samples, stereo-field transforms, and the
//! channel-tree trait the mixer walks. It holds no playback state.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod sample;
mod stereo;

pub use channel::{
    same_channel, Channel, ChannelHandle, ChannelNode, StereoWindow, VolumeWindow,
};
pub use sample::{PcmFormat, Sample, SampleError};
pub use stereo::{point_gains, Pan};
