//! Channel tree.
//!
//! Channels form a tree; every note belongs to at most one channel, and
//! the mixer walks from that channel to the root composing volume and
//! stereo state. The mixer does not own channels — the embedding does —
//! so the seam is a trait: a channel only has to answer four questions.
//! [`ChannelNode`] is a ready-made implementation for embeddings that
//! don't need anything fancier.
//!
//! Both windows are time-parameterised: a channel fading or panning over
//! time reports the whole transition, and the mixer slices out whatever
//! part overlaps the buffer being generated. A channel holding a constant
//! value reports a window that ended in the past.

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::stereo::Pan;

/// A linear volume fade: `from` at `start`, `to` at `end`, constant
/// outside the interval. Times are absolute frame times.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeWindow {
    pub start: i64,
    pub end: i64,
    pub from: f64,
    pub to: f64,
}

impl VolumeWindow {
    /// A volume that has always been `value` (the window ended before
    /// any playable time).
    pub const fn constant(value: f64) -> Self {
        Self {
            start: 0,
            end: 0,
            from: value,
            to: value,
        }
    }

    /// A fade from `from` to `to` over `[start, end]`.
    pub const fn fade(start: i64, end: i64, from: f64, to: f64) -> Self {
        Self {
            start,
            end,
            from,
            to,
        }
    }
}

/// A stereo transition: pan transform `from` at `start`, `to` at `end`,
/// constant outside the interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StereoWindow {
    pub start: i64,
    pub end: i64,
    pub from: Pan,
    pub to: Pan,
}

impl StereoWindow {
    /// A pan that has always been `pan`.
    pub const fn constant(pan: Pan) -> Self {
        Self {
            start: 0,
            end: 0,
            from: pan,
            to: pan,
        }
    }

    /// A swoop from one transform to another over `[start, end]`.
    pub const fn sweep(start: i64, end: i64, from: Pan, to: Pan) -> Self {
        Self {
            start,
            end,
            from,
            to,
        }
    }
}

/// What the mixer needs from a channel. Returning `None` from either
/// window reads as unity volume / identity pan — an embedding with a
/// malformed or missing attribute simply answers `None` and the walk
/// continues.
pub trait Channel {
    fn volume_window(&self) -> Option<VolumeWindow>;
    fn stereo_window(&self) -> Option<StereoWindow>;
    fn parent(&self) -> Option<ChannelHandle>;
    /// True if `other` appears strictly above this channel in the tree.
    fn has_ancestor(&self, other: &ChannelHandle) -> bool;
}

/// Shared handle to a channel. Handle identity is pointer identity.
pub type ChannelHandle = Rc<dyn Channel>;

/// Whether two handles refer to the same channel object.
pub fn same_channel(a: &ChannelHandle, b: &ChannelHandle) -> bool {
    Rc::ptr_eq(a, b)
}

/// A concrete channel-tree node with interior-mutable volume and stereo
/// state. The embedding (or a test) mutates windows between buffers;
/// the mixer reads them during the walk.
pub struct ChannelNode {
    parent: Option<ChannelHandle>,
    volume: RefCell<Option<VolumeWindow>>,
    stereo: RefCell<Option<StereoWindow>>,
}

impl ChannelNode {
    /// A root channel with no volume or stereo state.
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            parent: None,
            volume: RefCell::new(None),
            stereo: RefCell::new(None),
        })
    }

    /// A child of `parent`.
    pub fn child(parent: &Rc<Self>) -> Rc<Self> {
        let parent: ChannelHandle = parent.clone();
        Rc::new(Self {
            parent: Some(parent),
            volume: RefCell::new(None),
            stereo: RefCell::new(None),
        })
    }

    /// Upcast to the handle type the mixer stores.
    pub fn handle(self: &Rc<Self>) -> ChannelHandle {
        self.clone()
    }

    pub fn set_volume(&self, window: Option<VolumeWindow>) {
        *self.volume.borrow_mut() = window;
    }

    pub fn set_stereo(&self, window: Option<StereoWindow>) {
        *self.stereo.borrow_mut() = window;
    }
}

impl Channel for ChannelNode {
    fn volume_window(&self) -> Option<VolumeWindow> {
        *self.volume.borrow()
    }

    fn stereo_window(&self) -> Option<StereoWindow> {
        *self.stereo.borrow()
    }

    fn parent(&self) -> Option<ChannelHandle> {
        self.parent.clone()
    }

    fn has_ancestor(&self, other: &ChannelHandle) -> bool {
        let mut cursor = self.parent.clone();
        while let Some(chan) = cursor {
            if same_channel(&chan, other) {
                return true;
            }
            cursor = chan.parent();
        }
        false
    }
}
