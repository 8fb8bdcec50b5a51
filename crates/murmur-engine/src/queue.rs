//! The note queue.
//!
//! Notes are kept in a list ordered by `start_time` ascending, stable
//! for equal keys, realised as an arena of slots chained by `next`
//! indices. Agents overwhelmingly schedule notes in non-decreasing time
//! order, so insertion keeps a hint to the most recently added note and
//! resumes scanning there when the new key is not earlier — making the
//! common case amortised O(1). Any structural removal drops the hint.

use alloc::vec::Vec;

use murmur_ir::{same_channel, ChannelHandle};

use crate::note::Note;

struct Slot {
    note: Option<Note>,
    next: Option<usize>,
}

/// Start-time-ordered queue of [`Note`]s.
#[derive(Default)]
pub struct NoteQueue {
    slots: Vec<Slot>,
    free: Vec<usize>,
    head: Option<usize>,
    last_added: Option<usize>,
    len: usize,
}

impl NoteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a note, keeping `start_time` order. Notes with equal start
    /// times keep their insertion order.
    pub fn push(&mut self, note: Note) {
        let start_time = note.start_time;
        let slot = self.alloc(note);

        // Resume from the hint when the new note is not earlier than the
        // last one added; otherwise rescan from the head.
        let mut prev = match self.last_added {
            Some(hint) if self.start_time_of(hint) <= start_time => Some(hint),
            _ => None,
        };
        let mut cursor = match prev {
            Some(p) => self.slots[p].next,
            None => self.head,
        };

        while let Some(idx) = cursor {
            if self.start_time_of(idx) > start_time {
                break;
            }
            prev = Some(idx);
            cursor = self.slots[idx].next;
        }

        self.slots[slot].next = cursor;
        match prev {
            Some(p) => self.slots[p].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.last_added = Some(slot);
        self.len += 1;
    }

    /// First note in time order.
    pub(crate) fn head(&self) -> Option<usize> {
        self.head
    }

    pub(crate) fn next_of(&self, idx: usize) -> Option<usize> {
        self.slots[idx].next
    }

    pub(crate) fn note(&self, idx: usize) -> &Note {
        self.slots[idx].note.as_ref().expect("occupied slot")
    }

    pub(crate) fn note_mut(&mut self, idx: usize) -> &mut Note {
        self.slots[idx].note.as_mut().expect("occupied slot")
    }

    /// Unlink and return the note following `prev` (the head when
    /// `prev` is `None`). O(1); invalidates the insertion hint.
    pub(crate) fn remove_after(&mut self, prev: Option<usize>) -> Note {
        let target = match prev {
            Some(p) => self.slots[p].next.expect("removal cursor"),
            None => self.head.expect("removal cursor"),
        };
        let after = self.slots[target].next;
        match prev {
            Some(p) => self.slots[p].next = after,
            None => self.head = after,
        }
        let note = self.slots[target].note.take().expect("occupied slot");
        self.slots[target].next = None;
        self.free.push(target);
        self.last_added = None;
        self.len -= 1;
        note
    }

    /// Drop every note whose channel is `channel` or sits below it in
    /// the channel tree. The notes' completion callbacks do not fire.
    /// Returns how many notes were removed.
    pub fn purge_channel(&mut self, channel: &ChannelHandle) -> usize {
        let mut removed = 0;
        let mut prev: Option<usize> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let doomed = match &self.note(idx).channel {
                Some(chan) => same_channel(chan, channel) || chan.has_ancestor(channel),
                None => false,
            };
            if doomed {
                drop(self.remove_after(prev));
                removed += 1;
                cursor = match prev {
                    Some(p) => self.slots[p].next,
                    None => self.head,
                };
            } else {
                prev = Some(idx);
                cursor = self.slots[idx].next;
            }
        }
        removed
    }

    /// Shift every queued start time down by `offset`, in one pass.
    pub fn adjust_timebase(&mut self, offset: i64) {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            self.note_mut(idx).start_time -= offset;
            cursor = self.slots[idx].next;
        }
    }

    /// Walk the queue in time order.
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        QueueIter {
            queue: self,
            cursor: self.head,
        }
    }

    fn alloc(&mut self, note: Note) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Slot {
                    note: Some(note),
                    next: None,
                };
                idx
            }
            None => {
                self.slots.push(Slot {
                    note: Some(note),
                    next: None,
                });
                self.slots.len() - 1
            }
        }
    }

    fn start_time_of(&self, idx: usize) -> i64 {
        self.note(idx).start_time
    }
}

struct QueueIter<'a> {
    queue: &'a NoteQueue,
    cursor: Option<usize>,
}

impl<'a> Iterator for QueueIter<'a> {
    type Item = &'a Note;

    fn next(&mut self) -> Option<&'a Note> {
        let idx = self.cursor?;
        self.cursor = self.queue.slots[idx].next;
        Some(self.queue.note(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use murmur_ir::{ChannelNode, Pan, Sample};

    fn note_at(start_time: i64) -> Note {
        let sample = Rc::new(Sample::from_frames("t", vec![0i16; 4], 1, 1.0, None));
        Note::once(sample, 1.0, 1.0, Pan::identity(), start_time)
    }

    fn times(queue: &NoteQueue) -> Vec<i64> {
        queue.iter().map(|n| n.start_time).collect()
    }

    #[test]
    fn push_keeps_time_order() {
        let mut queue = NoteQueue::new();
        for t in [10, 5, 20, 1, 15] {
            queue.push(note_at(t));
        }
        assert_eq!(times(&queue), vec![1, 5, 10, 15, 20]);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut queue = NoteQueue::new();
        let mut a = note_at(5);
        a.volume = 0.1;
        let mut b = note_at(5);
        b.volume = 0.2;
        queue.push(note_at(1));
        queue.push(a);
        queue.push(b);

        let volumes: Vec<f64> = queue.iter().map(|n| n.volume).collect();
        assert_eq!(volumes, vec![1.0, 0.1, 0.2]);
    }

    #[test]
    fn hint_survives_nondecreasing_inserts() {
        // Pushing in sorted order must still produce a sorted queue
        // (the hint path is the one exercised here).
        let mut queue = NoteQueue::new();
        for t in 0..100 {
            queue.push(note_at(t));
        }
        assert_eq!(times(&queue), (0..100).collect::<Vec<_>>());

        // An earlier note after many later ones falls back to a head scan.
        queue.push(note_at(-3));
        assert_eq!(queue.iter().next().unwrap().start_time, -3);
    }

    #[test]
    fn remove_after_unlinks_head_and_interior() {
        let mut queue = NoteQueue::new();
        for t in [1, 2, 3] {
            queue.push(note_at(t));
        }
        let head = queue.remove_after(None);
        assert_eq!(head.start_time, 1);
        let first = queue.head().unwrap();
        let interior = queue.remove_after(Some(first));
        assert_eq!(interior.start_time, 3);
        assert_eq!(times(&queue), vec![2]);
    }

    #[test]
    fn slots_are_reused() {
        let mut queue = NoteQueue::new();
        queue.push(note_at(1));
        queue.push(note_at(2));
        queue.remove_after(None);
        queue.push(note_at(3));
        assert_eq!(queue.slots.len(), 2);
        assert_eq!(times(&queue), vec![2, 3]);
    }

    #[test]
    fn purge_takes_subtree_only() {
        let root = ChannelNode::root();
        let doomed = ChannelNode::child(&root);
        let child_of_doomed = ChannelNode::child(&doomed);
        let spared = ChannelNode::child(&root);

        let mut queue = NoteQueue::new();
        let mut on_doomed = note_at(1);
        on_doomed.channel = Some(doomed.handle());
        let mut on_child = note_at(2);
        on_child.channel = Some(child_of_doomed.handle());
        let mut on_spared = note_at(3);
        on_spared.channel = Some(spared.handle());
        queue.push(on_doomed);
        queue.push(on_child);
        queue.push(on_spared);
        queue.push(note_at(4)); // channel-less

        assert_eq!(queue.purge_channel(&doomed.handle()), 2);
        assert_eq!(times(&queue), vec![3, 4]);
    }

    #[test]
    fn adjust_timebase_shifts_everything() {
        let mut queue = NoteQueue::new();
        for t in [100, 200, 300] {
            queue.push(note_at(t));
        }
        queue.adjust_timebase(50);
        assert_eq!(times(&queue), vec![50, 150, 250]);
    }
}
