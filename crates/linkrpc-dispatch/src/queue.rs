//! Bounded FIFO of frames that could not be sent right away.

use std::collections::VecDeque;

use crate::channel::ChannelId;

/// A frame waiting for the channel it was resolved to.
///
/// Removing that channel drops the entry, so a dead link is never rebuilt
/// just to flush an old frame.
#[derive(Debug)]
pub(crate) struct QueueEntry {
    pub channel: ChannelId,
    /// Destination the frame was addressed to, for logs.
    pub dst: String,
    pub frame: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct OutgoingQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
}

impl OutgoingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest entries to make room.
    ///
    /// Returns the number of evicted entries, or `None` when queueing is
    /// disabled and the frame was not taken.
    pub fn enqueue(&mut self, entry: QueueEntry) -> Option<usize> {
        if self.capacity == 0 {
            return None;
        }
        let mut evicted = 0;
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        self.entries.push_back(entry);
        Some(evicted)
    }

    /// Take all entries out in FIFO order, for a drain pass.
    pub fn take_all(&mut self) -> VecDeque<QueueEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Put back entries a drain pass could not deliver.
    ///
    /// `kept` precedes anything enqueued during the pass. Capacity is
    /// re-applied, dropping the oldest.
    pub fn restore(&mut self, mut kept: VecDeque<QueueEntry>) {
        kept.append(&mut self.entries);
        while kept.len() > self.capacity {
            kept.pop_front();
        }
        self.entries = kept;
    }

    /// Drop entries bound to a channel.
    pub fn remove_channel(&mut self, id: ChannelId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.channel != id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn entry(channel: u64, frame: &[u8]) -> QueueEntry {
        QueueEntry {
            channel: ChannelId(channel),
            dst: "d".to_string(),
            frame: frame.to_vec(),
        }
    }

    fn frames(queue: &OutgoingQueue) -> Vec<Vec<u8>> {
        queue.iter().map(|e| e.frame.clone()).collect()
    }

    #[test]
    fn zero_capacity_refuses_frames() {
        let mut queue = OutgoingQueue::new(0);
        assert_eq!(queue.enqueue(entry(1, b"{}")), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut queue = OutgoingQueue::new(2);
        assert_eq!(queue.enqueue(entry(1, b"1")), Some(0));
        assert_eq!(queue.enqueue(entry(1, b"2")), Some(0));
        assert_eq!(queue.enqueue(entry(1, b"3")), Some(1));

        assert_eq!(frames(&queue), vec![b"2".to_vec(), b"3".to_vec()]);
    }

    #[test]
    fn restore_keeps_fifo_order_ahead_of_new_entries() {
        let mut queue = OutgoingQueue::new(3);
        queue.enqueue(entry(1, b"1"));
        queue.enqueue(entry(1, b"2"));

        let taken = queue.take_all();
        queue.enqueue(entry(1, b"3"));
        queue.restore(taken);

        assert_eq!(
            frames(&queue),
            vec![b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]
        );
    }

    #[test]
    fn remove_channel_drops_only_its_entries() {
        let mut queue = OutgoingQueue::new(4);
        queue.enqueue(entry(3, b"1"));
        queue.enqueue(entry(4, b"2"));
        queue.enqueue(entry(3, b"3"));

        assert_eq!(queue.remove_channel(ChannelId(3)), 2);
        assert_eq!(frames(&queue), vec![b"2".to_vec()]);
    }

    proptest! {
        #[test]
        fn length_never_exceeds_capacity_and_newest_survive(
            capacity in 0usize..8,
            count in 0usize..40,
        ) {
            let mut queue = OutgoingQueue::new(capacity);
            for i in 0..count {
                queue.enqueue(entry(1, i.to_string().as_bytes()));
                prop_assert!(queue.len() <= capacity);
            }

            let expected: Vec<Vec<u8>> = (count.saturating_sub(capacity)..count)
                .map(|i| i.to_string().into_bytes())
                .collect();
            prop_assert_eq!(frames(&queue), expected);
        }
    }
}
