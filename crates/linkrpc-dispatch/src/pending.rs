//! Outgoing calls awaiting a reply, keyed by correlation id.

use std::collections::{HashMap, VecDeque};

use linkrpc_frame::FrameId;

/// Bounded table of pending requests.
///
/// Admission beyond capacity evicts the oldest entries and hands them back
/// so the caller can fail their callbacks.
pub(crate) struct PendingTable<C> {
    entries: HashMap<FrameId, C>,
    order: VecDeque<FrameId>,
    capacity: usize,
}

impl<C> PendingTable<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register `callback` under `id`, returning evicted entries oldest first.
    pub fn admit(&mut self, id: FrameId, callback: C) -> Vec<(FrameId, C)> {
        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(cb) = self.entries.remove(&oldest) {
                evicted.push((oldest, cb));
            }
        }
        self.order.push_back(id.clone());
        self.entries.insert(id, callback);
        evicted
    }

    /// Remove and return the entry for `id`.
    pub fn take(&mut self, id: &FrameId) -> Option<C> {
        let callback = self.entries.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(callback)
    }

    #[cfg(test)]
    fn contains(&self, id: &FrameId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
