//! Lifecycle notifications for tracing and monitoring.

/// Handle returned by `Dispatcher::add_observer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// What observers are told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEvent<'a> {
    /// A channel with a known destination opened.
    ChannelOpened { dst: &'a str },
    /// A channel with a known destination closed.
    ChannelClosed { dst: &'a str },
    /// A frame was serialized and is about to be offered to a channel.
    DispatchFrame { frame: &'a [u8] },
}

pub type Observer = Box<dyn FnMut(&DispatchEvent<'_>)>;

#[derive(Default)]
pub(crate) struct ObserverList {
    observers: Vec<(ObserverId, Observer)>,
    next_id: u64,
}

impl ObserverList {
    pub fn add(&mut self, observer: Observer) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        before != self.observers.len()
    }

    pub fn notify(&mut self, event: &DispatchEvent<'_>) {
        for (_, observer) in &mut self.observers {
            observer(event);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }
}
