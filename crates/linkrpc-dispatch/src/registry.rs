//! Registered channels and channel factories.

use crate::channel::{Channel, ChannelId, ChannelInfo};
use crate::destination::{dst_eq, DEFAULT_DST};

/// Builds a channel for a URI destination: `(scheme, canonical_uri, fragment)`.
pub type ChannelFactory = Box<dyn FnMut(&str, &str, &str) -> Option<Box<dyn Channel>>>;

pub(crate) struct ChannelEntry {
    pub id: ChannelId,
    pub dst: String,
    pub channel: Box<dyn Channel>,
    pub is_open: bool,
    pub is_busy: bool,
}

impl ChannelEntry {
    pub fn snapshot(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.id,
            channel_type: self.channel.channel_type().to_string(),
            info: self.channel.info(),
            dst: self.dst.clone(),
            is_open: self.is_open,
            is_busy: self.is_busy,
            is_persistent: self.channel.is_persistent(),
            is_broadcast_enabled: self.channel.is_broadcast_enabled(),
        }
    }

    pub fn can_send(&self) -> bool {
        self.is_open && !self.is_busy
    }
}

#[derive(Default)]
pub(crate) struct ChannelRegistry {
    entries: Vec<ChannelEntry>,
    next_id: u64,
}

impl ChannelRegistry {
    pub fn next_id(&mut self) -> ChannelId {
        self.next_id += 1;
        ChannelId(self.next_id)
    }

    pub fn insert(&mut self, entry: ChannelEntry) {
        self.entries.push(entry);
    }

    pub fn remove(&mut self, id: ChannelId) -> Option<ChannelEntry> {
        let pos = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// First channel whose destination equals `dst`.
    pub fn find_by_dst(&self, dst: &str) -> Option<ChannelId> {
        self.entries
            .iter()
            .find(|entry| dst_eq(dst, &entry.dst))
            .map(|entry| entry.id)
    }

    /// First channel registered under the default destination.
    pub fn default_channel(&self) -> Option<ChannelId> {
        self.entries
            .iter()
            .find(|entry| entry.dst == DEFAULT_DST)
            .map(|entry| entry.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ChannelEntry> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Channel factories keyed by lowercased URI scheme.
#[derive(Default)]
pub(crate) struct FactoryRegistry {
    factories: Vec<(String, ChannelFactory)>,
}

impl FactoryRegistry {
    /// Register a factory. A later registration for the same scheme replaces it.
    pub fn add(&mut self, scheme: &str, factory: ChannelFactory) {
        let scheme = scheme.to_ascii_lowercase();
        self.factories.retain(|(existing, _)| *existing != scheme);
        self.factories.push((scheme, factory));
    }

    pub fn get_mut(&mut self, scheme: &str) -> Option<&mut ChannelFactory> {
        self.factories
            .iter_mut()
            .find(|(existing, _)| existing == scheme)
            .map(|(_, factory)| factory)
    }

    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.factories.iter().map(|(scheme, _)| scheme.as_str())
    }
}
