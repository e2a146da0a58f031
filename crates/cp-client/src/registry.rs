//! Desired-topic registry.
//!
//! Holds the topics callers want, keyed by destination, and the live
//! subscription handle each one has on the current transport session.
//! After a reconnect every handle is invalidated and [`TopicRegistry::reconcile`]
//! hands out fresh ones for the topics still desired.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use cp_protocol::Topic;

/// STOMP subscription id (`sub-N`). Unique for the lifetime of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix("sub-")?.parse().ok().map(Self)
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A registry entry removed by [`TopicRegistry::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: Topic,
    /// Handle to release at the transport, if the topic was live.
    pub live: Option<SubscriptionId>,
}

#[derive(Debug, Default)]
pub(crate) struct TopicRegistry {
    entries: BTreeMap<String, Subscription>,
    by_id: HashMap<SubscriptionId, String>,
    next_id: u64,
}

impl TopicRegistry {
    /// Record a desired topic. Returns `false` if it is already present.
    pub fn insert(&mut self, topic: Topic) -> bool {
        if self.entries.contains_key(topic.destination()) {
            return false;
        }
        self.entries.insert(
            topic.destination().to_string(),
            Subscription { topic, live: None },
        );
        true
    }

    /// Forget a topic. `None` when it was not registered.
    pub fn remove(&mut self, destination: &str) -> Option<Subscription> {
        let removed = self.entries.remove(destination)?;
        if let Some(id) = removed.live {
            self.by_id.remove(&id);
        }
        Some(removed)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.entries.values().map(|s| s.topic.clone()).collect()
    }

    /// Give every desired topic without a live handle a fresh one.
    /// The caller sends one SUBSCRIBE per returned pair.
    pub fn reconcile(&mut self) -> Vec<(SubscriptionId, Topic)> {
        let mut fresh = Vec::new();
        for (destination, entry) in self.entries.iter_mut() {
            if entry.live.is_some() {
                continue;
            }
            let id = SubscriptionId(self.next_id);
            self.next_id += 1;
            entry.live = Some(id);
            self.by_id.insert(id, destination.clone());
            fresh.push((id, entry.topic.clone()));
        }
        fresh
    }

    /// The transport session ended; no handle survives it.
    pub fn invalidate(&mut self) {
        for entry in self.entries.values_mut() {
            entry.live = None;
        }
        self.by_id.clear();
    }

    /// Map the `subscription` header of an inbound MESSAGE to its topic.
    /// Released or stale handles resolve to `None`.
    pub fn resolve(&self, subscription: &str) -> Option<&Topic> {
        let id = SubscriptionId::parse(subscription)?;
        let destination = self.by_id.get(&id)?;
        self.entries.get(destination).map(|s| &s.topic)
    }

    /// Drop everything, returning the live handles to release.
    pub fn clear(&mut self) -> Vec<SubscriptionId> {
        let live = self.entries.values().filter_map(|s| s.live).collect();
        self.entries.clear();
        self.by_id.clear();
        live
    }
}

#[cfg(test)]
impl TopicRegistry {
    fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn live_count(&self) -> usize {
        self.by_id.len()
    }
}
