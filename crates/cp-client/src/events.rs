//! Typed events and listener fan-out.
//!
//! Listeners are kept per [`EventKind`] with set semantics keyed on the
//! `Arc` allocation: adding the same [`Listener`] twice registers it once,
//! and a single removal unregisters it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use cp_protocol::{CheckpointUpdate, GroupStatusUpdate, HelpQueueUpdate, TopicKind};

use crate::connection::ConnectionState;

/// Everything a listener can be handed.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Checkpoint(CheckpointUpdate),
    GroupStatus(GroupStatusUpdate),
    HelpQueue(HelpQueueUpdate),
    /// Raw payload from the legacy multiplexed topic.
    Generic(serde_json::Value),
    Status(ConnectionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Checkpoint,
    GroupStatus,
    HelpQueue,
    Generic,
    Status,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Checkpoint(_) => EventKind::Checkpoint,
            Self::GroupStatus(_) => EventKind::GroupStatus,
            Self::HelpQueue(_) => EventKind::HelpQueue,
            Self::Generic(_) => EventKind::Generic,
            Self::Status(_) => EventKind::Status,
        }
    }

    /// Decode a MESSAGE body according to the kind of topic it arrived on.
    pub fn decode(kind: TopicKind, body: &str) -> Result<Event, serde_json::Error> {
        let event = match kind {
            TopicKind::Checkpoint => Self::Checkpoint(serde_json::from_str(body)?),
            TopicKind::GroupStatus => Self::GroupStatus(serde_json::from_str(body)?),
            TopicKind::HelpQueue => Self::HelpQueue(serde_json::from_str(body)?),
            TopicKind::Legacy => Self::Generic(serde_json::from_str(body)?),
        };
        Ok(event)
    }
}

/// A registered callback. Identity is the `Arc` allocation.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Listener sets for every event kind.
#[derive(Default)]
pub(crate) struct Fanout {
    sets: RwLock<HashMap<EventKind, Vec<Listener>>>,
}

impl Fanout {
    /// Returns `false` when the listener was already registered for `kind`.
    pub fn add(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        let set = sets.entry(kind).or_default();
        if set.iter().any(|l| same_listener(l, listener)) {
            return false;
        }
        set.push(Arc::clone(listener));
        true
    }

    /// Returns `false` when the listener was not registered for `kind`.
    pub fn remove(&self, kind: EventKind, listener: &Listener) -> bool {
        let mut sets = self.sets.write().unwrap_or_else(PoisonError::into_inner);
        let Some(set) = sets.get_mut(&kind) else {
            return false;
        };
        let before = set.len();
        set.retain(|l| !same_listener(l, listener));
        before != set.len()
    }

    pub fn contains(&self, kind: EventKind, listener: &Listener) -> bool {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .is_some_and(|set| set.iter().any(|l| same_listener(l, listener)))
    }

    pub fn len(&self, kind: EventKind) -> usize {
        self.sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.sets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Deliver `event` to every listener of its kind and return how many
    /// ran to completion.
    ///
    /// Listeners run outside the lock on a snapshot, so they may add or
    /// remove listeners. One removed mid-delivery is skipped; a panicking
    /// listener is logged and does not stop delivery to the rest.
    pub fn dispatch(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Listener> = self
            .sets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        let mut delivered = 0;
        for listener in &snapshot {
            if !self.contains(kind, listener) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::warn!(?kind, "Listener panicked during delivery"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn counting() -> (Listener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let l = listener(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (l, count)
    }

    fn generic() -> Event {
        Event::Generic(serde_json::json!({"groupId": "g1"}))
    }

    #[test]
    fn test_add_twice_invokes_once() {
        let fanout = Fanout::default();
        let (l, count) = counting();
        assert!(fanout.add(EventKind::Generic, &l));
        assert!(!fanout.add(EventKind::Generic, &l));
        assert_eq!(fanout.len(EventKind::Generic), 1);

        fanout.dispatch(&generic());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_add_twice_remove_once_fully_removes() {
        let fanout = Fanout::default();
        let (l, count) = counting();
        fanout.add(EventKind::Generic, &l);
        fanout.add(EventKind::Generic, &l);
        assert!(fanout.remove(EventKind::Generic, &l));
        assert!(!fanout.remove(EventKind::Generic, &l));

        assert_eq!(fanout.dispatch(&generic()), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_kinds_are_separate() {
        let fanout = Fanout::default();
        let (l, count) = counting();
        fanout.add(EventKind::Checkpoint, &l);

        fanout.dispatch(&generic());
        fanout.dispatch(&Event::Status(ConnectionState::Connected));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!fanout.remove(EventKind::Generic, &l));
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let fanout = Fanout::default();
        let a = listener(|_| panic!("listener A exploded"));
        let (b, count) = counting();
        fanout.add(EventKind::Generic, &a);
        fanout.add(EventKind::Generic, &b);

        assert_eq!(fanout.dispatch(&generic()), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // A stays registered and B keeps receiving.
        fanout.dispatch(&generic());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_removal_during_dispatch() {
        let fanout = Arc::new(Fanout::default());
        let (b, count) = counting();
        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));

        // A removes itself and B while running.
        let a = {
            let fanout = Arc::clone(&fanout);
            let slot = Arc::clone(&slot);
            let b = Arc::clone(&b);
            listener(move |_| {
                if let Some(me) = slot.lock().unwrap().take() {
                    fanout.remove(EventKind::Generic, &me);
                }
                fanout.remove(EventKind::Generic, &b);
            })
        };
        *slot.lock().unwrap() = Some(Arc::clone(&a));
        fanout.add(EventKind::Generic, &a);
        fanout.add(EventKind::Generic, &b);

        assert_eq!(fanout.dispatch(&generic()), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(fanout.len(EventKind::Generic), 0);
    }

    #[test]
    fn test_clear() {
        let fanout = Fanout::default();
        let (l, count) = counting();
        fanout.add(EventKind::Status, &l);
        fanout.clear();
        fanout.dispatch(&Event::Status(ConnectionState::Reconnecting));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_decode_by_topic_kind() {
        let body = r#"{"labId":"l1","groupId":"g1","checkpointNumber":3,"status":"PASS","timestamp":"2024-01-01T00:00:00Z"}"#;
        let event = Event::decode(TopicKind::Checkpoint, body).unwrap();
        assert_eq!(event.kind(), EventKind::Checkpoint);

        assert!(Event::decode(TopicKind::GroupStatus, body).is_err());
        assert!(Event::decode(TopicKind::Checkpoint, "{not json").is_err());
        assert_eq!(
            Event::decode(TopicKind::Legacy, body).unwrap().kind(),
            EventKind::Generic
        );
    }
}
