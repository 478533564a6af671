//! In-process publish/subscribe for change events.
//!
//! Delivery is synchronous and follows registration order. The subscriber
//! list is snapshotted per publish so handlers run without holding the lock;
//! a per-subscriber `active` flag lets `unsubscribe` take effect for a
//! publish that is already walking the snapshot.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;

use livecfg_core::{ChangeEvent, EventKind, SourceId};

use crate::error::SubscriberError;

type Handler = Arc<dyn Fn(&ChangeEvent) -> Result<(), SubscriberError> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Which source identifiers a filter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePattern {
    /// `*`
    Any,
    Exact(SourceId),
    /// `prefix*`
    Prefix(String),
}

impl SourcePattern {
    pub fn matches(&self, source: &SourceId) -> bool {
        match self {
            SourcePattern::Any => true,
            SourcePattern::Exact(id) => id == source,
            SourcePattern::Prefix(prefix) => source.as_str().starts_with(prefix.as_str()),
        }
    }
}

impl From<&str> for SourcePattern {
    fn from(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some("") => SourcePattern::Any,
            Some(prefix) => SourcePattern::Prefix(prefix.to_string()),
            None => SourcePattern::Exact(SourceId::from(raw)),
        }
    }
}

impl FromStr for SourcePattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SourcePattern::from(s))
    }
}

impl fmt::Display for SourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourcePattern::Any => f.write_str("*"),
            SourcePattern::Exact(id) => write!(f, "{id}"),
            SourcePattern::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Source pattern plus an optional set of event kinds (`None` = every kind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub source: SourcePattern,
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self {
            source: SourcePattern::Any,
            kinds: None,
        }
    }

    pub fn for_source(id: impl Into<SourceId>) -> Self {
        Self {
            source: SourcePattern::Exact(id.into()),
            kinds: None,
        }
    }

    pub fn matching(pattern: impl Into<SourcePattern>) -> Self {
        Self {
            source: pattern.into(),
            kinds: None,
        }
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.source.matches(&event.source)
            && self
                .kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&event.kind))
    }
}

impl From<&str> for EventFilter {
    fn from(pattern: &str) -> Self {
        EventFilter::matching(pattern)
    }
}

/// Per-publish delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    handler: Handler,
    active: AtomicBool,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Vec<Arc<Subscriber>>>,
    next_id: AtomicU64,
}

/// Event router owned by an engine and shared with its sources.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let subscriber = Arc::new(Subscriber {
            id,
            filter: filter.into(),
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
        });
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        id
    }

    /// Subscribe with an unbounded channel instead of a callback.
    ///
    /// Dropping the receiver turns every later delivery into a subscriber
    /// failure until the subscription is removed.
    pub fn subscribe_channel(
        &self,
        filter: impl Into<EventFilter>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(filter, move |event| {
            tx.send(event.clone())
                .map_err(|_| SubscriberError::new("channel receiver dropped"))
        });
        (id, rx)
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    ///
    /// Once this returns, no publish that has not yet reached the subscriber
    /// will deliver to it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = subscribers.remove(index);
                removed.active.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    pub fn publish(&self, event: &ChangeEvent) -> Delivery {
        let snapshot: Vec<Arc<Subscriber>> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivery = Delivery::default();
        for subscriber in snapshot {
            if !subscriber.active.load(Ordering::SeqCst) || !subscriber.filter.matches(event) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (subscriber.handler)(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(err)) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        subscription = %subscriber.id,
                        source = %event.source,
                        kind = %event.kind,
                        error = %err,
                        "subscriber failed",
                    );
                }
                Err(panic) => {
                    delivery.failed += 1;
                    let err = SubscriberError::new(panic_message(panic.as_ref()));
                    tracing::warn!(
                        subscription = %subscriber.id,
                        source = %event.source,
                        kind = %event.kind,
                        error = %err,
                        "subscriber panicked",
                    );
                }
            }
        }
        delivery
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rstest::rstest;

    fn event(source: &str, kind: EventKind) -> ChangeEvent {
        ChangeEvent::new(SourceId::from(source), format!("/etc/{source}"), kind)
    }

    fn recorder(bus: &EventBus, filter: EventFilter) -> (SubscriptionId, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = bus.subscribe(filter, move |e: &ChangeEvent| {
            sink.lock().unwrap().push(format!("{}:{}", e.source, e.kind));
            Ok(())
        });
        (id, seen)
    }

    #[rstest]
    #[case("*", "anything", true)]
    #[case("app", "app", true)]
    #[case("app", "app2", false)]
    #[case("db.*", "db.primary", true)]
    #[case("db.*", "cache", false)]
    fn pattern_matching(#[case] pattern: &str, #[case] source: &str, #[case] expected: bool) {
        let pattern: SourcePattern = pattern.parse().unwrap();
        assert_eq!(pattern.matches(&SourceId::from(source)), expected);
    }

    #[test]
    fn pattern_display_round_trips() {
        for raw in ["*", "app", "db.*"] {
            assert_eq!(SourcePattern::from(raw).to_string(), raw);
        }
    }

    #[test]
    fn kind_filter_limits_delivery() {
        let bus = EventBus::new();
        let (_, seen) = recorder(
            &bus,
            EventFilter::all().kinds([EventKind::Deleted, EventKind::LoadFailed]),
        );
        bus.publish(&event("a", EventKind::Created));
        bus.publish(&event("a", EventKind::Deleted));
        assert_eq!(*seen.lock().unwrap(), vec!["a:DELETED"]);
    }

    #[test]
    fn delivers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            bus.subscribe(EventFilter::all(), move |_: &ChangeEvent| {
                order.lock().unwrap().push(n);
                Ok(())
            });
        }
        let delivery = bus.publish(&event("a", EventKind::Modified));
        assert_eq!(delivery.delivered, 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn failing_and_panicking_subscribers_do_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe(EventFilter::all(), |_: &ChangeEvent| Err("nope".into()));
        bus.subscribe(EventFilter::all(), |_: &ChangeEvent| -> Result<(), SubscriberError> {
            panic!("handler blew up")
        });
        let (_, seen) = recorder(&bus, EventFilter::all());

        let delivery = bus.publish(&event("a", EventKind::Created));
        assert_eq!(delivery, Delivery { delivered: 1, failed: 2 });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let (id, seen) = recorder(&bus, EventFilter::for_source("a"));
        bus.publish(&event("a", EventKind::Created));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&event("a", EventKind::Modified));
        assert_eq!(*seen.lock().unwrap(), vec!["a:CREATED"]);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn unsubscribe_from_inside_a_handler_skips_later_subscriber() {
        let bus = EventBus::new();
        let victim = Arc::new(Mutex::new(None::<SubscriptionId>));
        {
            let bus_for_handler = bus.clone();
            let victim = victim.clone();
            bus.subscribe(EventFilter::all(), move |_: &ChangeEvent| {
                if let Some(id) = *victim.lock().unwrap() {
                    bus_for_handler.unsubscribe(id);
                }
                Ok(())
            });
        }
        let (id, seen) = recorder(&bus, EventFilter::all());
        *victim.lock().unwrap() = Some(id);

        let delivery = bus.publish(&event("a", EventKind::Created));
        assert_eq!(delivery.delivered, 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_subscription_receives_clones() {
        let bus = EventBus::new();
        let (_, mut rx) = bus.subscribe_channel("a");
        bus.publish(&event("a", EventKind::Created).with_detail("x"));
        bus.publish(&event("b", EventKind::Created));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::Created);
        assert_eq!(received.detail.as_deref(), Some("x"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_channel_receiver_counts_as_failure() {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe_channel(EventFilter::all());
        drop(rx);
        let delivery = bus.publish(&event("a", EventKind::Created));
        assert_eq!(delivery, Delivery { delivered: 0, failed: 1 });
    }
}
