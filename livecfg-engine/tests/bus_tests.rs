//! Event bus delivery under concurrent publishers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use livecfg_core::{ChangeEvent, EventKind, SourceId};
use livecfg_engine::{EventBus, EventFilter};

fn numbered(n: u64) -> ChangeEvent {
    ChangeEvent::new(SourceId::from("app"), "/etc/app.yaml", EventKind::Modified)
        .with_detail(n.to_string())
}

#[test]
fn no_delivery_after_unsubscribe_returns() {
    let bus = EventBus::new();
    let received = Arc::new(Mutex::new(Vec::<u64>::new()));
    let sink = received.clone();
    let id = bus.subscribe(EventFilter::all(), move |event| {
        let n = event
            .detail
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(u64::MAX);
        sink.lock().unwrap().push(n);
        Ok(())
    });

    let counter = Arc::new(AtomicU64::new(0));
    let running = Arc::new(AtomicBool::new(true));
    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let bus = bus.clone();
            let counter = counter.clone();
            let running = running.clone();
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    bus.publish(&numbered(n));
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(30));
    assert!(bus.unsubscribe(id));
    // Every number handed out from here on belongs to a publish that started
    // after unsubscribe returned.
    let boundary = counter.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(30));
    running.store(false, Ordering::SeqCst);
    for publisher in publishers {
        publisher.join().unwrap();
    }

    let received = received.lock().unwrap();
    assert!(!received.is_empty());
    assert!(counter.load(Ordering::SeqCst) > boundary);
    assert!(
        received.iter().all(|&n| n < boundary),
        "delivered an event published after unsubscribe"
    );
}

#[test]
fn subscribers_added_later_miss_earlier_events() {
    let bus = EventBus::new();
    bus.publish(&numbered(0));
    let (_, mut rx) = bus.subscribe_channel(EventFilter::all());
    bus.publish(&numbered(1));
    assert_eq!(rx.try_recv().unwrap().detail.as_deref(), Some("1"));
    assert!(rx.try_recv().is_err());
}
