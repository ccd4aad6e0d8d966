use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::types::ConnectivityState;

#[test]
fn test_new_bus_has_no_subscribers() {
    let bus = EventBus::new();
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn test_subscribe_increments_count() {
    let bus = EventBus::new();
    let _rx1 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 1);
    let _rx2 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);
}

#[test]
fn test_publish_delivers_to_multiple_subscribers() {
    let bus = EventBus::new();
    let rx1 = bus.subscribe();
    let rx2 = bus.subscribe();

    let delivered = bus.publish(Notification::RestartStarted);
    assert_eq!(delivered, 2);

    assert_eq!(rx1.try_recv().unwrap(), Notification::RestartStarted);
    assert_eq!(rx2.try_recv().unwrap(), Notification::RestartStarted);
}

#[test]
fn test_dropped_receiver_is_pruned() {
    let bus = EventBus::new();
    let rx1 = bus.subscribe();
    let rx2 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    drop(rx1);
    // Publish triggers pruning of disconnected senders.
    bus.publish(Notification::ShutdownStarted);
    assert_eq!(bus.subscriber_count(), 1);

    assert!(rx2.try_recv().is_ok());
}

#[test]
fn test_late_subscriber_misses_earlier_notifications() {
    let bus = EventBus::new();
    bus.publish(Notification::UpdateStarted);

    let rx = bus.subscribe();
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_publish_order_is_preserved() {
    let bus = EventBus::new();
    let rx = bus.subscribe();

    let states = [
        ConnectivityState::Disconnected,
        ConnectivityState::NoInternet,
        ConnectivityState::Connected,
    ];
    for state in states {
        bus.publish(Notification::ConnectivityChanged { state });
    }

    let received: Vec<_> = rx.try_iter().collect();
    let expected: Vec<_> = states
        .iter()
        .map(|s| Notification::ConnectivityChanged { state: *s })
        .collect();
    assert_eq!(received, expected);
}

#[test]
fn test_clone_shares_subscribers() {
    let bus = EventBus::new();
    let clone = bus.clone();
    let rx = bus.subscribe();

    clone.publish(Notification::PowerButtonPressed);
    assert_eq!(rx.try_recv().unwrap(), Notification::PowerButtonPressed);
}
