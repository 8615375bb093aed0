mod common;
use cardfeed_core::ConnectionState;
use cardfeed_proto::{CardOperation, LightCard, Severity, SubscriptionRequest};
use common::*;

/// A reconnect asks for everything published since two minutes before the last heartbeat
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn reconnect_replays_from_two_minutes_before_last_heartbeat() {
    let mut harness = Harness::new(1_000_000);
    harness.start_synchronized().await;
    assert_eq!(harness.feed.connection().last_heartbeat_received_at(), 1_000_000);

    harness.clock.set(1_030_000);
    harness.server.send_heartbeat_frame();
    harness.server.break_stream("connection reset by peer");
    harness.wait_for_state(ConnectionState::Reconnecting).await;

    harness.clock.set(1_400_000);
    harness.server.connect();
    harness.server.send_init();
    assert_eq!(harness.next_post().await, SubscriptionRequest::Recovery { updated_from: 1_030_000 - 120_000 });
    harness.feed.shutdown().await;
}

/// Replayed operations that were already applied leave no trace
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn replayed_add_is_not_notified_twice() {
    let mut harness = Harness::new(0);
    let mut new_cards = harness.store().new_light_cards().subscribe();
    harness.start_synchronized().await;

    let add = CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm));
    harness.server.send_operation(&add);
    settle().await;
    assert_eq!(harness.store().len(), 1);
    let mut snapshots = harness.store().light_cards().subscribe();

    harness.server.break_stream("timeout");
    harness.wait_for_state(ConnectionState::Reconnecting).await;
    harness.server.connect();
    harness.server.send_init();
    assert!(matches!(harness.next_post().await, SubscriptionRequest::Recovery { .. }));
    harness.server.send_operation(&add);
    settle().await;

    let cards = harness.store().light_cards().get().unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].uid.as_str(), "1");
    assert_eq!(new_cards.drain().len(), 1);
    assert!(snapshots.drain().is_empty(), "a duplicate must not republish the card list");
    harness.feed.shutdown().await;
}

/// Config reload channels fire after a recovery, not after the first synchronization
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn recovery_asks_for_configuration_reload() {
    let mut harness = Harness::new(0);
    let mut business = harness.feed.connection().channels().business_config_changes.subscribe();
    let mut user = harness.feed.connection().channels().user_config_changes.subscribe();
    harness.start_synchronized().await;
    assert!(business.try_recv().is_none());

    harness.server.break_stream("gone");
    harness.wait_for_state(ConnectionState::Reconnecting).await;
    harness.server.connect();
    harness.server.send_init();
    harness.next_post().await;
    assert_eq!(business.drain().len(), 1);
    assert_eq!(user.drain().len(), 1);
    harness.feed.shutdown().await;
}

/// A failing replay request is only logged: the subscription stays up
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn failed_replay_request_keeps_the_stream() {
    let mut harness = Harness::new(0);
    harness.start_synchronized().await;
    harness.server.fail_posts(true);

    harness.server.break_stream("gone");
    harness.wait_for_state(ConnectionState::Reconnecting).await;
    harness.server.connect();
    harness.server.send_init();
    harness.next_post().await;

    harness.server.send_operation(&CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
    settle().await;
    assert_eq!(harness.store().len(), 1);
    assert_eq!(harness.feed.connection().connection_state().get(), Some(ConnectionState::Synchronized));
    harness.feed.shutdown().await;
}
