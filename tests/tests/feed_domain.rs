mod common;
use cardfeed_core::feed::{FilterUpdate, SortBy};
use cardfeed_core::{ConnectionState, TimeDomain};
use cardfeed_proto::{CardOperation, LightCard, Severity, SubscriptionRequest};
use common::*;
use std::sync::Arc;

fn ids(cards: &[LightCard]) -> Vec<&str> { cards.iter().map(|c| c.id.as_str()).collect() }

#[test]
fn domain_boundary_uses_interval_intersection() {
    let domain = TimeDomain::new(100, 200);
    assert!(domain.contains(&LightCard::new("ends-inside", "1", 0, 50, Severity::Alarm).with_end_date(Some(150))));
    assert!(domain.contains(&LightCard::new("ends-on-start", "1", 0, 50, Severity::Alarm).with_end_date(Some(100))));
    assert!(domain.contains(&LightCard::new("starts-on-end", "1", 0, 200, Severity::Alarm)));
    assert!(!domain.contains(&LightCard::new("starts-after", "1", 0, 210, Severity::Alarm)));
    assert!(!domain.contains(&LightCard::new("ends-before", "1", 0, 50, Severity::Alarm).with_end_date(Some(99))));
    // no end date: open-ended forward
    assert!(domain.contains(&LightCard::new("open-ended", "1", 0, 50, Severity::Alarm)));
}

/// Cards streamed in end up in the feed once the business period is chosen, sorted by severity
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn streamed_cards_reach_the_feed_for_the_chosen_period() {
    let mut harness = Harness::new(0);
    harness.start_synchronized().await;

    harness.feed.set_business_domain(100, 200);
    assert_eq!(harness.next_post().await, SubscriptionRequest::BusinessPeriod { range_start: 100, range_end: 200 });
    assert_eq!(harness.feed.connection().loading_in_progress().get(), Some(true));

    for card in [
        LightCard::new("info", "1", 10, 50, Severity::Information).with_end_date(Some(150)),
        LightCard::new("late", "1", 20, 210, Severity::Alarm),
        LightCard::new("alarm", "1", 30, 50, Severity::Alarm),
    ] {
        harness.server.send_operation(&CardOperation::add(card));
    }
    harness.server.send_frame("OLD_CARDS_LOADING_END");
    tokio::time::timeout(std::time::Duration::from_secs(5), harness.feed.connection().loading_in_progress().wait_for(|l| (!l).then_some(())))
        .await
        .unwrap();
    settle().await;
    assert_eq!(ids(&harness.feed.feed().visible().get().unwrap()), ["alarm", "info"]);

    let before = harness.feed.feed().visible().get().unwrap();
    harness.feed.feed().set_sort_by(SortBy::StartDate);
    settle().await;
    let after = harness.feed.feed().visible().get().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));

    // the same period is not requested twice
    harness.feed.set_business_domain(120, 180);
    settle().await;
    assert_eq!(harness.server.posts().len(), 1);
    harness.feed.shutdown().await;
}

/// Filters and deletions keep the feed current without touching the store
#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn feed_follows_filters_and_deletions() {
    let mut harness = Harness::new(0);
    harness.start_synchronized().await;
    harness.server.send_operation(&CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
    harness.server.send_operation(&CardOperation::add(LightCard::new("B", "1", 10, 0, Severity::Compliant)));
    settle().await;
    assert_eq!(harness.feed.feed().visible().get().unwrap().len(), 2);

    harness.feed.feed().update_filter(FilterUpdate::Severity { active: true, severities: [Severity::Compliant].into_iter().collect() });
    settle().await;
    assert_eq!(ids(&harness.feed.feed().visible().get().unwrap()), ["B"]);

    harness.server.send_operation(&CardOperation::delete("B"));
    settle().await;
    assert!(harness.feed.feed().visible().get().unwrap().is_empty());
    assert_eq!(harness.store().len(), 1);
    assert_eq!(harness.feed.connection().connection_state().get(), Some(ConnectionState::Synchronized));
    harness.feed.shutdown().await;
}
