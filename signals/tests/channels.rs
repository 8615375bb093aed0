use cardfeed_signals::*;
mod common;
use common::change_watcher;
use std::time::Duration;

#[test]
fn late_listeners_of_latest_see_the_current_value_only_when_asked() {
    let status: Latest<&str> = Latest::new();
    status.set("open");

    let (replaying, check_replaying) = change_watcher();
    let (live, check_live) = change_watcher();
    let _a = status.listen_now(replaying);
    let _b = status.listen(live);
    status.set("close");

    assert_eq!(check_replaying(), ["open", "close"]);
    assert_eq!(check_live(), ["close"]);
}

#[test]
fn set_if_changed_skips_equal_values() {
    let state = Latest::with_value(1);
    let (watcher, check) = change_watcher();
    let _guard = state.listen(watcher);
    assert!(!state.set_if_changed(1));
    assert!(state.set_if_changed(2));
    assert_eq!(check(), [2]);
}

#[test]
fn dropping_the_guard_detaches_the_listener() {
    let deltas: Broadcast<u32> = Broadcast::new();
    let (watcher, check) = change_watcher();
    let guard = deltas.listen(watcher);
    deltas.send(1);
    drop(guard);
    deltas.send(2);
    assert_eq!(check(), [1]);
    assert_eq!(deltas.listener_count(), 0);
}

#[tokio::test]
async fn independent_subscribers_observe_the_same_sequence() {
    let deltas: Broadcast<&str> = Broadcast::new();
    let mut feed = deltas.subscribe();
    let mut counters = deltas.subscribe();
    for value in ["add A", "delete B", "ack C"] {
        deltas.send(value);
    }
    assert_eq!(feed.drain(), ["add A", "delete B", "ack C"]);
    assert_eq!(counters.recv().await, Some("add A"));
    assert_eq!(counters.drain(), ["delete B", "ack C"]);
}

#[tokio::test]
async fn one_shot_releases_waiters_once() {
    let init_done: OneShot<()> = OneShot::new();
    let waiter = {
        let init_done = init_done.clone();
        tokio::spawn(async move { init_done.wait().await })
    };
    tokio::task::yield_now().await;

    assert_eq!(init_done.set(()), Ok(()));
    assert_eq!(init_done.set(()), Err(()));
    tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();

    let (watcher, check) = change_watcher();
    assert!(init_done.listen(watcher).is_none());
    assert_eq!(check(), [()]);
}

#[tokio::test]
async fn wait_for_resolves_on_a_matching_value() {
    let state = Latest::with_value(0u32);
    let waiter = {
        let state = state.clone();
        tokio::spawn(async move { state.wait_for(|v| (*v >= 2).then_some(*v)).await })
    };
    tokio::task::yield_now().await;
    state.set(1);
    state.set(3);
    assert_eq!(tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap(), 3);
}
