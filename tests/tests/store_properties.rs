mod common;
use anyhow::{anyhow, Result};
use cardfeed_core::{ApplyOutcome, DeletedChildCard};
use cardfeed_proto::{CardId, CardOperation, LightCard, Severity};
use common::*;
use itertools::Itertools;

fn revision(uid: &str) -> CardOperation { CardOperation::add(LightCard::new("A", uid, 100, 0, Severity::Action).with_titles(format!("rev {uid}"), "")) }

/// Whatever order a replay batch arrives in, the store ends on the highest revision
#[test]
fn replay_batches_converge_in_any_order() {
    let batch = [revision("1"), revision("2"), revision("3"), revision("2"), revision("1")];
    for order in batch.iter().permutations(batch.len()) {
        let store = store();
        for operation in order {
            store.apply(operation.clone());
        }
        let card = store.light_card(&"A".into()).unwrap();
        assert_eq!(card.uid.as_str(), "3");
        assert_eq!(card.title_translated.as_deref(), Some("rev 3"));
        assert_eq!(store.len(), 1);
    }
}

#[test]
fn later_publish_date_wins_over_uid() {
    let store = store();
    store.apply(CardOperation::add(LightCard::new("A", "z", 100, 0, Severity::Action)));
    assert_eq!(store.apply(CardOperation::add(LightCard::new("A", "a", 200, 0, Severity::Action))), ApplyOutcome::Replaced);
    assert_eq!(store.apply(CardOperation::add(LightCard::new("A", "z", 100, 0, Severity::Action))), ApplyOutcome::Stale);
    assert_eq!(store.light_card(&"A".into()).unwrap().uid.as_str(), "a");
}

/// Deleting a child card reports its parent exactly once and leaves no trace in the next snapshot
#[test]
fn child_delete_is_reported_with_its_parent() -> Result<()> {
    let store = store();
    let mut deleted_children = store.deleted_child_cards().subscribe();
    store.apply(CardOperation::add(LightCard::new("P", "1", 10, 0, Severity::Action)));
    store.apply(CardOperation::add(LightCard::new("C", "1", 20, 0, Severity::Action).with_parent("P").with_publisher(USER_ENTITY)));
    assert_eq!(store.child_cards(&"P".into()).len(), 1);
    assert!(store.light_card(&"P".into()).unwrap().has_child_card_from_current_user_entity);

    store.apply(CardOperation::delete("C"));
    store.apply(CardOperation::delete("C"));

    assert_eq!(deleted_children.drain(), vec![DeletedChildCard { card_id: CardId::from("C"), parent_card_id: CardId::from("P") }]);
    store.publish_now();
    let snapshot = store.light_cards().get().ok_or_else(|| anyhow!("no snapshot published"))?;
    assert!(snapshot.iter().all(|c| c.id.as_str() != "C"));
    assert!(store.child_cards(&"P".into()).is_empty());
    let parent = store.light_card(&"P".into()).ok_or_else(|| anyhow!("parent card missing"))?;
    assert!(!parent.has_child_card_from_current_user_entity);
    Ok(())
}

/// The local read flag survives acknowledgement deltas but not a new revision
#[test]
fn read_flag_survives_acks_until_a_new_revision() {
    let store = store();
    store.apply(CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
    assert!(store.set_light_card_read(&"A".into(), true));

    store.apply(CardOperation::ack("A", "1", ["ENTITY2"]));
    let card = store.light_card(&"A".into()).unwrap();
    assert!(card.has_been_read);
    assert!(card.entities_acks.contains(&"ENTITY2".into()));

    store.apply(CardOperation::add(LightCard::new("A", "2", 20, 0, Severity::Alarm)));
    assert!(!store.light_card(&"A".into()).unwrap().has_been_read);

    store.apply(CardOperation::add(LightCard::new("A", "3", 30, 0, Severity::Alarm).with_read(true)));
    assert!(store.light_card(&"A".into()).unwrap().has_been_read);
}
