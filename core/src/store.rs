mod publisher;

use cardfeed_proto::{AckKind, CardAction, CardId, CardOperation, CardUid, EntityId, LightCard};
use cardfeed_signals::{Broadcast, Latest};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::FeedConfig;
use crate::perimeter::Perimeter;
use crate::timer::BackgroundTask;
use crate::{action_debug, action_info};
use publisher::SnapshotPublisher;

/// Emitted when a child card goes away
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedChildCard {
    pub card_id: CardId,
    pub parent_card_id: CardId,
}

/// Minimal delta for an acknowledgement change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedAck {
    pub card_uid: CardUid,
    pub entities_acks: Vec<EntityId>,
    pub operation: AckKind,
}

/// What applying one operation did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Replaced,
    Removed,
    AcksChanged,
    /// The operation was not newer than what the store holds
    Stale,
    /// The operation targets a card the store does not know
    Unknown,
}

/// Keyed store of the current revision of every light card, top level and children.
///
/// Operations are applied one at a time under a briefly held lock; every emission happens after the
/// lock is released, in the order the changes were made.
#[derive(Clone)]
pub struct LightCardStore(Arc<Inner>);

struct Inner {
    perimeter: Arc<dyn Perimeter>,
    config: FeedConfig,
    state: Mutex<State>,

    changes: Broadcast<()>,
    new_light_cards: Broadcast<LightCard>,
    new_light_child_cards: Broadcast<LightCard>,
    deleted_cards: Broadcast<CardId>,
    deleted_child_cards: Broadcast<DeletedChildCard>,
    received_acks: Broadcast<ReceivedAck>,
    light_cards: Latest<Arc<Vec<LightCard>>>,
    publisher: Mutex<Option<BackgroundTask>>,
}

#[derive(Default)]
struct State {
    cards: BTreeMap<CardId, LightCard>,
    /// Child cards keyed by parent id, at most one per child id
    children: BTreeMap<CardId, Vec<LightCard>>,
    /// Parents that received a child from one of the user's entities before they arrived themselves
    orphaned: BTreeSet<CardId>,
}

enum Emission {
    NewCard(LightCard),
    NewChild(LightCard),
    DeletedCard(CardId),
    DeletedChild(DeletedChildCard),
    Ack(ReceivedAck),
}

impl std::fmt::Display for LightCardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "LightCardStore") }
}

impl LightCardStore {
    pub fn new(perimeter: Arc<dyn Perimeter>, config: FeedConfig) -> Self {
        Self(Arc::new(Inner {
            perimeter,
            config,
            state: Mutex::new(State::default()),
            changes: Broadcast::new(),
            new_light_cards: Broadcast::new(),
            new_light_child_cards: Broadcast::new(),
            deleted_cards: Broadcast::new(),
            deleted_child_cards: Broadcast::new(),
            received_acks: Broadcast::new(),
            light_cards: Latest::with_value(Arc::new(Vec::new())),
            publisher: Mutex::new(None),
        }))
    }

    fn state(&self) -> MutexGuard<'_, State> { self.0.state.lock().unwrap_or_else(|p| p.into_inner()) }

    /// Start publishing rate-limited snapshots on [`LightCardStore::light_cards`]. Idempotent.
    pub fn start_publishing(&self) {
        let mut publisher = self.0.publisher.lock().unwrap_or_else(|p| p.into_inner());
        if publisher.as_ref().is_some_and(|p| !p.is_stopped()) {
            return;
        }
        *publisher = Some(SnapshotPublisher::new(self.clone(), &self.0.config).spawn());
    }

    pub fn stop_publishing(&self) {
        if let Some(publisher) = self.0.publisher.lock().unwrap_or_else(|p| p.into_inner()).take() {
            publisher.stop();
        }
    }

    /// Apply one operation from the subscription
    pub fn apply(&self, operation: CardOperation) -> ApplyOutcome {
        let mut emissions = Vec::new();
        let outcome = {
            let mut state = self.state();
            match operation {
                CardOperation::Add { card } | CardOperation::Update { card } => self.add_or_update(&mut state, card, &mut emissions),
                CardOperation::Delete { card_id } => self.remove(&mut state, &card_id, &mut emissions),
                CardOperation::Ack { card_id, card_uid, entities_acks } => {
                    self.change_acks(&mut state, card_id, card_uid, entities_acks, AckKind::Ack, &mut emissions)
                }
                CardOperation::Unack { card_id, card_uid, entities_acks } => {
                    self.change_acks(&mut state, card_id, card_uid, entities_acks, AckKind::Unack, &mut emissions)
                }
            }
        };

        match outcome {
            ApplyOutcome::Stale | ApplyOutcome::Unknown => action_debug!(self, "ignored", "{outcome:?}"),
            _ => action_info!(self, "applied", "{outcome:?}"),
        }
        self.emit(emissions, !matches!(outcome, ApplyOutcome::Stale | ApplyOutcome::Unknown));
        outcome
    }

    fn emit(&self, emissions: Vec<Emission>, changed: bool) {
        for emission in emissions {
            match emission {
                Emission::NewCard(card) => self.0.new_light_cards.send(card),
                Emission::NewChild(card) => self.0.new_light_child_cards.send(card),
                Emission::DeletedCard(id) => self.0.deleted_cards.send(id),
                Emission::DeletedChild(deleted) => self.0.deleted_child_cards.send(deleted),
                Emission::Ack(ack) => self.0.received_acks.send(ack),
            }
        }
        if changed {
            self.0.changes.send(());
        }
    }

    fn add_or_update(&self, state: &mut State, card: LightCard, emissions: &mut Vec<Emission>) -> ApplyOutcome {
        match card.parent_card_id.clone() {
            Some(parent_id) => self.add_child(state, parent_id, card, emissions),
            None => self.add_parent(state, card, emissions),
        }
    }

    fn add_parent(&self, state: &mut State, mut card: LightCard, emissions: &mut Vec<Emission>) -> ApplyOutcome {
        let existing = state.cards.get(&card.id);
        if let Some(existing) = existing {
            if !existing.is_superseded_by(&card) {
                action_debug!(self, "stale revision", "{card} (holding {})", existing.uid);
                return ApplyOutcome::Stale;
            }
        }

        card.has_child_card_from_current_user_entity = match existing {
            Some(previous) => card.has_action(CardAction::KeepChildCards) && previous.has_child_card_from_current_user_entity,
            None => state.orphaned.remove(&card.id),
        };
        let outcome = if existing.is_some() { ApplyOutcome::Replaced } else { ApplyOutcome::Inserted };

        card.has_been_read = Self::read_with_children(state, &card);
        card.has_been_acknowledged = self.acknowledged_with_children(state, &card);
        state.cards.insert(card.id.clone(), card.clone());
        emissions.push(Emission::NewCard(card));
        outcome
    }

    fn add_child(&self, state: &mut State, parent_id: CardId, child: LightCard, emissions: &mut Vec<Emission>) -> ApplyOutcome {
        let siblings = state.children.entry(parent_id.clone()).or_default();
        let outcome = match siblings.iter().position(|c| c.id == child.id) {
            Some(index) if !siblings[index].is_superseded_by(&child) => {
                action_debug!(self, "stale child revision", "{child}");
                return ApplyOutcome::Stale;
            }
            Some(index) => {
                siblings[index] = child.clone();
                ApplyOutcome::Replaced
            }
            None => {
                siblings.push(child.clone());
                ApplyOutcome::Inserted
            }
        };

        let perimeter = &self.0.perimeter;
        let from_user_entity = perimeter.is_from_user_entity(&child);
        match state.cards.get_mut(&parent_id) {
            Some(parent) => {
                if child.has_action(CardAction::PropagateReadAckToParentCard) {
                    if !child.has_been_read {
                        parent.has_been_read = false;
                    }
                    if !perimeter.has_been_acknowledged(&child) {
                        parent.has_been_acknowledged = false;
                        parent.has_been_acknowledged = perimeter.has_been_acknowledged(parent);
                    }
                }
                if from_user_entity {
                    parent.has_child_card_from_current_user_entity = true;
                }
            }
            None if from_user_entity => {
                state.orphaned.insert(parent_id);
            }
            None => {}
        }

        emissions.push(Emission::NewChild(child));
        outcome
    }

    fn remove(&self, state: &mut State, card_id: &CardId, emissions: &mut Vec<Emission>) -> ApplyOutcome {
        if state.cards.remove(card_id).is_some() {
            state.children.remove(card_id);
            emissions.push(Emission::DeletedCard(card_id.clone()));
            return ApplyOutcome::Removed;
        }

        let found = state.children.iter_mut().find_map(|(parent_id, siblings)| {
            let index = siblings.iter().position(|c| &c.id == card_id)?;
            let removed = siblings.remove(index);
            Some((parent_id.clone(), removed))
        });
        let Some((parent_id, removed)) = found else {
            return ApplyOutcome::Unknown;
        };

        let perimeter = &self.0.perimeter;
        if perimeter.is_from_user_entity(&removed) {
            let remaining = state.children.get(&parent_id).is_some_and(|s| s.iter().any(|c| perimeter.is_from_user_entity(c)));
            if !remaining {
                match state.cards.get_mut(&parent_id) {
                    Some(parent) => parent.has_child_card_from_current_user_entity = false,
                    None => {
                        state.orphaned.remove(&parent_id);
                    }
                }
            }
        }
        if state.children.get(&parent_id).is_some_and(|s| s.is_empty()) {
            state.children.remove(&parent_id);
        }
        emissions.push(Emission::DeletedChild(DeletedChildCard { card_id: card_id.clone(), parent_card_id: parent_id }));
        ApplyOutcome::Removed
    }

    /// Acks target a revision: the card is looked up by id when given, but only matches if its uid does
    fn change_acks(
        &self,
        state: &mut State,
        card_id: Option<CardId>,
        card_uid: CardUid,
        entities: Vec<EntityId>,
        kind: AckKind,
        emissions: &mut Vec<Emission>,
    ) -> ApplyOutcome {
        emissions.push(Emission::Ack(ReceivedAck { card_uid: card_uid.clone(), entities_acks: entities.clone(), operation: kind }));

        let top_level = match &card_id {
            Some(id) => state.cards.get(id).filter(|c| c.uid == card_uid).map(|c| c.id.clone()),
            None => state.cards.values().find(|c| c.uid == card_uid).map(|c| c.id.clone()),
        };
        if let Some(id) = top_level {
            let Some(mut card) = state.cards.get(&id).cloned() else {
                return ApplyOutcome::Unknown;
            };
            Self::mutate_acks(&mut card, &entities, kind);
            card.has_been_acknowledged = false;
            card.has_been_acknowledged = self.acknowledged_with_children(state, &card);
            state.cards.insert(id, card);
            return ApplyOutcome::AcksChanged;
        }

        let child = state.children.iter_mut().find_map(|(parent_id, siblings)| {
            let child = siblings.iter_mut().find(|c| c.uid == card_uid)?;
            Self::mutate_acks(child, &entities, kind);
            Some((parent_id.clone(), child.has_action(CardAction::PropagateReadAckToParentCard)))
        });
        match child {
            Some((parent_id, propagates)) => {
                if propagates {
                    if let Some(mut parent) = state.cards.get(&parent_id).cloned() {
                        parent.has_been_acknowledged = false;
                        parent.has_been_acknowledged = self.acknowledged_with_children(state, &parent);
                        state.cards.insert(parent_id, parent);
                    }
                }
                ApplyOutcome::AcksChanged
            }
            None => ApplyOutcome::Unknown,
        }
    }

    fn mutate_acks(card: &mut LightCard, entities: &[EntityId], kind: AckKind) {
        match kind {
            AckKind::Ack => card.entities_acks.extend(entities.iter().cloned()),
            AckKind::Unack => {
                for entity in entities {
                    card.entities_acks.remove(entity);
                }
            }
        }
    }

    fn propagating_children<'a>(state: &'a State, card: &LightCard) -> impl Iterator<Item = &'a LightCard> {
        state.children.get(&card.id).into_iter().flatten().filter(|c| c.has_action(CardAction::PropagateReadAckToParentCard))
    }

    fn read_with_children(state: &State, card: &LightCard) -> bool {
        card.has_been_read && Self::propagating_children(state, card).all(|c| c.has_been_read)
    }

    fn acknowledged_with_children(&self, state: &State, card: &LightCard) -> bool {
        let perimeter = &self.0.perimeter;
        perimeter.has_been_acknowledged(card) && Self::propagating_children(state, card).all(|c| perimeter.has_been_acknowledged(c))
    }

    /// Mark a top-level card read or unread locally. False if the card is unknown.
    pub fn set_light_card_read(&self, id: &CardId, read: bool) -> bool {
        let updated = match self.state().cards.get_mut(id) {
            Some(card) => {
                card.has_been_read = read;
                true
            }
            None => false,
        };
        if updated {
            self.0.changes.send(());
        }
        updated
    }

    /// Set the user acknowledgement of a top-level card, then re-derive it from the entity acks
    pub fn set_light_card_acknowledgment(&self, id: &CardId, acknowledged: bool) -> bool {
        let updated = {
            let mut state = self.state();
            match state.cards.get_mut(id) {
                Some(card) => {
                    card.has_been_acknowledged = acknowledged;
                    card.has_been_acknowledged = self.0.perimeter.has_been_acknowledged(card);
                    true
                }
                None => false,
            }
        };
        if updated {
            self.0.changes.send(());
        }
        updated
    }

    /// Read, taking children that propagate their read state into account
    pub fn is_light_card_has_been_read(&self, card: &LightCard) -> bool { Self::read_with_children(&self.state(), card) }

    pub fn light_card(&self, id: &CardId) -> Option<LightCard> { self.state().cards.get(id).cloned() }

    pub fn child_cards(&self, parent_id: &CardId) -> Vec<LightCard> { self.state().children.get(parent_id).cloned().unwrap_or_default() }

    /// Current top-level cards, ordered by id
    pub fn snapshot(&self) -> Vec<LightCard> { self.state().cards.values().cloned().collect() }

    pub fn len(&self) -> usize { self.state().cards.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drop every card. Subscribers get an empty snapshot right away.
    pub fn reset(&self) {
        {
            let mut state = self.state();
            *state = State::default();
        }
        action_info!(self, "reset");
        self.0.changes.send(());
        self.publish_now();
    }

    /// Publish the current snapshot without waiting for the rate limiter
    pub fn publish_now(&self) { self.0.light_cards.set(Arc::new(self.snapshot())); }

    /// Rate-limited snapshots of the top-level cards
    pub fn light_cards(&self) -> &Latest<Arc<Vec<LightCard>>> { &self.0.light_cards }

    /// Fires on every change, before rate limiting
    pub fn changes(&self) -> &Broadcast<()> { &self.0.changes }

    pub fn new_light_cards(&self) -> &Broadcast<LightCard> { &self.0.new_light_cards }

    pub fn new_light_child_cards(&self) -> &Broadcast<LightCard> { &self.0.new_light_child_cards }

    pub fn deleted_cards(&self) -> &Broadcast<CardId> { &self.0.deleted_cards }

    pub fn deleted_child_cards(&self) -> &Broadcast<DeletedChildCard> { &self.0.deleted_child_cards }

    pub fn received_acks(&self) -> &Broadcast<ReceivedAck> { &self.0.received_acks }
}
