use async_trait::async_trait;
use cardfeed_proto::{Card, CardId};
use cardfeed_signals::{Broadcast, Latest, ListenerGuard};
use std::sync::Arc;

use crate::error::LoadError;
use crate::store::LightCardStore;

/// Fetches full card bodies for the detail view
#[async_trait]
pub trait CardLoader: Send + Sync {
    async fn load_card(&self, id: &CardId) -> Result<Card, LoadError>;
}

/// The card currently opened in the detail view.
///
/// Re-signals the selection when a new revision of the selected card arrives, and reports its
/// deletion.
pub struct SelectedCard {
    selected: Latest<Option<CardId>>,
    deletions: Broadcast<CardId>,
    _guards: (ListenerGuard<cardfeed_proto::LightCard>, ListenerGuard<CardId>),
}

impl SelectedCard {
    pub fn new(store: &LightCardStore) -> Self {
        let selected: Latest<Option<CardId>> = Latest::with_value(None);
        let deletions = Broadcast::new();

        let revisions = {
            let selected = selected.clone();
            store.new_light_cards().listen(move |card: cardfeed_proto::LightCard| {
                if selected.with(|current| current.and_then(Option::as_ref) == Some(&card.id)) {
                    selected.set(Some(card.id));
                }
            })
        };
        let deleted = {
            let selected = selected.clone();
            let deletions = deletions.clone();
            store.deleted_cards().listen(move |id: CardId| {
                if selected.with(|current| current.and_then(Option::as_ref) == Some(&id)) {
                    deletions.send(id);
                }
            })
        };

        Self { selected, deletions, _guards: (revisions, deleted) }
    }

    pub fn select(&self, id: Option<CardId>) { self.selected.set(id) }

    pub fn selected_id(&self) -> Option<CardId> { self.selected.get().flatten() }

    /// The selection, re-sent each time the selected card gets a new revision
    pub fn changes(&self) -> &Latest<Option<CardId>> { &self.selected }

    /// Ids of selected cards that were deleted
    pub fn deletions(&self) -> &Broadcast<CardId> { &self.deletions }

    /// Load the full body of the selected card
    pub async fn hydrate(&self, loader: &dyn CardLoader) -> Result<Card, LoadError> {
        let id = self.selected_id().ok_or(LoadError::NothingSelected)?;
        loader.load_card(&id).await
    }
}

/// Serves cards from a fixed map, for tests and demos
#[derive(Debug, Default, Clone)]
pub struct StaticCardLoader(Arc<std::collections::HashMap<CardId, Card>>);

impl StaticCardLoader {
    pub fn new(cards: impl IntoIterator<Item = Card>) -> Self { Self(Arc::new(cards.into_iter().map(|c| (c.summary.id.clone(), c)).collect())) }
}

#[async_trait]
impl CardLoader for StaticCardLoader {
    async fn load_card(&self, id: &CardId) -> Result<Card, LoadError> { self.0.get(id).cloned().ok_or_else(|| LoadError::NotFound(id.clone())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;
    use crate::perimeter::StaticPerimeter;
    use cardfeed_proto::{CardOperation, LightCard, Severity};

    fn store() -> LightCardStore { LightCardStore::new(Arc::new(StaticPerimeter::allow_all(["ENTITY1"])), FeedConfig::default()) }

    #[test]
    fn new_revision_of_selected_card_resignals() {
        let store = store();
        let selection = SelectedCard::new(&store);
        store.apply(CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
        selection.select(Some("A".into()));

        let mut changes = selection.changes().subscribe();
        store.apply(CardOperation::add(LightCard::new("B", "1", 10, 0, Severity::Alarm)));
        store.apply(CardOperation::add(LightCard::new("A", "2", 20, 0, Severity::Alarm)));
        assert_eq!(changes.drain(), vec![Some(CardId::from("A"))]);
    }

    #[test]
    fn deleting_selected_card_is_reported() {
        let store = store();
        let selection = SelectedCard::new(&store);
        let mut deletions = selection.deletions().subscribe();
        store.apply(CardOperation::add(LightCard::new("A", "1", 10, 0, Severity::Alarm)));
        store.apply(CardOperation::add(LightCard::new("B", "1", 10, 0, Severity::Alarm)));
        selection.select(Some("A".into()));

        store.apply(CardOperation::delete("B"));
        store.apply(CardOperation::delete("A"));
        assert_eq!(deletions.drain(), vec![CardId::from("A")]);
    }

    #[tokio::test]
    async fn hydrate_loads_the_selected_card() {
        let store = store();
        let selection = SelectedCard::new(&store);
        let card = Card { summary: LightCard::new("A", "1", 10, 0, Severity::Alarm), data: serde_json::json!({ "line": "L1" }) };
        let loader = StaticCardLoader::new([card.clone()]);

        assert!(matches!(selection.hydrate(&loader).await, Err(LoadError::NothingSelected)));
        selection.select(Some("A".into()));
        assert_eq!(selection.hydrate(&loader).await.unwrap(), card);
        selection.select(Some("missing".into()));
        assert!(matches!(selection.hydrate(&loader).await, Err(LoadError::NotFound(_))));
    }
}
