use cardfeed_proto::{EntityId, LightCard};
use std::collections::HashSet;

/// What the current user is allowed to see and on whose behalf they act
pub trait Perimeter: Send + Sync + 'static {
    /// Entities the current user belongs to
    fn user_entities(&self) -> &[EntityId];

    /// Whether the user's perimeter grants visibility on `process`/`state`
    fn can_see(&self, process: &str, state: &str) -> bool;

    /// A card counts as acknowledged when the user acknowledged it, or when every one of the user's
    /// entities that the card was addressed to has acknowledged it.
    fn has_been_acknowledged(&self, card: &LightCard) -> bool {
        if card.has_been_acknowledged {
            return true;
        }
        let entities = self.user_entities();
        let mut addressed = card.entity_recipients.iter().filter(|e| entities.contains(e)).peekable();
        addressed.peek().is_some() && addressed.all(|e| card.entities_acks.contains(e))
    }

    /// Whether one of the user's entities published `card`
    fn is_from_user_entity(&self, card: &LightCard) -> bool { self.user_entities().iter().any(|e| e.as_str() == card.publisher) }
}

/// A fixed perimeter, for applications that resolve rights once at login
#[derive(Debug, Clone, Default)]
pub struct StaticPerimeter {
    entities: Vec<EntityId>,
    rights: Option<HashSet<(String, String)>>,
}

impl StaticPerimeter {
    /// Sees every process and state
    pub fn allow_all(entities: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        Self { entities: entities.into_iter().map(Into::into).collect(), rights: None }
    }

    /// Sees nothing until rights are granted with [`StaticPerimeter::with_right`]
    pub fn restricted(entities: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        Self { entities: entities.into_iter().map(Into::into).collect(), rights: Some(HashSet::new()) }
    }

    pub fn with_right(mut self, process: impl Into<String>, state: impl Into<String>) -> Self {
        self.rights.get_or_insert_with(HashSet::new).insert((process.into(), state.into()));
        self
    }
}

impl Perimeter for StaticPerimeter {
    fn user_entities(&self) -> &[EntityId] { &self.entities }

    fn can_see(&self, process: &str, state: &str) -> bool {
        match &self.rights {
            None => true,
            Some(rights) => rights.contains(&(process.to_string(), state.to_string())),
        }
    }
}
