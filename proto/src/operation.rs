use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CardId, CardUid, EntityId, LightCard};

/// A business operation pushed by the server on the card subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum CardOperation {
    Add {
        card: LightCard,
    },
    Update {
        card: LightCard,
    },
    Delete {
        card_id: CardId,
    },
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card_id: Option<CardId>,
        card_uid: CardUid,
        #[serde(default)]
        entities_acks: Vec<EntityId>,
    },
    Unack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        card_id: Option<CardId>,
        card_uid: CardUid,
        #[serde(default)]
        entities_acks: Vec<EntityId>,
    },
}

/// Direction of an acknowledgement change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckKind {
    Ack,
    Unack,
}

impl CardOperation {
    pub fn add(card: LightCard) -> Self { CardOperation::Add { card } }

    pub fn delete(card_id: impl Into<CardId>) -> Self { CardOperation::Delete { card_id: card_id.into() } }

    pub fn ack(card_id: impl Into<CardId>, card_uid: impl Into<CardUid>, entities: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        CardOperation::Ack {
            card_id: Some(card_id.into()),
            card_uid: card_uid.into(),
            entities_acks: entities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn unack(card_id: impl Into<CardId>, card_uid: impl Into<CardUid>, entities: impl IntoIterator<Item = impl Into<EntityId>>) -> Self {
        CardOperation::Unack {
            card_id: Some(card_id.into()),
            card_uid: card_uid.into(),
            entities_acks: entities.into_iter().map(Into::into).collect(),
        }
    }

    /// The logical card this operation targets, when the server told us
    pub fn card_id(&self) -> Option<&CardId> {
        match self {
            CardOperation::Add { card } | CardOperation::Update { card } => Some(&card.id),
            CardOperation::Delete { card_id } => Some(card_id),
            CardOperation::Ack { card_id, .. } | CardOperation::Unack { card_id, .. } => card_id.as_ref(),
        }
    }
}

impl fmt::Display for CardOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardOperation::Add { card } => write!(f, "ADD {}", card),
            CardOperation::Update { card } => write!(f, "UPDATE {}", card),
            CardOperation::Delete { card_id } => write!(f, "DELETE {}", card_id),
            CardOperation::Ack { card_uid, entities_acks, .. } => write!(f, "ACK uid={} entities={:?}", card_uid, entities_acks),
            CardOperation::Unack { card_uid, entities_acks, .. } => write!(f, "UNACK uid={} entities={:?}", card_uid, entities_acks),
        }
    }
}
