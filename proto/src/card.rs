use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{CardId, CardUid, EntityId, EpochMillis};

/// Severity of a card. The declaration order is the feed's severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Alarm,
    Action,
    Compliant,
    Information,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::Alarm, Severity::Action, Severity::Compliant, Severity::Information];

    pub fn ordinal(&self) -> u8 {
        match self {
            Severity::Alarm => 0,
            Severity::Action => 1,
            Severity::Compliant => 2,
            Severity::Information => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Alarm => "ALARM",
            Severity::Action => "ACTION",
            Severity::Compliant => "COMPLIANT",
            Severity::Information => "INFORMATION",
        };
        f.write_str(name)
    }
}

/// Publisher-requested behaviours attached to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardAction {
    PropagateReadAckToParentCard,
    KeepChildCards,
    KeepExistingAcksAndReads,
    KeepExistingPublishDate,
    StoreOnlyInArchives,
    NotNotified,
    /// Actions introduced by newer servers that this client does not act upon
    #[serde(other)]
    Unknown,
}

/// Lightweight projection of a card, as rendered in the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightCard {
    pub uid: CardUid,
    pub id: CardId,
    #[serde(default)]
    pub publisher: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_type: Option<String>,
    #[serde(default)]
    pub process_version: String,
    #[serde(default)]
    pub process: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_instance_id: Option<String>,
    pub publish_date: EpochMillis,
    pub start_date: EpochMillis,
    #[serde(default)]
    pub end_date: Option<EpochMillis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<EpochMillis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lttd: Option<EpochMillis>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_translated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_translated: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_card_id: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_parent_card_uid: Option<CardUid>,
    #[serde(default)]
    pub entities_acks: BTreeSet<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_recipients: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<CardAction>,
    #[serde(default)]
    pub has_been_acknowledged: bool,
    #[serde(default)]
    pub has_been_read: bool,
    /// Derived locally from the child cards received for this card
    #[serde(default)]
    pub has_child_card_from_current_user_entity: bool,
}

/// Orders revisions of the same card: publish date first, then uid
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Revision<'a> {
    pub publish_date: EpochMillis,
    pub uid: &'a CardUid,
}

impl LightCard {
    /// A minimal card, mostly useful for building fixtures. Everything else takes its default.
    pub fn new(id: impl Into<CardId>, uid: impl Into<CardUid>, publish_date: EpochMillis, start_date: EpochMillis, severity: Severity) -> Self {
        Self {
            uid: uid.into(),
            id: id.into(),
            publisher: String::new(),
            publisher_type: None,
            process_version: String::new(),
            process: String::new(),
            state: String::new(),
            process_instance_id: None,
            publish_date,
            start_date,
            end_date: None,
            expiration_date: None,
            lttd: None,
            severity,
            title_translated: None,
            summary_translated: None,
            tags: Vec::new(),
            parent_card_id: None,
            initial_parent_card_uid: None,
            entities_acks: BTreeSet::new(),
            entity_recipients: Vec::new(),
            actions: Vec::new(),
            has_been_acknowledged: false,
            has_been_read: false,
            has_child_card_from_current_user_entity: false,
        }
    }

    pub fn with_end_date(mut self, end_date: Option<EpochMillis>) -> Self {
        self.end_date = end_date;
        self
    }

    pub fn with_process(mut self, process: impl Into<String>, state: impl Into<String>) -> Self {
        self.process = process.into();
        self.state = state.into();
        self
    }

    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<CardId>) -> Self {
        self.parent_card_id = Some(parent.into());
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = CardAction>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    pub fn with_read(mut self, read: bool) -> Self {
        self.has_been_read = read;
        self
    }

    pub fn with_titles(mut self, title: impl Into<String>, summary: impl Into<String>) -> Self {
        self.title_translated = Some(title.into());
        self.summary_translated = Some(summary.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_child(&self) -> bool { self.parent_card_id.is_some() }

    pub fn has_action(&self, action: CardAction) -> bool { self.actions.contains(&action) }

    pub fn revision(&self) -> Revision<'_> { Revision { publish_date: self.publish_date, uid: &self.uid } }

    /// True when `other` is a strictly newer revision of this same card
    pub fn is_superseded_by(&self, other: &LightCard) -> bool { other.revision() > self.revision() }

    /// `process.state`, the key used by perimeters and the process filter
    pub fn process_state_key(&self) -> String { format!("{}.{}", self.process, self.state) }
}

impl fmt::Display for LightCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let published = chrono::DateTime::from_timestamp_millis(self.publish_date)
            .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.publish_date.to_string());
        write!(f, "LightCard({} uid={} publishDate={})", self.id, self.uid, published)
    }
}

/// A full card as returned by the card detail endpoint: the light envelope plus the
/// publisher's business data used by templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(flatten)]
    pub summary: LightCard,
    #[serde(default)]
    pub data: serde_json::Value,
}
