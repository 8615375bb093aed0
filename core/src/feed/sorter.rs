use cardfeed_proto::LightCard;
use std::cmp::Ordering;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Built-in feed orders. Every mode falls back to severity, then most recent publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum SortBy {
    /// Unread cards first
    Unread,
    #[default]
    Severity,
    StartDate,
    EndDate,
    PublishDate,
}

/// Caller-supplied ordering, replacing the built-in mode while set
pub type CardComparator = Arc<dyn Fn(&LightCard, &LightCard) -> Ordering + Send + Sync>;

#[derive(Clone, Default)]
pub struct Sorter {
    by: SortBy,
    custom: Option<CardComparator>,
}

impl std::fmt::Debug for Sorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sorter").field("by", &self.by).field("custom", &self.custom.is_some()).finish()
    }
}

impl Sorter {
    pub fn new(by: SortBy) -> Self { Self { by, custom: None } }

    pub fn by(&self) -> SortBy { self.by }

    pub fn set_by(&mut self, by: SortBy) { self.by = by }

    pub fn set_comparator(&mut self, comparator: Option<CardComparator>) { self.custom = comparator }

    pub fn compare(&self, a: &LightCard, b: &LightCard) -> Ordering {
        if let Some(custom) = &self.custom {
            return custom(a, b);
        }
        match self.by {
            SortBy::Unread => by_unread(a, b).then_with(|| by_severity_then_publish_date(a, b)),
            SortBy::Severity => by_severity_then_publish_date(a, b),
            SortBy::StartDate => a.start_date.cmp(&b.start_date).then_with(|| by_severity_then_publish_date(a, b)),
            // no end date sorts last
            SortBy::EndDate => match (a.end_date, b.end_date) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| by_severity_then_publish_date(a, b)),
            SortBy::PublishDate => by_publish_date(a, b).then_with(|| a.severity.cmp(&b.severity)),
        }
    }

    /// Stable sort in place
    pub fn sort(&self, cards: &mut [LightCard]) { cards.sort_by(|a, b| self.compare(a, b)) }
}

fn by_unread(a: &LightCard, b: &LightCard) -> Ordering { a.has_been_read.cmp(&b.has_been_read) }

/// Most recent first; uid breaks ties so the order is total
fn by_publish_date(a: &LightCard, b: &LightCard) -> Ordering { b.publish_date.cmp(&a.publish_date).then_with(|| b.uid.cmp(&a.uid)) }

fn by_severity_then_publish_date(a: &LightCard, b: &LightCard) -> Ordering { a.severity.cmp(&b.severity).then_with(|| by_publish_date(a, b)) }
