use cardfeed_proto::{EpochMillis, LightCard, Severity};
use std::collections::BTreeSet;

use crate::perimeter::Perimeter;

/// The business time window the viewer is looking at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeDomain {
    pub start: EpochMillis,
    pub end: EpochMillis,
}

impl TimeDomain {
    pub fn new(start: EpochMillis, end: EpochMillis) -> Self { Self { start, end } }

    /// Intersection test. A card without an end date is open-ended: it stays visible in every
    /// domain that ends at or after its start.
    pub fn contains(&self, card: &LightCard) -> bool {
        card.start_date <= self.end && card.end_date.map_or(true, |end| end >= self.start)
    }
}

/// A criterion that can be switched off without losing its settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle<S> {
    pub active: bool,
    pub status: S,
}

impl<S> Toggle<S> {
    pub fn on(status: S) -> Self { Self { active: true, status } }
    pub fn off(status: S) -> Self { Self { active: false, status } }
}

/// Optional publish-date bounds, both inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<EpochMillis>,
    pub to: Option<EpochMillis>,
}

/// Process, and optionally state, a card must belong to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSelection {
    pub process: Option<String>,
    pub state: Option<String>,
}

/// Every criterion of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilters {
    pub business_date: Toggle<TimeDomain>,
    pub severity: Toggle<BTreeSet<Severity>>,
    pub publish_date: Toggle<DateRange>,
    /// Status is the acknowledgement state to show
    pub acknowledgement: Toggle<bool>,
    /// When active, hides cards the user's entity already answered
    pub response: Toggle<()>,
    pub process: Toggle<ProcessSelection>,
    /// Cards must carry at least one of these tags
    pub tags: Toggle<BTreeSet<String>>,
    /// Administrative mode: ignore the perimeter
    pub see_all: bool,
}

/// A change to one criterion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    BusinessDate { active: bool, domain: TimeDomain },
    Severity { active: bool, severities: BTreeSet<Severity> },
    PublishDate { active: bool, range: DateRange },
    Acknowledgement { active: bool, acknowledged: bool },
    Response { active: bool },
    Process { active: bool, selection: ProcessSelection },
    Tags { active: bool, tags: BTreeSet<String> },
    SeeAll(bool),
}

const TWO_HOURS: EpochMillis = 2 * 60 * 60 * 1000;
const TWO_DAYS: EpochMillis = 48 * 60 * 60 * 1000;

impl FeedFilters {
    /// Default criteria: only unacknowledged cards of any severity. The business date filter starts
    /// inactive on a window around `now`.
    pub fn new(now: EpochMillis) -> Self {
        Self {
            business_date: Toggle::off(TimeDomain::new(now - TWO_HOURS, now + TWO_DAYS)),
            severity: Toggle::on(Severity::ALL.into_iter().collect()),
            publish_date: Toggle::off(DateRange::default()),
            acknowledgement: Toggle::on(false),
            response: Toggle::off(()),
            process: Toggle::off(ProcessSelection::default()),
            tags: Toggle::off(BTreeSet::new()),
            see_all: false,
        }
    }

    /// Returns false when the update changed nothing
    pub fn update(&mut self, update: FilterUpdate) -> bool {
        let before = self.clone();
        match update {
            FilterUpdate::BusinessDate { active, domain } => self.business_date = Toggle { active, status: domain },
            FilterUpdate::Severity { active, severities } => self.severity = Toggle { active, status: severities },
            FilterUpdate::PublishDate { active, range } => self.publish_date = Toggle { active, status: range },
            FilterUpdate::Acknowledgement { active, acknowledged } => self.acknowledgement = Toggle { active, status: acknowledged },
            FilterUpdate::Response { active } => self.response.active = active,
            FilterUpdate::Process { active, selection } => self.process = Toggle { active, status: selection },
            FilterUpdate::Tags { active, tags } => self.tags = Toggle { active, status: tags },
            FilterUpdate::SeeAll(see_all) => self.see_all = see_all,
        }
        *self != before
    }

    pub fn accepts(&self, card: &LightCard, perimeter: &dyn Perimeter) -> bool {
        self.accepts_business_date(card) && self.accepts_without_business_date(card, perimeter)
    }

    pub fn accepts_business_date(&self, card: &LightCard) -> bool {
        !self.business_date.active || self.business_date.status.contains(card)
    }

    pub fn accepts_without_business_date(&self, card: &LightCard, perimeter: &dyn Perimeter) -> bool {
        (self.see_all || perimeter.can_see(&card.process, &card.state))
            && self.accepts_severity(card)
            && self.accepts_publish_date(card)
            && self.accepts_acknowledgement(card, perimeter)
            && self.accepts_response(card)
            && self.accepts_process(card)
            && self.accepts_tags(card)
    }

    fn accepts_severity(&self, card: &LightCard) -> bool { !self.severity.active || self.severity.status.contains(&card.severity) }

    fn accepts_publish_date(&self, card: &LightCard) -> bool {
        let DateRange { from, to } = self.publish_date.status;
        !self.publish_date.active || (from.map_or(true, |from| card.publish_date >= from) && to.map_or(true, |to| card.publish_date <= to))
    }

    fn accepts_acknowledgement(&self, card: &LightCard, perimeter: &dyn Perimeter) -> bool {
        !self.acknowledgement.active || perimeter.has_been_acknowledged(card) == self.acknowledgement.status
    }

    fn accepts_response(&self, card: &LightCard) -> bool { !self.response.active || !card.has_child_card_from_current_user_entity }

    fn accepts_process(&self, card: &LightCard) -> bool {
        let ProcessSelection { process, state } = &self.process.status;
        !self.process.active || (process.as_ref().map_or(true, |p| *p == card.process) && state.as_ref().map_or(true, |s| *s == card.state))
    }

    fn accepts_tags(&self, card: &LightCard) -> bool { !self.tags.active || card.tags.iter().any(|t| self.tags.status.contains(t)) }
}
