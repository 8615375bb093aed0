//! The filtered, sorted list of cards shown in the feed, plus the timeline's view of the same store.

pub mod filter;
pub mod search;
pub mod sorter;

pub use filter::{DateRange, FeedFilters, FilterUpdate, ProcessSelection, TimeDomain, Toggle};
pub use search::TextSearch;
pub use sorter::{CardComparator, SortBy, Sorter};

use cardfeed_proto::{EpochMillis, LightCard};
use cardfeed_signals::{Broadcast, Latest};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::FeedConfig;
use crate::perimeter::Perimeter;
use crate::store::LightCardStore;
use crate::timer::BackgroundTask;
use crate::{action_debug, action_info};

struct Criteria {
    filters: FeedFilters,
    sorter: Sorter,
    search: TextSearch,
    only_business_filter_for_timeline: bool,
}

/// Derived view over a [`LightCardStore`]. Recomputed, after a short debounce, whenever the store
/// changes or a criterion does. Every recomputation publishes fresh `Arc`s, so consumers can diff by
/// pointer.
#[derive(Clone)]
pub struct FilteredFeed(Arc<Inner>);

struct Inner {
    store: LightCardStore,
    perimeter: Arc<dyn Perimeter>,
    debounce: Duration,
    criteria: RwLock<Criteria>,
    inputs: Broadcast<()>,
    visible: Latest<Arc<Vec<LightCard>>>,
    timeline: Latest<Arc<Vec<LightCard>>>,
    task: Mutex<Option<BackgroundTask>>,
}

impl std::fmt::Display for FilteredFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "FilteredFeed") }
}

impl FilteredFeed {
    pub fn new(store: LightCardStore, perimeter: Arc<dyn Perimeter>, config: &FeedConfig, now: EpochMillis) -> Self {
        Self(Arc::new(Inner {
            store,
            perimeter,
            debounce: config.projection_debounce(),
            criteria: RwLock::new(Criteria {
                filters: FeedFilters::new(now),
                sorter: Sorter::default(),
                search: TextSearch::default(),
                only_business_filter_for_timeline: false,
            }),
            inputs: Broadcast::new(),
            visible: Latest::with_value(Arc::new(Vec::new())),
            timeline: Latest::with_value(Arc::new(Vec::new())),
            task: Mutex::new(None),
        }))
    }

    /// Start recomputing on changes. Idempotent.
    pub fn start(&self) {
        let mut task = self.0.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_stopped()) {
            return;
        }
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let store_guard = self.0.store.changes().listen(tx.clone());
        let inputs_guard = self.0.inputs.listen(tx);
        let feed = self.clone();
        *task = Some(BackgroundTask::spawn("feed projection", move |cancel| async move {
            let _guards = (store_guard, inputs_guard);
            feed.run(rx, cancel).await
        }));
    }

    pub fn stop(&self) {
        if let Some(task) = self.0.task.lock().unwrap_or_else(|p| p.into_inner()).take() {
            task.stop();
        }
    }

    async fn run(&self, mut triggers: tokio::sync::mpsc::UnboundedReceiver<()>, cancel: CancellationToken) {
        let mut deadline: Option<Instant> = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                trigger = triggers.recv() => match trigger {
                    Some(()) => deadline = Some(Instant::now() + self.0.debounce),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.recompute_now();
                }
            }
        }
    }

    fn criteria(&self) -> std::sync::RwLockReadGuard<'_, Criteria> { self.0.criteria.read().unwrap_or_else(|p| p.into_inner()) }

    fn change<R>(&self, f: impl FnOnce(&mut Criteria) -> R) -> R {
        let result = {
            let mut criteria = self.0.criteria.write().unwrap_or_else(|p| p.into_inner());
            f(&mut criteria)
        };
        self.0.inputs.send(());
        result
    }

    /// Recompute both outputs from the store's current content, bypassing the debounce
    pub fn recompute_now(&self) {
        let cards = self.0.store.snapshot();
        let (visible, timeline) = {
            let criteria = self.criteria();
            let perimeter = self.0.perimeter.as_ref();
            let filters = &criteria.filters;

            let (feed, timeline): (Vec<LightCard>, Vec<LightCard>) = if criteria.only_business_filter_for_timeline {
                let timeline: Vec<LightCard> = cards.into_iter().filter(|c| filters.accepts_business_date(c)).collect();
                let feed = timeline.iter().filter(|c| filters.accepts_without_business_date(c, perimeter)).cloned().collect();
                (feed, timeline)
            } else {
                let feed: Vec<LightCard> = cards.into_iter().filter(|c| filters.accepts(c, perimeter)).collect();
                (feed.clone(), feed)
            };

            let mut visible: Vec<LightCard> = feed.into_iter().filter(|c| criteria.search.matches(c)).collect();
            criteria.sorter.sort(&mut visible);
            (visible, timeline)
        };

        action_debug!(self, "recompute", "{} visible, {} on the timeline", visible.len(), timeline.len());
        self.0.visible.set(Arc::new(visible));
        self.0.timeline.set(Arc::new(timeline));
    }

    /// Whether `card` would currently show up in the feed
    pub fn is_card_visible_in_feed(&self, card: &LightCard) -> bool {
        let criteria = self.criteria();
        criteria.filters.accepts(card, self.0.perimeter.as_ref()) && criteria.search.matches(card)
    }

    /// Restrict the feed to a business period, or lift the restriction with `None`
    pub fn set_business_domain(&self, domain: Option<TimeDomain>) {
        action_info!(self, "set_business_domain", "{domain:?}");
        self.change(|c| match domain {
            Some(domain) => c.filters.update(FilterUpdate::BusinessDate { active: true, domain }),
            None => c.filters.update(FilterUpdate::BusinessDate { active: false, domain: c.filters.business_date.status }),
        });
    }

    pub fn update_filter(&self, update: FilterUpdate) -> bool { self.change(|c| c.filters.update(update)) }

    pub fn set_sort_by(&self, by: SortBy) { self.change(|c| c.sorter.set_by(by)) }

    pub fn set_comparator(&self, comparator: Option<CardComparator>) { self.change(|c| c.sorter.set_comparator(comparator)) }

    pub fn set_search_term(&self, term: &str) { self.change(|c| c.search = TextSearch::new(term)) }

    pub fn set_only_business_filter_for_timeline(&self, only: bool) { self.change(|c| c.only_business_filter_for_timeline = only) }

    pub fn filters(&self) -> FeedFilters { self.criteria().filters.clone() }

    pub fn sort_by(&self) -> SortBy { self.criteria().sorter.by() }

    /// Filtered, searched and sorted cards
    pub fn visible(&self) -> &Latest<Arc<Vec<LightCard>>> { &self.0.visible }

    /// Cards for the timeline: filtered but neither searched nor sorted
    pub fn timeline(&self) -> &Latest<Arc<Vec<LightCard>>> { &self.0.timeline }
}
