use cardfeed_proto::EpochMillis;
use cardfeed_signals::Latest;
use std::sync::Mutex;

/// A closed business time window, in epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Period {
    pub start: EpochMillis,
    pub end: EpochMillis,
}

impl Period {
    pub fn new(start: EpochMillis, end: EpochMillis) -> Self { Self { start, end } }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} → {}]", crate::util::fmt_millis(self.start), crate::util::fmt_millis(self.end))
    }
}

/// Remembers which part of the business timeline the server already sent us, so that moving the
/// viewer's window only asks for the missing slice.
#[derive(Debug, Default)]
pub(crate) struct LoadedPeriods {
    current: Option<Period>,
    loaded: Option<Period>,
}

impl LoadedPeriods {
    /// The window to request for `period`, if any part of it is missing
    pub fn request_for(&mut self, period: Period) -> Option<Period> {
        if self.current == Some(period) {
            return None;
        }
        self.current = Some(period);

        let Some(loaded) = self.loaded else {
            return Some(period);
        };
        let before = period.start < loaded.start;
        let after = period.end > loaded.end;
        match (before, after) {
            (true, true) => Some(period),
            (true, false) => Some(Period::new(period.start, loaded.start)),
            (false, true) => Some(Period::new(loaded.end, period.end)),
            (false, false) => None,
        }
    }

    /// Widen the loaded window once the server accepted a request
    pub fn mark_loaded(&mut self, window: Period) {
        self.loaded = Some(match self.loaded {
            None => window,
            Some(loaded) => Period::new(loaded.start.min(window.start), loaded.end.max(window.end)),
        });
    }

    pub fn loaded(&self) -> Option<Period> { self.loaded }

    pub fn reset(&mut self) {
        self.current = None;
        self.loaded = None;
    }
}

/// Counts outstanding card loads. `in_progress` flips to true on the first and back to false
/// when the last one ends.
#[derive(Debug)]
pub(crate) struct LoadingTracker {
    pending: Mutex<usize>,
    in_progress: Latest<bool>,
}

impl Default for LoadingTracker {
    fn default() -> Self { Self { pending: Mutex::new(0), in_progress: Latest::with_value(false) } }
}

impl LoadingTracker {
    pub fn start(&self) {
        let first = {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            *pending += 1;
            *pending == 1
        };
        if first {
            self.in_progress.set(true);
        }
    }

    /// Never goes below zero
    pub fn end(&self) {
        let last = {
            let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
            if *pending == 0 {
                return;
            }
            *pending -= 1;
            *pending == 0
        };
        if last {
            self.in_progress.set(false);
        }
    }

    pub fn pending(&self) -> usize { *self.pending.lock().unwrap_or_else(|p| p.into_inner()) }

    pub fn in_progress(&self) -> &Latest<bool> { &self.in_progress }
}
