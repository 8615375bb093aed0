use cardfeed_proto::EpochMillis;
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall clock used for heartbeat bookkeeping and default business periods
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> EpochMillis;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis { chrono::Utc::now().timestamp_millis() }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn new(now: EpochMillis) -> Self { Self(AtomicI64::new(now)) }

    pub fn set(&self, now: EpochMillis) { self.0.store(now, Ordering::SeqCst) }

    pub fn advance(&self, millis: i64) -> EpochMillis { self.0.fetch_add(millis, Ordering::SeqCst) + millis }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> EpochMillis { self.0.load(Ordering::SeqCst) }
}
