mod period;

pub use period::Period;
use period::{LoadedPeriods, LoadingTracker};

use cardfeed_proto::{CardOperation, ControlSignal, EpochMillis, StreamFrame, SubscriptionRequest};
use cardfeed_signals::{Broadcast, Latest, OneShot};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::FeedConfig;
use crate::timer::{BackgroundTask, PeriodicTimer};
use crate::transport::{SubscriptionServer, TransportEvent};
use crate::util::fmt_millis;
use crate::{action_debug, action_error, action_info, action_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConnectionState {
    Closed,
    Connecting,
    OpenAwaitingInit,
    Synchronized,
    Reconnecting,
}

/// Raw transport status, as reported to subscribers of [`ConnectionManager::stream_status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StreamStatus {
    Open,
    Close,
}

/// One channel per server control signal that the application may want to react to
#[derive(Debug, Clone, Default)]
pub struct ControlChannels {
    pub reload_requests: Broadcast<()>,
    pub business_config_changes: Broadcast<()>,
    pub user_config_changes: Broadcast<()>,
    pub monitoring_config_changes: Broadcast<()>,
    pub business_data_changes: Broadcast<()>,
    pub disconnected_by_new_connection: Broadcast<()>,
}

/// Owns the push subscription: opens and closes it, keeps heartbeats flowing, classifies incoming
/// frames and asks the server for a replay after a reconnect.
#[derive(Clone)]
pub struct ConnectionManager(Arc<Inner>);

struct Inner {
    server: Arc<dyn SubscriptionServer>,
    clock: Arc<dyn Clock>,
    config: FeedConfig,

    state: Latest<ConnectionState>,
    status: Latest<StreamStatus>,
    events: Broadcast<CardOperation>,
    init_done: OneShot<()>,
    channels: ControlChannels,
    loading: LoadingTracker,
    periods: Mutex<LoadedPeriods>,

    last_heartbeat: AtomicI64,
    first_init_received: AtomicBool,
    next_session: AtomicU64,
    session: Mutex<Option<Session>>,
}

/// Everything tied to one `init_stream` call
struct Session {
    id: u64,
    reader: BackgroundTask,
    heartbeat_log: PeriodicTimer,
    heartbeat_sender: Option<PeriodicTimer>,
}

impl Session {
    fn dispose(self) {
        self.reader.stop();
        self.heartbeat_log.cancel();
        if let Some(sender) = &self.heartbeat_sender {
            sender.cancel();
        }
    }
}

impl std::fmt::Display for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "ConnectionManager") }
}

impl ConnectionManager {
    pub fn new(server: Arc<dyn SubscriptionServer>, clock: Arc<dyn Clock>, config: FeedConfig) -> Self {
        Self(Arc::new(Inner {
            server,
            clock,
            config,
            state: Latest::with_value(ConnectionState::Closed),
            status: Latest::new(),
            events: Broadcast::new(),
            init_done: OneShot::new(),
            channels: ControlChannels::default(),
            loading: LoadingTracker::default(),
            periods: Mutex::new(LoadedPeriods::default()),
            last_heartbeat: AtomicI64::new(0),
            first_init_received: AtomicBool::new(false),
            next_session: AtomicU64::new(1),
            session: Mutex::new(None),
        }))
    }

    /// Open the push subscription. Any previous subscription is torn down first.
    pub fn init_stream(&self) {
        let previous = self.0.session.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(previous) = previous {
            action_debug!(self, "replacing session", "{}", previous.id);
            previous.dispose();
        }

        let id = self.0.next_session.fetch_add(1, Ordering::Relaxed);
        action_info!(self, "init_stream", "session {id}");
        // listeners run here, with no lock held, and before any reader exists
        self.0.state.set(ConnectionState::Connecting);

        let heartbeat_log = {
            let inner = Arc::downgrade(&self.0);
            PeriodicTimer::start("heartbeat log", self.0.config.heartbeat_log_interval(), move || {
                if let Some(inner) = inner.upgrade() {
                    let last = inner.last_heartbeat.load(Ordering::SeqCst);
                    info!("last heartbeat received at {}", fmt_millis(last));
                }
            })
        };

        // held until the new session is in place, so the reader never observes a missing session
        let mut slot = self.0.session.lock().unwrap_or_else(|p| p.into_inner());
        let reader = {
            let manager = self.clone();
            BackgroundTask::spawn("stream reader", move |cancel| async move { manager.read_stream(id, cancel).await })
        };
        if let Some(raced) = slot.replace(Session { id, reader, heartbeat_log, heartbeat_sender: None }) {
            raced.dispose();
        }
    }

    /// Release the subscription and every timer. Safe to call repeatedly and from any state.
    pub fn close_stream(&self) {
        let session = self.0.session.lock().unwrap_or_else(|p| p.into_inner()).take();
        let Some(session) = session else {
            action_debug!(self, "close_stream", "nothing open");
            return;
        };
        action_info!(self, "close_stream", "session {}", session.id);
        session.dispose();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let server = self.0.server.clone();
                handle.spawn(async move {
                    if let Err(e) = server.close().await {
                        warn!("closing the subscription on the server failed: {e}");
                    }
                });
            }
            Err(_) => warn!("no runtime available, the server side subscription is left to expire"),
        }

        self.0.status.set_if_changed(StreamStatus::Close);
        self.0.state.set_if_changed(ConnectionState::Closed);
    }

    /// Tell the server which business period the viewer is looking at. Only the part of the period
    /// that was not loaded before is requested; returns that window, if any.
    pub fn set_business_period(&self, start: EpochMillis, end: EpochMillis) -> Option<Period> {
        let period = Period::new(start, end);
        let window = self.0.periods.lock().unwrap_or_else(|p| p.into_inner()).request_for(period);
        let Some(window) = window else {
            action_debug!(self, "set_business_period", "{period} already loaded");
            return None;
        };

        action_info!(self, "set_business_period", "{period}, requesting {window}");
        self.0.loading.start();
        let manager = self.clone();
        tokio::spawn(async move {
            let request = SubscriptionRequest::BusinessPeriod { range_start: window.start, range_end: window.end };
            match manager.0.server.post(request).await {
                Ok(()) => manager.0.periods.lock().unwrap_or_else(|p| p.into_inner()).mark_loaded(window),
                Err(e) => {
                    action_warn!(manager, "set_business_period failed", "{window}: {e}");
                    manager.0.loading.end();
                }
            }
        });
        Some(window)
    }

    /// Forget what was loaded, so the next period is requested in full
    pub fn reset_loaded_period(&self) { self.0.periods.lock().unwrap_or_else(|p| p.into_inner()).reset() }

    /// Business operations, in arrival order
    pub fn events(&self) -> &Broadcast<CardOperation> { &self.0.events }

    pub fn stream_status(&self) -> &Latest<StreamStatus> { &self.0.status }

    /// Completed by the first INIT frame ever received
    pub fn stream_init_done(&self) -> &OneShot<()> { &self.0.init_done }

    pub fn connection_state(&self) -> &Latest<ConnectionState> { &self.0.state }

    pub fn loading_in_progress(&self) -> &Latest<bool> { self.0.loading.in_progress() }

    pub fn channels(&self) -> &ControlChannels { &self.0.channels }

    pub fn last_heartbeat_received_at(&self) -> EpochMillis { self.0.last_heartbeat.load(Ordering::SeqCst) }

    /// Where a replay requested right now would start
    pub fn recovery_from(&self) -> EpochMillis { self.last_heartbeat_received_at() - self.0.config.recovery_margin_millis() }

    pub fn is_open(&self) -> bool { self.0.session.lock().unwrap_or_else(|p| p.into_inner()).is_some() }

    async fn read_stream(&self, session: u64, cancel: CancellationToken) {
        let mut events = match self.0.server.open(cancel.clone()).await {
            Ok(events) => events,
            Err(e) => {
                action_error!(self, "open failed", "{e}");
                if self.is_current(session) {
                    self.0.status.set(StreamStatus::Close);
                    self.0.state.set(ConnectionState::Closed);
                }
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        if !self.is_current(session) {
                            break;
                        }
                        self.handle_event(session, event);
                    }
                    None => {
                        if self.is_current(session) {
                            action_warn!(self, "stream ended", "session {session}");
                            self.0.status.set(StreamStatus::Close);
                            self.0.state.set(ConnectionState::Closed);
                        }
                        break;
                    }
                }
            }
        }
    }

    fn is_current(&self, session: u64) -> bool {
        self.0.session.lock().unwrap_or_else(|p| p.into_inner()).as_ref().is_some_and(|s| s.id == session)
    }

    fn handle_event(&self, session: u64, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                action_info!(self, "stream open", "session {session}");
                self.start_heartbeat_sender(session);
                self.0.status.set(StreamStatus::Open);
                self.0.state.set(ConnectionState::OpenAwaitingInit);
            }
            TransportEvent::Error(e) => {
                action_error!(self, "stream error", "{e}");
                self.0.status.set(StreamStatus::Close);
                self.0.state.set(ConnectionState::Reconnecting);
            }
            TransportEvent::Frame(payload) => self.handle_frame(&payload),
        }
    }

    /// Classify one payload and act on it. Malformed payloads are logged and skipped.
    pub fn handle_frame(&self, payload: &str) {
        match StreamFrame::parse(payload) {
            Ok(StreamFrame::Heartbeat) => {
                let now = self.0.clock.now_millis();
                self.0.last_heartbeat.store(now, Ordering::SeqCst);
                action_debug!(self, "heartbeat", "received at {}", fmt_millis(now));
            }
            Ok(StreamFrame::Init) => self.on_init(),
            Ok(StreamFrame::Control(signal)) => self.on_control(signal),
            Ok(StreamFrame::Operation(operation)) => self.0.events.send(*operation),
            Err(e) => action_warn!(self, "skipping frame", "{e}"),
        }
    }

    fn on_init(&self) {
        if self.0.first_init_received.swap(true, Ordering::SeqCst) {
            action_info!(self, "init", "stream re-established, recovering");
            self.0.state.set(ConnectionState::Synchronized);
            self.recover();
            self.0.channels.business_config_changes.send(());
            self.0.channels.user_config_changes.send(());
        } else {
            action_info!(self, "init", "stream synchronized");
            self.0.last_heartbeat.store(self.0.clock.now_millis(), Ordering::SeqCst);
            self.0.state.set(ConnectionState::Synchronized);
            let _ = self.0.init_done.set(());
        }
    }

    /// Ask the server to replay everything since shortly before the last heartbeat. Fire and forget:
    /// the store tolerates whatever gets replayed twice.
    fn recover(&self) {
        let updated_from = self.recovery_from();
        action_info!(self, "recover", "replaying from {}", fmt_millis(updated_from));
        let server = self.0.server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.post(SubscriptionRequest::Recovery { updated_from }).await {
                warn!("recovery request failed: {e}");
            }
        });
    }

    fn on_control(&self, signal: ControlSignal) {
        action_info!(self, "control", "{signal}");
        let channels = &self.0.channels;
        match signal {
            ControlSignal::Reload => channels.reload_requests.send(()),
            ControlSignal::OldCardsLoadingEnd => self.0.loading.end(),
            ControlSignal::BusinessConfigChange => channels.business_config_changes.send(()),
            ControlSignal::UserConfigChange => channels.user_config_changes.send(()),
            ControlSignal::MonitoringConfigChange => channels.monitoring_config_changes.send(()),
            ControlSignal::BusinessDataChange => channels.business_data_changes.send(()),
            ControlSignal::DisconnectUserDueToNewConnection => {
                self.close_stream();
                channels.disconnected_by_new_connection.send(());
            }
        }
    }

    /// Started on the first open of a session; later opens reuse it
    fn start_heartbeat_sender(&self, session: u64) {
        let mut guard = self.0.session.lock().unwrap_or_else(|p| p.into_inner());
        let Some(current) = guard.as_mut().filter(|s| s.id == session) else {
            return;
        };
        if current.heartbeat_sender.is_some() {
            return;
        }
        let server = self.0.server.clone();
        current.heartbeat_sender = Some(PeriodicTimer::start("heartbeat sender", self.0.config.heartbeat_sending_interval(), move || {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.send_heartbeat().await {
                    warn!("heartbeat ping failed: {e}");
                }
            });
        }));
    }
}
