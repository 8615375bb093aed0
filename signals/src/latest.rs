use std::sync::{Arc, Mutex, RwLock};

use crate::{Broadcast, IntoListener, Listener, ListenerGuard, Subscription};

/// Single-slot cache in front of a [`Broadcast`]: keeps the last value sent and can replay it
/// to late listeners.
///
/// `set` and `listen_now` are serialized so a late listener sees the cached value exactly once
/// and then every later value, never a gap or a repeat. A listener must not call `set` on the
/// same `Latest` it listens to.
pub struct Latest<T> {
    value: Arc<RwLock<Option<T>>>,
    publish: Arc<Mutex<()>>,
    broadcast: Broadcast<T>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self { Self { value: self.value.clone(), publish: self.publish.clone(), broadcast: self.broadcast.clone() } }
}

impl<T: Clone> Default for Latest<T> {
    fn default() -> Self { Self::new() }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Latest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.value.read() {
            Ok(value) => f.debug_tuple("Latest").field(&*value).finish(),
            Err(_) => f.write_str("Latest(<poisoned>)"),
        }
    }
}

impl<T: Clone> Latest<T> {
    /// Empty until the first `set`
    pub fn new() -> Self { Self { value: Arc::new(RwLock::new(None)), publish: Arc::new(Mutex::new(())), broadcast: Broadcast::new() } }

    pub fn with_value(value: T) -> Self {
        let latest = Self::new();
        latest.store(value);
        latest
    }

    fn store(&self, value: T) {
        match self.value.write() {
            Ok(mut slot) => *slot = Some(value),
            Err(poisoned) => *poisoned.into_inner() = Some(value),
        }
    }

    /// Cache `value` and send it to every listener
    pub fn set(&self, value: T) {
        let _publishing = self.publish.lock().unwrap_or_else(|p| p.into_inner());
        self.store(value.clone());
        self.broadcast.send(value);
    }

    /// Only `set` when the value actually changes
    pub fn set_if_changed(&self, value: T) -> bool
    where T: PartialEq {
        if self.with(|current| current == Some(&value)) {
            return false;
        }
        self.set(value);
        true
    }

    /// The cached value, if any
    pub fn get(&self) -> Option<T> { self.with(|value| value.cloned()) }

    /// Borrow the cached value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        match self.value.read() {
            Ok(value) => f(value.as_ref()),
            Err(poisoned) => f(poisoned.into_inner().as_ref()),
        }
    }

    /// Listen for future values only
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        self.broadcast.listen(listener)
    }

    /// Listen for future values, first replaying the cached one (if any)
    pub fn listen_now<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        let _publishing = self.publish.lock().unwrap_or_else(|p| p.into_inner());
        let listener = listener.into_listener();
        if let Some(current) = self.get() {
            match &listener {
                Listener::Payload(callback) => callback(current),
                Listener::NotifyOnly(callback) => callback(),
            }
        }
        self.broadcast.listen(listener)
    }

    /// Async subscription that starts with the cached value (if any)
    pub fn subscribe_now(&self) -> Subscription<T>
    where T: Send + Sync + 'static {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let guard = self.listen_now(tx);
        Subscription::new(guard, rx)
    }

    /// Async subscription to future values only
    pub fn subscribe(&self) -> Subscription<T>
    where T: Send + Sync + 'static {
        self.broadcast.subscribe()
    }

    /// Resolve once the cached value satisfies `predicate`
    pub async fn wait_for<F, R>(&self, predicate: F) -> R
    where
        F: Fn(&T) -> Option<R>,
        T: Send + Sync + 'static,
    {
        let mut sub = self.subscribe_now();
        loop {
            match sub.recv().await {
                Some(value) => {
                    if let Some(result) = predicate(&value) {
                        return result;
                    }
                }
                // we hold a clone of the broadcast through `self`, so the channel cannot close
                None => std::future::pending::<()>().await,
            }
        }
    }
}
