use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::Notify;

use crate::{Broadcast, IntoListener, Listener, ListenerGuard};

/// A value that is set at most once. Waiters and listeners registered before the value is set are
/// released when it is; anything arriving later sees the value immediately.
pub struct OneShot<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    value: OnceLock<T>,
    notify: Notify,
    publish: Mutex<()>,
    listeners: Broadcast<T>,
}

impl<T> Clone for OneShot<T> {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl<T: Clone> Default for OneShot<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Clone> OneShot<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(Inner { value: OnceLock::new(), notify: Notify::new(), publish: Mutex::new(()), listeners: Broadcast::new() }) }
    }

    /// Set the value. Later calls hand their value back untouched.
    pub fn set(&self, value: T) -> Result<(), T> {
        let _publishing = self.inner.publish.lock().unwrap_or_else(|p| p.into_inner());
        self.inner.value.set(value)?;
        self.inner.notify.notify_waiters();
        if let Some(value) = self.inner.value.get() {
            self.inner.listeners.send(value.clone());
        }
        Ok(())
    }

    pub fn get(&self) -> Option<T> { self.inner.value.get().cloned() }

    pub fn is_set(&self) -> bool { self.inner.value.get().is_some() }

    pub async fn wait(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            if let Some(value) = self.inner.value.get() {
                return value.clone();
            }
            notified.await;
        }
    }

    /// Call `listener` once with the value: right away if already set, otherwise when it is
    pub fn listen<L>(&self, listener: L) -> Option<ListenerGuard<T>>
    where L: IntoListener<T> {
        let _publishing = self.inner.publish.lock().unwrap_or_else(|p| p.into_inner());
        let listener = listener.into_listener();
        match self.inner.value.get() {
            Some(value) => {
                match listener {
                    Listener::Payload(callback) => callback(value.clone()),
                    Listener::NotifyOnly(callback) => callback(),
                }
                None
            }
            None => Some(self.inner.listeners.listen(listener)),
        }
    }
}
