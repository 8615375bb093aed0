use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use crate::Subscription;

/// A callback registered on a [`Broadcast`]
#[derive(Clone)]
pub enum Listener<T> {
    /// Receives every value
    Payload(Arc<dyn Fn(T) + Send + Sync + 'static>),
    /// Only told that something was sent
    NotifyOnly(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// Conversion into a [`Listener`]. Implemented for closures and channel senders.
pub trait IntoListener<T> {
    fn into_listener(self) -> Listener<T>;
}

/// Multicast channel. Each value is handed to every listener registered at send time,
/// in registration order. Values are not retained.
pub struct Broadcast<T>(Arc<Inner<T>>);

struct Inner<T> {
    listeners: RwLock<BTreeMap<usize, Listener<T>>>,
    next_id: AtomicUsize,
}

impl<T> Clone for Broadcast<T> {
    fn clone(&self) -> Self { Self(self.0.clone()) }
}

impl<T> std::fmt::Debug for Broadcast<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcast").field("listeners", &self.listener_count()).finish()
    }
}

/// Detaches its listener when dropped
#[must_use = "the listener is detached as soon as the guard is dropped"]
pub struct ListenerGuard<T> {
    inner: Weak<Inner<T>>,
    id: usize,
}

impl<T> std::fmt::Debug for ListenerGuard<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.debug_struct("ListenerGuard").field("id", &self.id).finish() }
}

impl<T> Default for Broadcast<T>
where T: Clone
{
    fn default() -> Self { Self::new() }
}

impl<T> Broadcast<T> {
    pub fn listener_count(&self) -> usize { self.0.listeners.read().map(|l| l.len()).unwrap_or_default() }
}

impl<T> Broadcast<T>
where T: Clone
{
    pub fn new() -> Self { Self(Arc::new(Inner { listeners: RwLock::new(BTreeMap::new()), next_id: AtomicUsize::new(0) })) }

    /// Hand `value` to every listener. Listeners run on the caller's task, without any lock held,
    /// so they may listen or drop guards re-entrantly.
    pub fn send(&self, value: T) {
        let listeners: Vec<Listener<T>> = match self.0.listeners.read() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };

        if let Some((last, rest)) = listeners.split_last() {
            for listener in rest {
                match listener {
                    Listener::Payload(callback) => callback(value.clone()),
                    Listener::NotifyOnly(callback) => callback(),
                }
            }
            match last {
                Listener::Payload(callback) => callback(value),
                Listener::NotifyOnly(callback) => callback(),
            }
        }
    }

    /// Register a listener for every future value
    pub fn listen<L>(&self, listener: L) -> ListenerGuard<T>
    where L: IntoListener<T> {
        let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
        match self.0.listeners.write() {
            Ok(mut listeners) => listeners.insert(id, listener.into_listener()),
            Err(poisoned) => poisoned.into_inner().insert(id, listener.into_listener()),
        };
        ListenerGuard { inner: Arc::downgrade(&self.0), id }
    }

    /// Receive every future value through an async [`Subscription`]
    pub fn subscribe(&self) -> Subscription<T>
    where T: Send + Sync + 'static {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let guard = self.listen(tx);
        Subscription::new(guard, rx)
    }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            match inner.listeners.write() {
                Ok(mut listeners) => listeners.remove(&self.id),
                Err(poisoned) => poisoned.into_inner().remove(&self.id),
            };
        }
    }
}

impl<F, T> IntoListener<T> for F
where F: Fn(T) + Send + Sync + 'static
{
    fn into_listener(self) -> Listener<T> { Listener::Payload(Arc::new(self)) }
}

impl<T> IntoListener<T> for Listener<T> {
    fn into_listener(self) -> Listener<T> { self }
}

impl<T> IntoListener<T> for Arc<dyn Fn() + Send + Sync + 'static> {
    fn into_listener(self) -> Listener<T> { Listener::NotifyOnly(self) }
}

impl<T> IntoListener<T> for tokio::sync::mpsc::UnboundedSender<T>
where T: Send + Sync + 'static
{
    fn into_listener(self) -> Listener<T> {
        Listener::Payload(Arc::new(move |value| {
            // receiver gone means the subscriber lost interest
            let _ = self.send(value);
        }))
    }
}

impl<T> IntoListener<T> for std::sync::mpsc::Sender<T>
where T: Send + Sync + 'static
{
    fn into_listener(self) -> Listener<T> {
        Listener::Payload(Arc::new(move |value| {
            let _ = self.send(value);
        }))
    }
}
