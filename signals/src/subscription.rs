use tokio::sync::mpsc::UnboundedReceiver;

use crate::ListenerGuard;

/// Async receiving end of a [`crate::Broadcast`] or [`crate::Latest`].
/// Values queue up until received; dropping the subscription detaches it.
pub struct Subscription<T> {
    _guard: ListenerGuard<T>,
    rx: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(guard: ListenerGuard<T>, rx: UnboundedReceiver<T>) -> Self { Self { _guard: guard, rx } }

    /// Wait for the next value. Returns `None` once the source is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<T> { self.rx.recv().await }

    /// The next queued value, if any, without waiting
    pub fn try_recv(&mut self) -> Option<T> { self.rx.try_recv().ok() }

    /// Everything queued so far
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }
}
