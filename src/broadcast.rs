//! Listener registration with explicit subscription handles.
//!
//! A listener stays registered until its [`Subscription`] is passed back to
//! [`Broadcaster::unsubscribe`]. Dropping the handle does not unregister it.

use log::debug;

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Handle identifying one registered listener.
#[must_use = "keep the subscription to be able to unsubscribe"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Delivers events of type `E` to every registered listener, in registration order.
pub struct Broadcaster<E> {
    next_id: u64,
    listeners: Vec<(u64, Listener<E>)>,
}

impl<E> Default for Broadcaster<E> {
    fn default() -> Self {
        Self { next_id: 1, listeners: Vec::new() }
    }
}

impl<E> std::fmt::Debug for Broadcaster<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Broadcaster<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        debug!("[Broadcast] Listener {} registered ({} total)", id, self.listeners.len());
        Subscription { id }
    }

    /// Remove a listener. Returns false if it was already removed.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != subscription.id);
        before != self.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn broadcast(&mut self, event: &E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }
}
