use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

struct StoreInner<S> {
    value: RwLock<S>,
    listeners: Mutex<Vec<(u64, Listener<S>)>>,
    next_id: Mutex<u64>,
}

/// An observable value.
///
/// Listeners run synchronously on the writer's thread, outside any store lock.
pub struct StateStore<S> {
    inner: Arc<StoreInner<S>>,
}

impl<S> Clone for StateStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Clone + Send + Sync + 'static> StateStore<S> {
    pub fn new(value: S) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                value: RwLock::new(value),
                listeners: Mutex::new(Vec::new()),
                next_id: Mutex::new(0),
            }),
        }
    }

    pub fn get(&self) -> S {
        self.inner.value.read().clone()
    }

    pub fn replace(&self, value: S) {
        *self.inner.value.write() = value;
        self.emit();
    }

    pub fn patch(&self, f: impl FnOnce(&mut S)) {
        f(&mut self.inner.value.write());
        self.emit();
    }

    /// Registers `listener` and immediately calls it with the current value.
    ///
    /// The listener stays registered until the returned [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&S) + Send + Sync + 'static) -> Subscription<S> {
        let listener: Listener<S> = Arc::new(listener);
        let id = {
            let mut next = self.inner.next_id.lock();
            *next += 1;
            *next
        };
        self.inner.listeners.lock().push((id, Arc::clone(&listener)));
        listener(&self.get());
        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn emit(&self) {
        let listeners: Vec<Listener<S>> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let value = self.get();
        for listener in listeners {
            listener(&value);
        }
    }
}

/// Keeps a [`StateStore`] listener registered.
pub struct Subscription<S> {
    store: Weak<StoreInner<S>>,
    id: u64,
}

impl<S> Subscription<S> {
    pub fn unsubscribe(self) {}
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            store.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl<S> core::fmt::Debug for Subscription<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
