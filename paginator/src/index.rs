use alloc::sync::Arc;
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::ItemKey;

/// An item index shared between paginators that operate on the same dataset.
pub type SharedItemIndex<K, T> = Arc<RwLock<ItemIndex<K, T>>>;

/// Canonical ID-keyed store of item snapshots.
///
/// Intervals and projections refer to items by ID only; this index is the single place where the
/// latest snapshot of each item lives. Snapshots are replaced wholesale on every upsert, never
/// mutated in place. There is no automatic eviction: long-lived owners should call
/// [`ItemIndex::retain`] with their own liveness policy.
pub struct ItemIndex<K, T> {
    items: HashMap<K, T>,
    get_item_id: Arc<dyn Fn(&T) -> K + Send + Sync>,
}

impl<K: ItemKey, T: Clone> ItemIndex<K, T> {
    pub fn new(get_item_id: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::with_id_fn(Arc::new(get_item_id))
    }

    pub fn with_id_fn(get_item_id: Arc<dyn Fn(&T) -> K + Send + Sync>) -> Self {
        Self {
            items: HashMap::new(),
            get_item_id,
        }
    }

    /// Wraps the index for sharing across paginators.
    pub fn into_shared(self) -> SharedItemIndex<K, T> {
        Arc::new(RwLock::new(self))
    }

    pub fn id_of(&self, item: &T) -> K {
        (self.get_item_id)(item)
    }

    /// Upserts one item, returning the snapshot it replaced.
    pub fn set_one(&mut self, item: T) -> Option<T> {
        let id = self.id_of(&item);
        self.items.insert(id, item)
    }

    pub fn set_many(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.set_one(item);
        }
    }

    pub fn get(&self, id: &K) -> Option<&T> {
        self.items.get(id)
    }

    pub fn has(&self, id: &K) -> bool {
        self.items.contains_key(id)
    }

    pub fn remove(&mut self, id: &K) -> Option<T> {
        self.items.remove(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of all `(id, item)` pairs, in no particular order.
    pub fn entries(&self) -> Vec<(K, T)> {
        self.items
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Snapshot of all items, in no particular order.
    pub fn values(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&K, &T) -> bool) {
        self.items.retain(|k, v| keep(k, v));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<K, T> core::fmt::Debug for ItemIndex<K, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ItemIndex")
            .field("len", &self.items.len())
            .finish_non_exhaustive()
    }
}
