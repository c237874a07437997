use core::cmp::Ordering;
use std::collections::BTreeMap;

use crate::{IndexError, ItemKey};

/// Identifies an interval.
///
/// Anchored intervals come from real query results. The two logical sentinels hold live items
/// whose position relative to fetched data is not known yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntervalId {
    Anchored(u64),
    LogicalHead,
    LogicalTail,
}

impl IntervalId {
    pub fn is_logical(self) -> bool {
        !matches!(self, Self::Anchored(_))
    }
}

/// Which sentinel a logical interval stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicalSide {
    Head,
    Tail,
}

impl LogicalSide {
    pub fn id(self) -> IntervalId {
        match self {
            Self::Head => IntervalId::LogicalHead,
            Self::Tail => IntervalId::LogicalTail,
        }
    }
}

/// A contiguous, sorted run of item IDs.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval<K> {
    pub id: IntervalId,
    pub item_ids: Vec<K>,
    pub has_more_head: bool,
    pub has_more_tail: bool,
    /// No data precedes this window.
    pub is_head: bool,
    /// No data follows this window.
    pub is_tail: bool,
}

impl<K: ItemKey> Interval<K> {
    pub fn anchored(id: u64, item_ids: Vec<K>) -> Self {
        Self {
            id: IntervalId::Anchored(id),
            item_ids,
            has_more_head: true,
            has_more_tail: true,
            is_head: false,
            is_tail: false,
        }
    }

    pub fn logical(side: LogicalSide) -> Self {
        Self {
            id: side.id(),
            item_ids: Vec::new(),
            has_more_head: true,
            has_more_tail: true,
            is_head: false,
            is_tail: false,
        }
    }

    pub fn is_logical(&self) -> bool {
        self.id.is_logical()
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn first(&self) -> Option<&K> {
        self.item_ids.first()
    }

    pub fn last(&self) -> Option<&K> {
        self.item_ids.last()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.item_ids.contains(id)
    }

    pub fn position(&self, id: &K) -> Option<usize> {
        self.item_ids.iter().position(|k| k == id)
    }

    /// Marks the head edge as anchored: nothing precedes this window.
    pub fn close_head(&mut self) {
        self.is_head = true;
        self.has_more_head = false;
    }

    /// Marks the tail edge as anchored: nothing follows this window.
    pub fn close_tail(&mut self) {
        self.is_tail = true;
        self.has_more_tail = false;
    }
}

/// Result of the plateau-aware search primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Located {
    /// Index of the item (matched by ID) within its plateau, if present.
    pub current_index: Option<usize>,
    /// Where an item with this sort key would be inserted: just past its plateau.
    pub insertion_index: usize,
}

/// Locates `item` within `ids`, which must be sorted under `cmp`.
///
/// Binary search finds the plateau of entries comparing equal to `item`; the plateau is then
/// scanned by ID so that distinct items sharing a sort key are told apart. IDs that the lookup
/// cannot resolve surface as [`IndexError::MissingItem`].
pub fn locate_by_item<'a, K, T, F, C>(
    ids: &[K],
    id: &K,
    item: &T,
    lookup: F,
    cmp: C,
) -> Result<Located, IndexError<K>>
where
    K: ItemKey,
    T: 'a,
    F: Fn(&K) -> Option<&'a T>,
    C: Fn(&T, &T) -> Ordering,
{
    let resolve = |i: usize| lookup(&ids[i]).ok_or_else(|| IndexError::MissingItem(ids[i].clone()));

    let (mut lo, mut hi) = (0usize, ids.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp(resolve(mid)?, item) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    let lower = lo;

    hi = ids.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp(resolve(mid)?, item) == Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    let upper = lo;

    let current_index = (lower..upper).find(|&i| ids[i] == *id);
    Ok(Located {
        current_index,
        insertion_index: upper,
    })
}

/// Storage for anchored intervals plus the two logical sentinels.
#[derive(Clone, Debug)]
pub struct IntervalSet<K> {
    anchored: BTreeMap<u64, Interval<K>>,
    logical_head: Option<Interval<K>>,
    logical_tail: Option<Interval<K>>,
    next_id: u64,
}

impl<K: ItemKey> Default for IntervalSet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ItemKey> IntervalSet<K> {
    pub fn new() -> Self {
        Self {
            anchored: BTreeMap::new(),
            logical_head: None,
            logical_tail: None,
            next_id: 1,
        }
    }

    pub fn clear(&mut self) {
        self.anchored.clear();
        self.logical_head = None;
        self.logical_tail = None;
    }

    pub fn is_empty(&self) -> bool {
        self.anchored.is_empty() && self.logical_head.is_none() && self.logical_tail.is_none()
    }

    /// Number of intervals, sentinels included.
    pub fn len(&self) -> usize {
        self.anchored.len()
            + usize::from(self.logical_head.is_some())
            + usize::from(self.logical_tail.is_some())
    }

    /// Stores a new anchored interval and returns its ID.
    pub fn insert_anchored(&mut self, mut interval: Interval<K>) -> IntervalId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        interval.id = IntervalId::Anchored(id);
        self.anchored.insert(id, interval);
        IntervalId::Anchored(id)
    }

    pub fn get(&self, id: IntervalId) -> Option<&Interval<K>> {
        match id {
            IntervalId::Anchored(n) => self.anchored.get(&n),
            IntervalId::LogicalHead => self.logical_head.as_ref(),
            IntervalId::LogicalTail => self.logical_tail.as_ref(),
        }
    }

    pub fn get_mut(&mut self, id: IntervalId) -> Option<&mut Interval<K>> {
        match id {
            IntervalId::Anchored(n) => self.anchored.get_mut(&n),
            IntervalId::LogicalHead => self.logical_head.as_mut(),
            IntervalId::LogicalTail => self.logical_tail.as_mut(),
        }
    }

    pub fn remove(&mut self, id: IntervalId) -> Option<Interval<K>> {
        match id {
            IntervalId::Anchored(n) => self.anchored.remove(&n),
            IntervalId::LogicalHead => self.logical_head.take(),
            IntervalId::LogicalTail => self.logical_tail.take(),
        }
    }

    /// Re-stores an interval under its existing ID.
    pub fn put(&mut self, interval: Interval<K>) {
        match interval.id {
            IntervalId::Anchored(n) => {
                self.anchored.insert(n, interval);
            }
            IntervalId::LogicalHead => self.logical_head = Some(interval),
            IntervalId::LogicalTail => self.logical_tail = Some(interval),
        }
    }

    pub fn anchored(&self) -> impl Iterator<Item = &Interval<K>> {
        self.anchored.values()
    }

    pub fn anchored_ids(&self) -> Vec<IntervalId> {
        self.anchored.keys().map(|&n| IntervalId::Anchored(n)).collect()
    }

    pub fn logical(&self, side: LogicalSide) -> Option<&Interval<K>> {
        self.get(side.id())
    }

    /// Returns the sentinel for `side`, creating it empty if absent.
    pub fn logical_mut(&mut self, side: LogicalSide) -> &mut Interval<K> {
        let slot = match side {
            LogicalSide::Head => &mut self.logical_head,
            LogicalSide::Tail => &mut self.logical_tail,
        };
        slot.get_or_insert_with(|| Interval::logical(side))
    }

    /// Snapshot of every interval, anchored first (in creation order), then sentinels.
    pub fn all(&self) -> Vec<Interval<K>> {
        self.anchored
            .values()
            .chain(self.logical_head.iter())
            .chain(self.logical_tail.iter())
            .cloned()
            .collect()
    }

    /// The interval holding `id`, if any.
    pub fn containing(&self, id: &K) -> Option<IntervalId> {
        self.anchored
            .values()
            .chain(self.logical_head.iter())
            .chain(self.logical_tail.iter())
            .find(|iv| iv.contains(id))
            .map(|iv| iv.id)
    }

    /// The anchored interval whose head edge is anchored.
    pub fn head_interval(&self) -> Option<IntervalId> {
        self.anchored.values().find(|iv| iv.is_head).map(|iv| iv.id)
    }

    /// The anchored interval whose tail edge is anchored.
    pub fn tail_interval(&self) -> Option<IntervalId> {
        self.anchored.values().find(|iv| iv.is_tail).map(|iv| iv.id)
    }
}
