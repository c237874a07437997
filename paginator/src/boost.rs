use core::cmp::Ordering;
use std::collections::HashMap;

use crate::ItemKey;

/// Default lifetime of a boost.
pub const DEFAULT_BOOST_TTL_MS: i64 = 15_000;

/// A time-boxed display priority for one item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Boost {
    /// Expiry instant, milliseconds since epoch.
    pub until_ms: i64,
    /// Higher sequence numbers rank first among boosted items.
    pub seq: i64,
}

/// How long a boost lives and how it ranks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoostOptions {
    /// Lifetime relative to now. Ignored when `until_ms` is set.
    pub ttl_ms: Option<i64>,
    /// Absolute expiry.
    pub until_ms: Option<i64>,
    pub seq: Option<i64>,
}

impl BoostOptions {
    pub fn ttl(ttl_ms: i64) -> Self {
        Self {
            ttl_ms: Some(ttl_ms),
            ..Self::default()
        }
    }

    pub fn until(until_ms: i64) -> Self {
        Self {
            until_ms: Some(until_ms),
            ..Self::default()
        }
    }

    pub fn with_seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }
}

/// Ephemeral boosts keyed by item ID.
///
/// Boosts only perturb the comparator used to project items into state; canonical interval order
/// never sees them. Expired entries are dropped lazily, whenever the overlay is consulted through
/// [`BoostOverlay::purge_expired`].
#[derive(Clone, Debug)]
pub struct BoostOverlay<K> {
    boosts: HashMap<K, Boost>,
    max_seq: i64,
}

impl<K: ItemKey> Default for BoostOverlay<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ItemKey> BoostOverlay<K> {
    pub fn new() -> Self {
        Self {
            boosts: HashMap::new(),
            max_seq: 0,
        }
    }

    /// Records or refreshes a boost.
    pub fn boost(&mut self, id: K, opts: BoostOptions, now_ms: i64) -> Boost {
        let until_ms = opts
            .until_ms
            .unwrap_or_else(|| now_ms.saturating_add(opts.ttl_ms.unwrap_or(DEFAULT_BOOST_TTL_MS)));
        let boost = Boost {
            until_ms,
            seq: opts.seq.unwrap_or(0),
        };
        self.max_seq = self.max_seq.max(boost.seq);
        self.boosts.insert(id, boost);
        boost
    }

    pub fn remove(&mut self, id: &K) -> Option<Boost> {
        let removed = self.boosts.remove(id);
        if removed.is_some() {
            self.recompute_max_seq();
        }
        removed
    }

    /// Drops every boost whose expiry is at or before `now_ms`. Returns how many were dropped.
    pub fn purge_expired(&mut self, now_ms: i64) -> usize {
        let before = self.boosts.len();
        self.boosts.retain(|_, b| b.until_ms > now_ms);
        let purged = before - self.boosts.len();
        if purged > 0 {
            ptrace!(purged, "purged expired boosts");
            self.recompute_max_seq();
        }
        purged
    }

    pub fn clear(&mut self) {
        self.boosts.clear();
        self.max_seq = 0;
    }

    pub fn get(&self, id: &K) -> Option<Boost> {
        self.boosts.get(id).copied()
    }

    pub fn is_boosted(&self, id: &K, now_ms: i64) -> bool {
        self.boosts.get(id).is_some_and(|b| b.until_ms > now_ms)
    }

    pub fn max_seq(&self) -> i64 {
        self.max_seq
    }

    /// IDs with a recorded boost, expired ones included until the next purge.
    pub fn ids(&self) -> impl Iterator<Item = &K> {
        self.boosts.keys()
    }

    pub fn len(&self) -> usize {
        self.boosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boosts.is_empty()
    }

    /// Boost-only ordering between two IDs.
    ///
    /// `Some` when the overlay decides: a boosted item precedes an unboosted one, and between two
    /// boosted items the higher `seq` precedes. `None` means fall through to the base comparator.
    pub fn compare(&self, a: &K, b: &K) -> Option<Ordering> {
        match (self.boosts.get(a), self.boosts.get(b)) {
            (Some(x), Some(y)) => match y.seq.cmp(&x.seq) {
                Ordering::Equal => None,
                ord => Some(ord),
            },
            (Some(_), None) => Some(Ordering::Less),
            (None, Some(_)) => Some(Ordering::Greater),
            (None, None) => None,
        }
    }

    fn recompute_max_seq(&mut self) {
        self.max_seq = self.boosts.values().map(|b| b.seq).max().unwrap_or(0);
    }
}
