//! Cursor derivation: turning a freshly fetched page into updated "more data" flags.
//!
//! Sources that do not hand out page tokens (message history queried by timestamp or ID bounds,
//! for instance) leave the engine to infer whether either edge of the dataset has been reached.
//! All strategies see the locally filtered page for edge comparisons and the raw page length for
//! size checks, so that client-side filtering cannot fake an exhausted edge.
use core::cmp::Ordering;

use crate::{Direction, ItemKey};

/// What a query shape asked for, as far as edge derivation is concerned.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PageAnchor<K> {
    /// Unbounded: the query starts from a dataset edge.
    #[default]
    None,
    /// Items preceding a bound (e.g. `created_at_before`, `id_lt`).
    Headward,
    /// Items following a bound (e.g. `created_at_after`, `id_gt`).
    Tailward,
    Offset(usize),
    /// A window centered on an item ID.
    IdAround(K),
    /// A window centered on an instant (milliseconds since epoch).
    TimeAround(i64),
}

/// Everything a strategy may look at.
pub struct DeriveContext<'a, K, T> {
    pub direction: Option<Direction>,
    pub anchor: &'a PageAnchor<K>,
    /// The page after local filtering, in canonical order.
    pub page: &'a [T],
    /// Length of the page as returned by the source, before local filtering.
    pub raw_len: usize,
    pub requested_page_size: usize,
    /// Edges of the interval the page continues, if any.
    pub interval_first: Option<&'a T>,
    pub interval_last: Option<&'a T>,
    pub has_more_head: bool,
    pub has_more_tail: bool,
    pub get_item_id: &'a dyn Fn(&T) -> K,
    pub compare: &'a dyn Fn(&T, &T) -> Ordering,
    pub time_of: &'a dyn Fn(&T) -> Option<i64>,
}

impl<K, T> DeriveContext<'_, K, T> {
    fn unchanged(&self) -> Derived {
        Derived {
            has_more_head: self.has_more_head,
            has_more_tail: self.has_more_tail,
        }
    }

    fn is_full(&self) -> bool {
        self.raw_len >= self.requested_page_size
    }

    /// The page's head edge reaches (or passes) the interval's head edge.
    fn head_edge_coincides(&self) -> bool {
        match (self.page.first(), self.interval_first) {
            (Some(p), Some(i)) => (self.compare)(p, i) != Ordering::Greater,
            _ => true,
        }
    }

    /// The page's tail edge reaches (or passes) the interval's tail edge.
    fn tail_edge_coincides(&self) -> bool {
        match (self.page.last(), self.interval_last) {
            (Some(p), Some(i)) => (self.compare)(p, i) != Ordering::Less,
            _ => true,
        }
    }

    /// Applies the centered-window rules given which half of the page the anchor sits in.
    fn centered(&self, side: Ordering) -> Derived {
        let mut out = self.unchanged();
        match side {
            Ordering::Less => {
                if self.head_edge_coincides() {
                    out.has_more_head = false;
                }
                out.has_more_tail = true;
            }
            Ordering::Greater => {
                if self.tail_edge_coincides() {
                    out.has_more_tail = false;
                }
                out.has_more_head = true;
            }
            Ordering::Equal => {
                out.has_more_head = true;
                out.has_more_tail = true;
            }
        }
        out
    }
}

/// Updated edge flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Derived {
    pub has_more_head: bool,
    pub has_more_tail: bool,
}

/// A pluggable edge-derivation algorithm.
pub trait CursorDerivation<K, T>: Send + Sync {
    fn derive(&self, ctx: &DeriveContext<'_, K, T>) -> Derived;
}

/// Bound-based paging in one direction.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearDerivation;

impl<K, T> CursorDerivation<K, T> for LinearDerivation {
    fn derive(&self, ctx: &DeriveContext<'_, K, T>) -> Derived {
        let queried = match ctx.anchor {
            PageAnchor::Headward => Direction::Headward,
            PageAnchor::Tailward | PageAnchor::Offset(_) => Direction::Tailward,
            PageAnchor::None => ctx.direction.unwrap_or(Direction::Tailward),
            PageAnchor::IdAround(_) | PageAnchor::TimeAround(_) => return ctx.unchanged(),
        };

        let mut out = ctx.unchanged();
        let full = ctx.is_full();
        match queried {
            Direction::Headward => {
                if ctx.head_edge_coincides() {
                    out.has_more_head = full;
                }
            }
            Direction::Tailward => {
                if ctx.tail_edge_coincides() {
                    out.has_more_tail = full;
                }
            }
        }

        // An unbounded query with nothing loaded before it starts at the opposite dataset edge.
        let cold = ctx.interval_first.is_none() && ctx.interval_last.is_none();
        if cold && matches!(ctx.anchor, PageAnchor::None | PageAnchor::Offset(0)) {
            match queried {
                Direction::Tailward => out.has_more_head = false,
                Direction::Headward => out.has_more_tail = false,
            }
        }
        out
    }
}

/// Windows centered on an item ID (`id_around`).
#[derive(Clone, Copy, Debug, Default)]
pub struct IdAnchoredDerivation;

impl<K: ItemKey, T> CursorDerivation<K, T> for IdAnchoredDerivation {
    fn derive(&self, ctx: &DeriveContext<'_, K, T>) -> Derived {
        let PageAnchor::IdAround(anchor) = ctx.anchor else {
            return ctx.unchanged();
        };
        let Some(i) = ctx
            .page
            .iter()
            .position(|item| (ctx.get_item_id)(item) == *anchor)
        else {
            pdebug!(?anchor, "anchor id absent from page; edges unchanged");
            return ctx.unchanged();
        };
        // Item `i` is centered at `i + 0.5`; the page midpoint is `len / 2`. Doubled to stay integral.
        let side = (2 * i + 1).cmp(&ctx.page.len());
        ctx.centered(side)
    }
}

/// Windows centered on an instant (`created_at_around`).
#[derive(Clone, Copy, Debug, Default)]
pub struct TimeAnchoredDerivation;

impl<K, T> CursorDerivation<K, T> for TimeAnchoredDerivation {
    fn derive(&self, ctx: &DeriveContext<'_, K, T>) -> Derived {
        let PageAnchor::TimeAround(at) = *ctx.anchor else {
            return ctx.unchanged();
        };
        if !ctx.is_full() {
            return Derived {
                has_more_head: false,
                has_more_tail: false,
            };
        }

        let times: Vec<i64> = ctx
            .page
            .iter()
            .map(|item| (ctx.time_of)(item).unwrap_or(i64::MIN))
            .collect();
        let ascending = times.first() <= times.last();
        let insertion = if ascending {
            times.partition_point(|&t| t < at)
        } else {
            times.partition_point(|&t| t > at)
        };
        let side = (2 * insertion).cmp(&ctx.page.len());
        ctx.centered(side)
    }
}

/// Picks the built-in strategy matching `anchor`.
pub fn derivation_for<K: ItemKey, T: 'static>(anchor: &PageAnchor<K>) -> &'static dyn CursorDerivation<K, T> {
    match anchor {
        PageAnchor::IdAround(_) => &IdAnchoredDerivation,
        PageAnchor::TimeAround(_) => &TimeAnchoredDerivation,
        _ => &LinearDerivation,
    }
}
