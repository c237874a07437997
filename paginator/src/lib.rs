//! A headless windowed pagination cache.
//!
//! For an async query driver (debouncing, retries, observable state), see the
//! `paginator-adapter` crate.
//!
//! This crate keeps paginated data from a remote source consistent locally:
//! - a canonical, ID-keyed item index, optionally shared between paginators
//! - sorted, de-duplicated intervals (fetched windows of the ordered dataset) that merge when
//!   their sort ranges overlap
//! - live-update placement by sort key, including logical head/tail sentinels for items that
//!   sort beyond every known window
//! - a MongoDB-like local filter language and multi-field sorting over dynamically typed values
//! - ephemeral boosts that pin items to the front of the projected list
//!
//! It performs no I/O and is UI-agnostic: the caller feeds it resolved pages and live updates,
//! and observes [`PaginatorState`].
#![forbid(unsafe_code)]

extern crate alloc;

#[macro_use]
mod macros;

mod boost;
mod cursor;
mod engine;
mod error;
mod filter;
mod index;
mod interval;
mod key;
mod normalize;
mod options;
mod sort;
mod state;
mod value;

#[cfg(test)]
mod tests;

pub use boost::{Boost, BoostOptions, BoostOverlay, DEFAULT_BOOST_TTL_MS};
pub use cursor::{
    CursorDerivation, DeriveContext, Derived, IdAnchoredDerivation, LinearDerivation, PageAnchor,
    TimeAnchoredDerivation, derivation_for,
};
pub use engine::{IngestOptions, PaginationEngine, QueryOutcome};
pub use error::IndexError;
pub use filter::{
    FieldResolver, Filter, Operator, ResolverRegistry, item_matches_filter, tokenize,
};
pub use index::{ItemIndex, SharedItemIndex};
pub use interval::{Interval, IntervalId, IntervalSet, Located, LogicalSide, locate_by_item};
pub use key::ItemKey;
pub use normalize::{
    Comparable, compare_values, contains_value, normalize_compared_values, set_equal, values_equal,
};
pub use options::{
    Clock, IndexConfig, MergePolicy, OnChangeCallback, PaginationMode, PaginatorOptions,
    system_clock,
};
pub use sort::{Comparator, PathResolver, Sort, SortDirection, SortTerm, TieBreaker, make_comparator};
pub use state::{Cursor, Direction, PaginatorState};
pub use value::{Document, Value};
