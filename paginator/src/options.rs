use alloc::sync::Arc;

use crate::cursor::CursorDerivation;
use crate::filter::{FieldResolver, Filter, ResolverRegistry};
use crate::index::SharedItemIndex;
use crate::sort::{Comparator, PathResolver, Sort, TieBreaker};
use crate::{Cursor, Document, PaginatorState};

/// A callback fired when the engine's state changes.
pub type OnChangeCallback<T> = Arc<dyn Fn(&PaginatorState<T>) + Send + Sync>;

/// Milliseconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// The wall clock.
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// How page ingestion chooses which existing intervals to merge with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Overlapping intervals merge, and an explicit anchored target merges regardless of overlap
    /// (the caller asserts adjacency).
    #[default]
    Default,
    /// Only true sort-range overlaps merge; a disjoint page always becomes its own interval.
    StrictOverlapOnly,
}

/// How a resolved query updates edge flags and cursors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PaginationMode {
    /// The source returns headward/tailward tokens; their presence is the "more data" signal.
    #[default]
    Cursor,
    /// Offset/limit paging toward the tail.
    Offset,
    /// Edges are inferred from page contents by a [`CursorDerivation`] strategy.
    Derived,
}

/// Where item snapshots live.
pub enum IndexConfig<K, T> {
    /// A private index owned by the engine.
    Owned,
    /// An index shared with other engines over the same dataset.
    Shared(SharedItemIndex<K, T>),
    /// No index: intervals are not tracked and pages go straight into `state.items`.
    Disabled,
}

impl<K, T> Default for IndexConfig<K, T> {
    fn default() -> Self {
        Self::Owned
    }
}

impl<K, T> Clone for IndexConfig<K, T> {
    fn clone(&self) -> Self {
        match self {
            Self::Owned => Self::Owned,
            Self::Shared(index) => Self::Shared(Arc::clone(index)),
            Self::Disabled => Self::Disabled,
        }
    }
}

/// Configuration for [`crate::PaginationEngine`].
///
/// Cheap to clone: callbacks are stored in `Arc`s.
pub struct PaginatorOptions<K, T> {
    pub get_item_id: Arc<dyn Fn(&T) -> K + Send + Sync>,
    /// Resolves sort fields on items.
    pub resolve_path: PathResolver<T>,
    pub sort: Sort,
    pub tie_breaker: TieBreaker<T>,
    /// Replaces the comparator compiled from `sort` when set.
    pub sort_comparator: Option<Comparator<T>>,
    /// Local filter re-applied to live updates.
    pub filter: Filter,
    pub filter_resolvers: ResolverRegistry<T>,
    pub item_index: IndexConfig<K, T>,
    /// Existing items keep their display slot when updated.
    pub lock_item_order: bool,
    pub merge_policy: MergePolicy,
    pub mode: PaginationMode,
    /// Overrides the built-in strategy selection in [`PaginationMode::Derived`].
    pub derivation: Option<Arc<dyn CursorDerivation<K, T>>>,
    /// Field holding the item timestamp for time-anchored windows. Defaults to the first sort
    /// term's field.
    pub time_field: Option<String>,
    pub initial_cursor: Option<Cursor>,
    pub initial_offset: usize,
    pub clock: Clock,
    pub on_change: Option<OnChangeCallback<T>>,
}

impl<K, T: Document + 'static> PaginatorOptions<K, T> {
    /// Creates options for items that expose their fields via [`Document`].
    pub fn new(get_item_id: impl Fn(&T) -> K + Send + Sync + 'static) -> Self {
        Self::new_with_resolver(get_item_id, |item: &T, path: &str| item.field(path))
    }
}

impl<K, T: 'static> PaginatorOptions<K, T> {
    /// Creates options with a custom field resolver used for sorting and as the filter fallback.
    pub fn new_with_resolver(
        get_item_id: impl Fn(&T) -> K + Send + Sync + 'static,
        resolve_path: impl Fn(&T, &str) -> crate::Value + Send + Sync + 'static,
    ) -> Self {
        let resolve_path: PathResolver<T> = Arc::new(resolve_path);
        Self {
            get_item_id: Arc::new(get_item_id),
            filter_resolvers: ResolverRegistry::with_fallback(Arc::clone(&resolve_path)),
            resolve_path,
            sort: Sort::new(),
            tie_breaker: TieBreaker::ById,
            sort_comparator: None,
            filter: Filter::default(),
            item_index: IndexConfig::Owned,
            lock_item_order: false,
            merge_policy: MergePolicy::Default,
            mode: PaginationMode::Cursor,
            derivation: None,
            time_field: None,
            initial_cursor: None,
            initial_offset: 0,
            clock: system_clock(),
            on_change: None,
        }
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_tie_breaker(mut self, tie_breaker: TieBreaker<T>) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    pub fn with_sort_comparator(
        mut self,
        cmp: impl Fn(&T, &T) -> core::cmp::Ordering + Send + Sync + 'static,
    ) -> Self {
        self.sort_comparator = Some(Arc::new(cmp));
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_filter_resolver(mut self, resolver: FieldResolver<T>) -> Self {
        self.filter_resolvers.register(resolver);
        self
    }

    pub fn with_item_index(mut self, index: SharedItemIndex<K, T>) -> Self {
        self.item_index = IndexConfig::Shared(index);
        self
    }

    /// Disables interval tracking; pages are written straight into `state.items`.
    pub fn with_state_only(mut self) -> Self {
        self.item_index = IndexConfig::Disabled;
        self
    }

    pub fn with_lock_item_order(mut self, lock_item_order: bool) -> Self {
        self.lock_item_order = lock_item_order;
        self
    }

    pub fn with_merge_policy(mut self, merge_policy: MergePolicy) -> Self {
        self.merge_policy = merge_policy;
        self
    }

    pub fn with_mode(mut self, mode: PaginationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_derivation(mut self, derivation: impl CursorDerivation<K, T> + 'static) -> Self {
        self.derivation = Some(Arc::new(derivation));
        self
    }

    pub fn with_time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = Some(field.into());
        self
    }

    pub fn with_initial_cursor(mut self, cursor: Option<Cursor>) -> Self {
        self.initial_cursor = cursor;
        self
    }

    pub fn with_initial_offset(mut self, offset: usize) -> Self {
        self.initial_offset = offset;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_on_change(
        mut self,
        on_change: Option<impl Fn(&PaginatorState<T>) + Send + Sync + 'static>,
    ) -> Self {
        self.on_change = on_change.map(|f| Arc::new(f) as _);
        self
    }
}

impl<K, T> Clone for PaginatorOptions<K, T> {
    fn clone(&self) -> Self {
        Self {
            get_item_id: Arc::clone(&self.get_item_id),
            resolve_path: Arc::clone(&self.resolve_path),
            sort: self.sort.clone(),
            tie_breaker: self.tie_breaker.clone(),
            sort_comparator: self.sort_comparator.clone(),
            filter: self.filter.clone(),
            filter_resolvers: self.filter_resolvers.clone(),
            item_index: self.item_index.clone(),
            lock_item_order: self.lock_item_order,
            merge_policy: self.merge_policy,
            mode: self.mode,
            derivation: self.derivation.clone(),
            time_field: self.time_field.clone(),
            initial_cursor: self.initial_cursor.clone(),
            initial_offset: self.initial_offset,
            clock: Arc::clone(&self.clock),
            on_change: self.on_change.clone(),
        }
    }
}

impl<K, T> core::fmt::Debug for PaginatorOptions<K, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let index = match &self.item_index {
            IndexConfig::Owned => "owned",
            IndexConfig::Shared(_) => "shared",
            IndexConfig::Disabled => "disabled",
        };
        f.debug_struct("PaginatorOptions")
            .field("sort", &self.sort)
            .field("tie_breaker", &self.tie_breaker)
            .field("filter", &self.filter)
            .field("filter_resolvers", &self.filter_resolvers)
            .field("item_index", &index)
            .field("lock_item_order", &self.lock_item_order)
            .field("merge_policy", &self.merge_policy)
            .field("mode", &self.mode)
            .field("time_field", &self.time_field)
            .field("initial_cursor", &self.initial_cursor)
            .field("initial_offset", &self.initial_offset)
            .finish_non_exhaustive()
    }
}
