use alloc::sync::Arc;
use core::cell::Cell;
use core::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::boost::{Boost, BoostOptions, BoostOverlay};
use crate::cursor::{DeriveContext, PageAnchor, derivation_for};
use crate::filter::item_matches_filter;
use crate::index::{ItemIndex, SharedItemIndex};
use crate::interval::{Interval, IntervalId, IntervalSet, Located, LogicalSide, locate_by_item};
use crate::normalize::as_date_ms;
use crate::options::{IndexConfig, MergePolicy, PaginationMode, PaginatorOptions};
use crate::sort::{Comparator, Sort, make_comparator};
use crate::{Cursor, Direction, Filter, IndexError, ItemKey, PaginatorState};

/// Per-page ingestion flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// No data precedes this page.
    pub is_head: bool,
    /// No data follows this page.
    pub is_tail: bool,
    /// Interval the page continues. Logical sentinels are ignored as targets.
    pub target: Option<IntervalId>,
    /// Overrides [`PaginatorOptions::merge_policy`].
    pub policy: Option<MergePolicy>,
    /// Activate the resulting interval and project it into `state.items`.
    pub set_active: bool,
}

/// A resolved query, handed to [`PaginationEngine::apply_query_result`].
#[derive(Clone, Debug)]
pub struct QueryOutcome<K, T> {
    pub direction: Direction,
    pub anchor: PageAnchor<K>,
    /// Page length as returned by the source, before local filtering.
    pub raw_len: usize,
    /// The page after local filtering.
    pub items: Vec<T>,
    /// Tokens returned alongside the page.
    pub cursor: Cursor,
    pub is_first_page: bool,
    pub page_size: usize,
}

/// Orders items for display: boosts first, then the canonical comparator.
struct Ranker<'a, K, T> {
    boosts: &'a BoostOverlay<K>,
    base: &'a Comparator<T>,
    get_item_id: &'a (dyn Fn(&T) -> K + Send + Sync),
}

impl<K: ItemKey, T> Ranker<'_, K, T> {
    fn cmp(&self, a: &T, b: &T) -> Ordering {
        self.boosts
            .compare(&(self.get_item_id)(a), &(self.get_item_id)(b))
            .unwrap_or_else(|| (self.base)(a, b))
    }

    /// Index just past the plateau `item` belongs to.
    fn insertion_index(&self, items: &[T], item: &T) -> usize {
        items.partition_point(|x| self.cmp(x, item) != Ordering::Greater)
    }
}

/// The windowed pagination engine.
///
/// Keeps a canonical, ID-keyed item index plus a set of sorted intervals (fetched windows of the
/// ordered dataset), and projects the active interval into an observable [`PaginatorState`].
///
/// The engine is synchronous and performs no I/O: a query driver (see the `paginator-adapter`
/// crate) feeds it resolved pages via [`Self::apply_query_result`] and live updates via
/// [`Self::ingest_item`].
pub struct PaginationEngine<K, T> {
    options: PaginatorOptions<K, T>,
    comparator: Comparator<T>,
    index: Option<SharedItemIndex<K, T>>,
    owns_index: bool,
    intervals: IntervalSet<K>,
    active: Option<IntervalId>,
    boosts: BoostOverlay<K>,
    state: PaginatorState<T>,

    notify_depth: Cell<usize>,
    notify_pending: Cell<bool>,
}

fn compile_comparator<K: ItemKey, T: 'static>(options: &PaginatorOptions<K, T>) -> Comparator<T> {
    if let Some(cmp) = &options.sort_comparator {
        return Arc::clone(cmp);
    }
    let tie_breaker = options
        .tie_breaker
        .clone()
        .into_comparator(Arc::clone(&options.get_item_id));
    make_comparator(&options.sort, Arc::clone(&options.resolve_path), tie_breaker)
}

impl<K: ItemKey, T: Clone + 'static> PaginationEngine<K, T> {
    pub fn new(options: PaginatorOptions<K, T>) -> Self {
        let comparator = compile_comparator(&options);
        let (index, owns_index) = match &options.item_index {
            IndexConfig::Owned => (
                Some(ItemIndex::with_id_fn(Arc::clone(&options.get_item_id)).into_shared()),
                true,
            ),
            IndexConfig::Shared(index) => (Some(Arc::clone(index)), false),
            IndexConfig::Disabled => (None, false),
        };
        pdebug!(
            sort_terms = options.sort.terms().len(),
            tracks_intervals = index.is_some(),
            mode = ?options.mode,
            "PaginationEngine::new"
        );
        let state = PaginatorState::initial(options.initial_cursor.clone(), options.initial_offset);
        Self {
            options,
            comparator,
            index,
            owns_index,
            intervals: IntervalSet::new(),
            active: None,
            boosts: BoostOverlay::new(),
            state,
            notify_depth: Cell::new(0),
            notify_pending: Cell::new(false),
        }
    }

    pub fn options(&self) -> &PaginatorOptions<K, T> {
        &self.options
    }

    pub fn state(&self) -> &PaginatorState<T> {
        &self.state
    }

    /// The canonical (unboosted) comparator.
    pub fn comparator(&self) -> Comparator<T> {
        Arc::clone(&self.comparator)
    }

    pub fn item_index(&self) -> Option<&SharedItemIndex<K, T>> {
        self.index.as_ref()
    }

    /// `false` in state-only mode.
    pub fn tracks_intervals(&self) -> bool {
        self.index.is_some()
    }

    pub fn intervals(&self) -> Vec<Interval<K>> {
        self.intervals.all()
    }

    pub fn interval(&self, id: IntervalId) -> Option<&Interval<K>> {
        self.intervals.get(id)
    }

    pub fn active_interval_id(&self) -> Option<IntervalId> {
        self.active
    }

    pub fn active_interval(&self) -> Option<&Interval<K>> {
        self.active.and_then(|id| self.intervals.get(id))
    }

    /// The interval holding `id`, logical sentinels included.
    pub fn interval_of(&self, id: &K) -> Option<IntervalId> {
        self.intervals.containing(id)
    }

    pub fn get_item(&self, id: &K) -> Option<T> {
        match &self.index {
            Some(index) => index.read().get(id).cloned(),
            None => self
                .state
                .items
                .as_ref()?
                .iter()
                .find(|item| self.id_of(item) == *id)
                .cloned(),
        }
    }

    pub fn boosts(&self) -> &BoostOverlay<K> {
        &self.boosts
    }

    fn id_of(&self, item: &T) -> K {
        (self.options.get_item_id)(item)
    }

    fn now(&self) -> i64 {
        (self.options.clock)()
    }

    fn ranker(&self) -> Ranker<'_, K, T> {
        Ranker {
            boosts: &self.boosts,
            base: &self.comparator,
            get_item_id: &*self.options.get_item_id,
        }
    }

    // --- notifications -------------------------------------------------------------------------

    fn notify_now(&self) {
        if let Some(cb) = &self.options.on_change {
            cb(&self.state);
        }
    }

    fn notify(&self) {
        if self.notify_depth.get() > 0 {
            self.notify_pending.set(true);
            return;
        }
        self.notify_now();
    }

    /// Batches multiple updates into a single `on_change` notification.
    pub fn batch_update(&mut self, f: impl FnOnce(&mut Self)) {
        let depth = self.notify_depth.get();
        self.notify_depth.set(depth.saturating_add(1));

        f(self);

        let depth = self.notify_depth.get();
        debug_assert!(depth > 0, "notify_depth underflow");
        let next = depth.saturating_sub(1);
        self.notify_depth.set(next);

        if next == 0 && self.notify_pending.replace(false) {
            self.notify_now();
        }
    }

    // --- state ---------------------------------------------------------------------------------

    /// Applies a partial state update and notifies.
    pub fn update_state(&mut self, f: impl FnOnce(&mut PaginatorState<T>)) {
        f(&mut self.state);
        self.notify();
    }

    pub fn set_loading(&mut self, is_loading: bool) {
        if self.state.is_loading == is_loading {
            return;
        }
        self.state.is_loading = is_loading;
        self.notify();
    }

    pub fn set_query_error(&mut self, error: Option<String>) {
        self.state.last_query_error = error;
        self.notify();
    }

    /// Replaces the state wholesale with the initial state and drops all intervals.
    ///
    /// The item index and boosts survive: the index may be shared, and boosts expire on their own.
    pub fn reset_state(&mut self) {
        pdebug!(intervals = self.intervals.len(), "reset_state");
        self.state =
            PaginatorState::initial(self.options.initial_cursor.clone(), self.options.initial_offset);
        self.intervals.clear();
        self.active = None;
        self.notify();
    }

    /// Replaces the projected items without touching intervals (offline pre-load).
    pub fn set_items(&mut self, mut items: Vec<T>) {
        if let Some(index) = &self.index {
            index.write().set_many(items.iter().cloned());
        }
        let now = self.now();
        self.boosts.purge_expired(now);
        let ranker = self.ranker();
        items.sort_by(|a, b| ranker.cmp(a, b));
        self.state.items = Some(items);
        self.notify();
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.options.filter = filter;
    }

    /// Replaces the sort, re-sorting every interval and the projection.
    pub fn set_sort(&mut self, sort: Sort) {
        self.options.sort = sort;
        self.options.sort_comparator = None;
        self.comparator = compile_comparator(&self.options);

        if let Some(index) = self.index.clone() {
            let idx = index.read();
            let cmp = Arc::clone(&self.comparator);
            let mut all = self.intervals.all();
            for iv in &mut all {
                iv.item_ids.sort_by(|a, b| match (idx.get(a), idx.get(b)) {
                    (Some(x), Some(y)) => cmp(x, y),
                    _ => Ordering::Equal,
                });
            }
            for iv in all {
                self.intervals.put(iv);
            }
            drop(idx);
            self.project_active();
        } else if let Some(mut items) = self.state.items.take() {
            let ranker = self.ranker();
            items.sort_by(|a, b| ranker.cmp(a, b));
            self.state.items = Some(items);
            self.notify();
        }
    }

    /// `true` when `item` passes the configured local filter.
    pub fn matches_filter(&self, item: &T) -> bool {
        self.options.filter.is_empty()
            || item_matches_filter(item, &self.options.filter, &self.options.filter_resolvers)
    }

    // --- boosts --------------------------------------------------------------------------------

    /// Boosts an item to the front of the projection until it expires.
    pub fn boost(&mut self, id: K, opts: BoostOptions) -> Boost {
        let now = self.now();
        self.boosts.purge_expired(now);
        let boost = self.boosts.boost(id, opts, now);
        self.resort_projection();
        boost
    }

    pub fn remove_boost(&mut self, id: &K) -> Option<Boost> {
        let removed = self.boosts.remove(id);
        if removed.is_some() {
            self.resort_projection();
        }
        removed
    }

    pub fn clear_boosts(&mut self) {
        self.boosts.clear();
        self.resort_projection();
    }

    pub fn is_boosted(&self, id: &K) -> bool {
        self.boosts.is_boosted(id, self.now())
    }

    pub fn boost_of(&self, id: &K) -> Option<Boost> {
        self.boosts
            .get(id)
            .filter(|boost| boost.until_ms > self.now())
    }

    /// Highest live boost sequence, for callers allocating the next one.
    pub fn max_boost_seq(&mut self) -> i64 {
        let now = self.now();
        self.boosts.purge_expired(now);
        self.boosts.max_seq()
    }

    /// The comparator used for projections: boosts first, then the canonical order.
    pub fn effective_comparator(&mut self) -> Comparator<T> {
        let now = self.now();
        self.boosts.purge_expired(now);
        let boosts = self.boosts.clone();
        let base = Arc::clone(&self.comparator);
        let get_item_id = Arc::clone(&self.options.get_item_id);
        Arc::new(move |a: &T, b: &T| {
            boosts
                .compare(&get_item_id(a), &get_item_id(b))
                .unwrap_or_else(|| base(a, b))
        })
    }

    fn resort_projection(&mut self) {
        if self.options.lock_item_order {
            return;
        }
        let Some(mut items) = self.state.items.take() else {
            return;
        };
        let ranker = self.ranker();
        items.sort_by(|a, b| ranker.cmp(a, b));
        self.state.items = Some(items);
        self.notify();
    }

    // --- projection ----------------------------------------------------------------------------

    /// Resolves the active interval through the index into `state.items`.
    fn project_active(&mut self) {
        let Some(index) = self.index.clone() else {
            return;
        };
        let Some(interval) = self.active.and_then(|id| self.intervals.get(id)) else {
            return;
        };
        let now = self.now();
        self.boosts.purge_expired(now);
        let mut items: Vec<T> = {
            let idx = index.read();
            let mut items: Vec<T> = interval
                .item_ids
                .iter()
                .filter_map(|k| {
                    let item = idx.get(k);
                    if item.is_none() {
                        pwarn!(id = ?k, "projection skipped an id missing from the item index");
                    }
                    item.cloned()
                })
                .collect();
            // Boosted items are pinned into the window even when stored elsewhere.
            items.extend(
                self.boosts
                    .ids()
                    .filter(|k| !interval.contains(k))
                    .filter_map(|k| idx.get(k).cloned()),
            );
            items
        };
        let ranker = self.ranker();
        items.sort_by(|a, b| ranker.cmp(a, b));
        self.state.items = Some(items);
        self.notify();
    }

    /// Makes `id` the active interval and projects it.
    pub fn set_active_interval(&mut self, id: IntervalId) -> bool {
        if self.intervals.get(id).is_none() {
            return false;
        }
        self.active = Some(id);
        self.project_active();
        true
    }

    /// Activates the interval holding `id`.
    pub fn jump_to_item(&mut self, id: &K) -> bool {
        match self.intervals.containing(id) {
            Some(interval) => self.set_active_interval(interval),
            None => false,
        }
    }

    /// Activates the interval whose head edge is anchored.
    pub fn jump_to_head(&mut self) -> bool {
        match self.intervals.head_interval() {
            Some(interval) => self.set_active_interval(interval),
            None => false,
        }
    }

    /// Activates the interval whose tail edge is anchored.
    pub fn jump_to_tail(&mut self) -> bool {
        match self.intervals.tail_interval() {
            Some(interval) => self.set_active_interval(interval),
            None => false,
        }
    }

    /// Plateau-aware search for `item` in the active window.
    ///
    /// Interval-backed engines search the active interval under the canonical comparator;
    /// state-only engines search `state.items`.
    pub fn locate_by_item(&self, item: &T) -> Result<Located, IndexError<K>> {
        let id = self.id_of(item);
        match &self.index {
            Some(index) => {
                let Some(interval) = self.active_interval() else {
                    return Ok(Located {
                        current_index: None,
                        insertion_index: 0,
                    });
                };
                let idx = index.read();
                locate_by_item(&interval.item_ids, &id, item, |k| idx.get(k), |a, b| {
                    (self.comparator)(a, b)
                })
            }
            None => {
                let items = self.state.items.as_deref().unwrap_or_default();
                let ids: Vec<K> = items.iter().map(|x| self.id_of(x)).collect();
                let by_id: HashMap<&K, &T> = ids.iter().zip(items).collect();
                locate_by_item(&ids, &id, item, |k| by_id.get(k).copied(), |a, b| {
                    (self.comparator)(a, b)
                })
            }
        }
    }

    // --- page ingestion ------------------------------------------------------------------------

    /// Ingests a fetched page into the interval set.
    ///
    /// Every page item is upserted into the index, then the page is merged with every anchored
    /// interval its sort range overlaps (transitively), plus `opts.target` under the default
    /// policy. Logical-sentinel items that fall inside the merged range are folded in. Returns
    /// the resulting interval, or `None` for an empty page or a state-only engine.
    pub fn ingest_page(&mut self, page: Vec<T>, opts: IngestOptions) -> Option<IntervalId> {
        let index = self.index.clone()?;
        if page.is_empty() {
            return None;
        }

        let mut page_ids = Vec::with_capacity(page.len());
        {
            let mut idx = index.write();
            let mut seen = HashSet::with_capacity(page.len());
            for item in page {
                let id = idx.id_of(&item);
                idx.set_one(item);
                if seen.insert(id.clone()) {
                    page_ids.push(id);
                }
            }
        }

        let idx = index.read();
        let cmp = Arc::clone(&self.comparator);
        let by_id = |a: &K, b: &K| match (idx.get(a), idx.get(b)) {
            (Some(x), Some(y)) => cmp(x, y),
            _ => Ordering::Equal,
        };
        page_ids.sort_by(by_id);
        let page_set: HashSet<K> = page_ids.iter().cloned().collect();

        let policy = opts.policy.unwrap_or(self.options.merge_policy);
        let mut participants: Vec<IntervalId> = Vec::new();
        if policy == MergePolicy::Default {
            if let Some(target) = opts.target.filter(|t| !t.is_logical()) {
                if self.intervals.get(target).is_some() {
                    participants.push(target);
                }
            }
        }

        // Edges skip page items: their index snapshots already carry the new sort keys.
        let edges = |iv: &Interval<K>| -> Option<(K, K)> {
            let mut rest = iv.item_ids.iter().filter(|k| !page_set.contains(*k));
            let first = rest.next()?.clone();
            let last = rest.last().cloned().unwrap_or_else(|| first.clone());
            Some((first, last))
        };

        let mut lo = page_ids[0].clone();
        let mut hi = page_ids[page_ids.len() - 1].clone();
        let widen = |lo: &mut K, hi: &mut K, first: &K, last: &K| {
            if by_id(first, lo) == Ordering::Less {
                *lo = first.clone();
            }
            if by_id(last, hi) == Ordering::Greater {
                *hi = last.clone();
            }
        };
        for &pid in &participants {
            if let Some((f, l)) = self.intervals.get(pid).and_then(edges) {
                widen(&mut lo, &mut hi, &f, &l);
            }
        }
        loop {
            let mut grew = false;
            for iv in self.intervals.anchored() {
                if participants.contains(&iv.id) || iv.is_empty() {
                    continue;
                }
                // An interval made up only of page items is wholly re-fetched.
                let overlaps = match edges(iv) {
                    Some((f, l)) => {
                        let disjoint =
                            by_id(&hi, &f) == Ordering::Less || by_id(&l, &lo) == Ordering::Less;
                        if !disjoint {
                            widen(&mut lo, &mut hi, &f, &l);
                        }
                        !disjoint
                    }
                    None => true,
                };
                if overlaps {
                    participants.push(iv.id);
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let keep_id = opts
            .target
            .filter(|t| participants.contains(t))
            .or_else(|| {
                participants
                    .iter()
                    .filter_map(|&pid| self.intervals.get(pid))
                    .min_by(|a, b| match (a.first(), b.first()) {
                        (Some(x), Some(y)) => by_id(x, y),
                        _ => Ordering::Equal,
                    })
                    .map(|iv| iv.id)
            });
        participants.sort_by(|a, b| {
            let fa = self.intervals.get(*a).and_then(Interval::first);
            let fb = self.intervals.get(*b).and_then(Interval::first);
            match (fa, fb) {
                (Some(x), Some(y)) => by_id(x, y),
                _ => Ordering::Equal,
            }
        });

        let mut merged_ids: Vec<K> = Vec::new();
        let mut seen: HashSet<K> = HashSet::new();
        let mut is_head = opts.is_head;
        let mut is_tail = opts.is_tail;
        let mut has_more_head = true;
        let mut has_more_tail = true;
        for &pid in &participants {
            if let Some(iv) = self.intervals.remove(pid) {
                is_head |= iv.is_head;
                is_tail |= iv.is_tail;
                has_more_head &= iv.has_more_head;
                has_more_tail &= iv.has_more_tail;
                for k in iv.item_ids {
                    if seen.insert(k.clone()) {
                        merged_ids.push(k);
                    }
                }
            }
        }
        for k in page_ids {
            if seen.insert(k.clone()) {
                merged_ids.push(k);
            }
        }

        // Page items may linger elsewhere under a stale sort key.
        let mut emptied: Vec<IntervalId> = Vec::new();
        for other in self.intervals.all() {
            if other.item_ids.iter().any(|k| page_set.contains(k)) {
                if let Some(iv) = self.intervals.get_mut(other.id) {
                    iv.item_ids.retain(|k| !page_set.contains(k));
                    if iv.is_empty() {
                        emptied.push(iv.id);
                    }
                }
            }
        }

        let within = |k: &K| by_id(k, &lo) != Ordering::Less && by_id(k, &hi) != Ordering::Greater;
        for side in [LogicalSide::Head, LogicalSide::Tail] {
            let fold_all = match side {
                LogicalSide::Head => is_head,
                LogicalSide::Tail => is_tail,
            };
            let Some(logical) = self.intervals.get_mut(side.id()) else {
                continue;
            };
            let (fold, keep): (Vec<K>, Vec<K>) = core::mem::take(&mut logical.item_ids)
                .into_iter()
                .partition(|k| fold_all || within(k));
            logical.item_ids = keep;
            if !fold.is_empty() {
                ptrace!(side = ?side, folded = fold.len(), "folded logical items into interval");
            }
            for k in fold {
                if seen.insert(k.clone()) {
                    merged_ids.push(k);
                }
            }
            if logical.is_empty() && !emptied.contains(&side.id()) {
                emptied.push(side.id());
            }
        }

        merged_ids.retain(|k| {
            let present = idx.has(k);
            if !present {
                pwarn!(id = ?k, "dropping interval id missing from the item index");
            }
            present
        });
        merged_ids.sort_by(by_id);

        let mut interval = Interval::anchored(0, merged_ids);
        interval.has_more_head = has_more_head;
        interval.has_more_tail = has_more_tail;
        if is_head {
            interval.close_head();
        }
        if is_tail {
            interval.close_tail();
        }
        let id = match keep_id {
            Some(id) => {
                interval.id = id;
                self.intervals.put(interval);
                id
            }
            None => self.intervals.insert_anchored(interval),
        };
        drop(idx);

        for gone in &emptied {
            self.intervals.remove(*gone);
        }
        if let Some(active) = self.active {
            if participants.contains(&active) || emptied.contains(&active) {
                self.active = Some(id);
            }
        }

        pdebug!(
            interval = ?id,
            merged = participants.len(),
            len = self.intervals.get(id).map_or(0, Interval::len),
            is_head,
            is_tail,
            "ingest_page"
        );

        if opts.set_active {
            self.active = Some(id);
            self.project_active();
        }
        Some(id)
    }

    // --- live updates --------------------------------------------------------------------------

    /// Ingests a single live update. Returns `true` when intervals or the projection changed;
    /// re-ingesting an identical snapshot reports `false`.
    ///
    /// Items failing the local filter are removed. Matching items are re-placed by sort key: into
    /// the anchored interval whose range holds them, onto a closed dataset edge, or into a logical
    /// sentinel when they sort beyond every known window. A boosted item is projected into the
    /// active window wherever its canonical placement lands.
    pub fn ingest_item(&mut self, item: T) -> bool
    where
        T: PartialEq,
    {
        let now = self.now();
        self.boosts.purge_expired(now);
        let id = self.id_of(&item);

        if !self.matches_filter(&item) {
            ptrace!(id = ?id, "live item rejected by filter");
            if !self.owns_index {
                if let Some(index) = &self.index {
                    index.write().set_one(item);
                }
            }
            return self.remove_item(&id);
        }

        let Some(index) = self.index.clone() else {
            return self.ingest_item_state_only(item);
        };

        let stale = index.write().set_one(item.clone());
        let unchanged_snapshot = stale.as_ref() == Some(&item);
        let previous = self.intervals.containing(&id);
        let previous_slot = previous.and_then(|pid| {
            let iv = self.intervals.get_mut(pid)?;
            let at = iv.position(&id)?;
            iv.item_ids.remove(at);
            Some((pid, at))
        });

        let target = {
            let idx = index.read();
            self.place_item(&idx, &id, &item, previous, stale.as_ref())
        };
        let slot = target.and_then(|t| Some((t, self.intervals.get(t)?.position(&id)?)));

        if let Some(pid) = previous {
            if Some(pid) != target && self.intervals.get(pid).is_some_and(Interval::is_empty) {
                self.drop_interval(pid);
            }
        }

        let in_active = self.active.is_some()
            && (target == self.active || self.boosts.is_boosted(&id, now));
        let projected = self.update_projection(&id, item, in_active, unchanged_snapshot);
        slot != previous_slot || projected
    }

    /// Chooses and inserts into the interval `item` belongs to.
    ///
    /// `stale` is the snapshot `item` replaced; the previous interval still covers its old key.
    fn place_item(
        &mut self,
        idx: &ItemIndex<K, T>,
        id: &K,
        item: &T,
        previous: Option<IntervalId>,
        stale: Option<&T>,
    ) -> Option<IntervalId> {
        let cmp = Arc::clone(&self.comparator);
        let resolve = |k: &K| idx.get(k);
        let covers = |iv: &Interval<K>, extra: Option<&T>| {
            let first = iv.first().and_then(resolve).or(extra);
            let last = iv.last().and_then(resolve).or(extra);
            let (Some(mut lo), Some(mut hi)) = (first, last) else {
                return false;
            };
            if let Some(x) = extra {
                if cmp(x, lo) == Ordering::Less {
                    lo = x;
                }
                if cmp(x, hi) == Ordering::Greater {
                    hi = x;
                }
            }
            cmp(item, lo) != Ordering::Less && cmp(item, hi) != Ordering::Greater
        };
        let fits = |iv: &Interval<K>| covers(iv, None);

        let mut target = previous.filter(|&pid| {
            self.intervals
                .get(pid)
                .is_some_and(|iv| iv.is_empty() || covers(iv, stale))
        });
        if target.is_none() {
            target = self
                .intervals
                .anchored()
                .find(|iv| fits(iv))
                .map(|iv| iv.id);
        }

        if target.is_none() {
            let head_most = self
                .intervals
                .anchored()
                .filter_map(|iv| iv.first().and_then(resolve).map(|f| ((iv.id, iv.is_head), f)))
                .min_by(|a, b| cmp(a.1, b.1));
            let tail_most = self
                .intervals
                .anchored()
                .filter_map(|iv| iv.last().and_then(resolve).map(|l| ((iv.id, iv.is_tail), l)))
                .max_by(|a, b| cmp(a.1, b.1));

            target = match (head_most, tail_most) {
                (Some(((head_id, is_head), first)), _) if cmp(item, first) == Ordering::Less => {
                    Some(if is_head { head_id } else { LogicalSide::Head.id() })
                }
                (_, Some(((tail_id, is_tail), last))) if cmp(item, last) == Ordering::Greater => {
                    Some(if is_tail { tail_id } else { LogicalSide::Tail.id() })
                }
                (None, None) => {
                    let known_empty = self.state.items.is_some()
                        && !self.state.has_more_head
                        && !self.state.has_more_tail;
                    if known_empty {
                        let mut iv = Interval::anchored(0, Vec::new());
                        iv.close_head();
                        iv.close_tail();
                        let new_id = self.intervals.insert_anchored(iv);
                        if self.active.is_none() {
                            self.active = Some(new_id);
                        }
                        Some(new_id)
                    } else {
                        Some(LogicalSide::Head.id())
                    }
                }
                _ => None,
            };
        }

        let Some(target) = target else {
            pdebug!(id = ?id, "live item falls between known intervals; kept in index only");
            return None;
        };
        if target.is_logical() {
            let side = if target == IntervalId::LogicalHead {
                LogicalSide::Head
            } else {
                LogicalSide::Tail
            };
            self.intervals.logical_mut(side);
            ptrace!(id = ?id, side = ?side, "live item parked in logical interval");
        }

        let iv = self.intervals.get_mut(target)?;
        let at = match locate_by_item(&iv.item_ids, id, item, resolve, |a, b| cmp(a, b)) {
            Ok(located) => located.insertion_index,
            #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
            Err(err) => {
                pwarn!(error = %err, "falling back to a linear insertion scan");
                iv.item_ids
                    .iter()
                    .position(|k| resolve(k).is_some_and(|x| cmp(x, item) == Ordering::Greater))
                    .unwrap_or(iv.item_ids.len())
            }
        };
        iv.item_ids.insert(at, id.clone());
        Some(target)
    }

    /// Moves `item` into or out of the projection. Returns `true` when the projection changed.
    fn update_projection(&mut self, id: &K, item: T, in_active: bool, unchanged: bool) -> bool {
        let ranker = Ranker {
            boosts: &self.boosts,
            base: &self.comparator,
            get_item_id: &*self.options.get_item_id,
        };
        let get_item_id = &self.options.get_item_id;
        let Some(items) = self.state.items.as_mut() else {
            if in_active {
                self.state.items = Some(vec![item]);
                self.notify();
            }
            return in_active;
        };
        let pos = items.iter().position(|x| get_item_id(x) == *id);
        match (pos, in_active) {
            (Some(_), true) if unchanged => return false,
            (Some(p), true) if self.options.lock_item_order => items[p] = item,
            (Some(p), true) => {
                items.remove(p);
                let at = ranker.insertion_index(items, &item);
                items.insert(at, item);
            }
            (Some(p), false) => {
                items.remove(p);
            }
            (None, true) => {
                let at = ranker.insertion_index(items, &item);
                items.insert(at, item);
            }
            (None, false) => return false,
        }
        self.notify();
        true
    }

    fn ingest_item_state_only(&mut self, item: T) -> bool
    where
        T: PartialEq,
    {
        let ranker = Ranker {
            boosts: &self.boosts,
            base: &self.comparator,
            get_item_id: &*self.options.get_item_id,
        };
        let get_item_id = &self.options.get_item_id;
        let id = get_item_id(&item);
        let items = self.state.items.get_or_insert_with(Vec::new);
        match items.iter().position(|x| get_item_id(x) == id) {
            Some(p) if items[p] == item => return false,
            Some(p) if self.options.lock_item_order => items[p] = item,
            Some(p) => {
                items.remove(p);
                let at = ranker.insertion_index(items, &item);
                items.insert(at, item);
            }
            None => {
                let at = ranker.insertion_index(items, &item);
                items.insert(at, item);
            }
        }
        self.notify();
        true
    }

    fn drop_interval(&mut self, id: IntervalId) {
        self.intervals.remove(id);
        if self.active == Some(id) {
            self.active = None;
            self.state.items = Some(Vec::new());
            self.notify();
        }
    }

    /// Removes an item from intervals, the projection and boosts. Returns `true` when intervals
    /// or the projection changed.
    ///
    /// The item index entry is dropped only when the index is owned by this engine; a shared
    /// index may still serve other paginators.
    pub fn remove_item(&mut self, id: &K) -> bool {
        let mut changed = false;
        if let Some(iv_id) = self.intervals.containing(id) {
            if let Some(iv) = self.intervals.get_mut(iv_id) {
                iv.item_ids.retain(|k| k != id);
                changed = true;
                if iv.is_empty() {
                    self.drop_interval(iv_id);
                }
            }
        }

        let get_item_id = &self.options.get_item_id;
        if let Some(items) = self.state.items.as_mut() {
            if let Some(p) = items.iter().position(|x| get_item_id(x) == *id) {
                items.remove(p);
                changed = true;
            }
        }

        if self.owns_index {
            if let Some(index) = &self.index {
                index.write().remove(id);
            }
        }
        self.boosts.remove(id);

        if changed {
            self.notify();
        }
        changed
    }

    /// Drops index entries that no interval and no projected item refers to. Returns the number
    /// of entries removed; always `0` for a shared or disabled index.
    pub fn prune_index(&mut self) -> usize {
        if !self.owns_index {
            return 0;
        }
        let Some(index) = &self.index else {
            return 0;
        };
        let mut referenced: HashSet<K> = self
            .intervals
            .all()
            .into_iter()
            .flat_map(|iv| iv.item_ids)
            .collect();
        if let Some(items) = &self.state.items {
            referenced.extend(items.iter().map(|item| (self.options.get_item_id)(item)));
        }
        let mut index = index.write();
        let before = index.len();
        index.retain(|id, _| referenced.contains(id));
        let pruned = before - index.len();
        pdebug!(pruned, kept = index.len(), "prune_index");
        pruned
    }

    // --- query results -------------------------------------------------------------------------

    /// Applies a resolved query: updates edge flags and cursors per the pagination mode, ingests
    /// the page (or writes it straight into `state.items` in state-only mode), and clears the
    /// last query error.
    pub fn apply_query_result(&mut self, outcome: QueryOutcome<K, T>) {
        let QueryOutcome {
            direction,
            anchor,
            raw_len,
            items,
            cursor,
            is_first_page,
            page_size,
        } = outcome;

        let mut page = items;
        {
            let cmp = &self.comparator;
            page.sort_by(|a, b| cmp(a, b));
        }

        let previous = if is_first_page { None } else { self.active };
        let (mut has_more_head, mut has_more_tail) = if is_first_page {
            (true, true)
        } else {
            (self.state.has_more_head, self.state.has_more_tail)
        };
        let mut next_cursor = self.state.cursor.clone();
        let mut next_offset = self.state.offset;

        match self.options.mode {
            PaginationMode::Cursor => {
                let mut c = self.state.cursor.clone().unwrap_or_default();
                if is_first_page {
                    c = cursor;
                    has_more_head = c.headward.is_some();
                    has_more_tail = c.tailward.is_some();
                } else {
                    match direction {
                        Direction::Headward => {
                            c.headward = cursor.headward;
                            has_more_head = c.headward.is_some();
                        }
                        Direction::Tailward => {
                            c.tailward = cursor.tailward;
                            has_more_tail = c.tailward.is_some();
                        }
                    }
                }
                next_cursor = Some(c);
            }
            PaginationMode::Offset => {
                if next_offset == 0 {
                    has_more_head = false;
                }
                next_offset = next_offset.saturating_add(raw_len);
                has_more_tail = raw_len >= page_size;
            }
            PaginationMode::Derived => {
                let edges = previous.and_then(|pid| self.interval_edges(pid));
                let time_field = self
                    .options
                    .time_field
                    .clone()
                    .or_else(|| self.options.sort.terms().first().map(|t| t.field.clone()));
                let resolve_path = &self.options.resolve_path;
                let time_of = |item: &T| {
                    let field = time_field.as_deref()?;
                    as_date_ms(&resolve_path(item, field))
                };
                let ctx = DeriveContext {
                    direction: Some(direction),
                    anchor: &anchor,
                    page: &page,
                    raw_len,
                    requested_page_size: page_size,
                    interval_first: edges.as_ref().map(|(f, _)| f),
                    interval_last: edges.as_ref().map(|(_, l)| l),
                    has_more_head,
                    has_more_tail,
                    get_item_id: &*self.options.get_item_id,
                    compare: &*self.comparator,
                    time_of: &time_of,
                };
                let derived = match &self.options.derivation {
                    Some(strategy) => strategy.derive(&ctx),
                    None => derivation_for::<K, T>(&anchor).derive(&ctx),
                };
                has_more_head = derived.has_more_head;
                has_more_tail = derived.has_more_tail;
            }
        }

        pdebug!(
            fetched = page.len(),
            raw_len,
            is_first_page,
            has_more_head,
            has_more_tail,
            "apply_query_result"
        );
        self.batch_update(|engine| {
            if engine.tracks_intervals() {
                if page.is_empty() {
                    if is_first_page {
                        engine.active = None;
                        engine.state.items = Some(Vec::new());
                    } else if let Some(iv) = engine.active.and_then(|a| engine.intervals.get_mut(a)) {
                        if !has_more_head {
                            iv.close_head();
                        }
                        if !has_more_tail {
                            iv.close_tail();
                        }
                    }
                } else {
                    engine.ingest_page(
                        page,
                        IngestOptions {
                            is_head: !has_more_head,
                            is_tail: !has_more_tail,
                            target: previous,
                            policy: None,
                            set_active: true,
                        },
                    );
                }
                if let Some(iv) = engine.active_interval() {
                    has_more_head &= iv.has_more_head;
                    has_more_tail &= iv.has_more_tail;
                }
            } else {
                engine.merge_state_only(page, direction, is_first_page);
            }

            engine.state.has_more_head = has_more_head;
            engine.state.has_more_tail = has_more_tail;
            engine.state.cursor = next_cursor;
            engine.state.offset = next_offset;
            engine.state.last_query_error = None;
            engine.notify();
        });
    }

    fn interval_edges(&self, id: IntervalId) -> Option<(T, T)> {
        let index = self.index.as_ref()?;
        let iv = self.intervals.get(id)?;
        let idx = index.read();
        let first = idx.get(iv.first()?)?.clone();
        let last = idx.get(iv.last()?)?.clone();
        Some((first, last))
    }

    fn merge_state_only(&mut self, page: Vec<T>, direction: Direction, is_first_page: bool) {
        let get_item_id = Arc::clone(&self.options.get_item_id);
        let mut items = if is_first_page {
            Vec::new()
        } else {
            self.state.items.take().unwrap_or_default()
        };
        let positions: HashMap<K, usize> = items
            .iter()
            .enumerate()
            .map(|(i, x)| (get_item_id(x), i))
            .collect();
        let mut fresh = Vec::new();
        for item in page {
            match positions.get(&get_item_id(&item)) {
                Some(&p) => items[p] = item,
                None => fresh.push(item),
            }
        }
        match direction {
            Direction::Headward => {
                fresh.extend(items);
                items = fresh;
            }
            Direction::Tailward => items.extend(fresh),
        }
        self.state.items = Some(items);
    }
}

impl<K, T> core::fmt::Debug for PaginationEngine<K, T>
where
    K: ItemKey,
    T: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PaginationEngine")
            .field("options", &self.options)
            .field("intervals", &self.intervals)
            .field("active", &self.active)
            .field("boosts", &self.boosts)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
