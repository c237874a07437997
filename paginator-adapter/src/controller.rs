use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use paginator::{
    Boost, BoostOptions, Cursor, Direction, PaginationEngine, PaginationMode, PaginatorOptions,
    PaginatorState, QueryOutcome,
};
use parking_lot::{Mutex, MutexGuard};

use crate::scheduler::DelayedTask;
use crate::{
    ControllerOptions, PaginationSource, PaginatorError, QueryParams, StateStore, Subscription,
};

/// Per-call overrides for [`Paginator::execute_query`].
#[derive(Clone, Debug)]
pub struct QueryRequest<S> {
    /// Use this shape instead of asking the source.
    pub shape: Option<S>,
    /// Start over from a first page, even while another query is loading.
    pub reset: bool,
    /// Overrides [`ControllerOptions::max_retries`] for this call.
    pub retry_count: Option<u32>,
}

impl<S> Default for QueryRequest<S> {
    fn default() -> Self {
        Self {
            shape: None,
            reset: false,
            retry_count: None,
        }
    }
}

type State<S> = PaginatorState<<S as PaginationSource>::Item>;
type Engine<S> = PaginationEngine<<S as PaginationSource>::Key, <S as PaginationSource>::Item>;

struct Inner<S: PaginationSource> {
    source: S,
    engine: Mutex<Engine<S>>,
    store: StateStore<State<S>>,
    /// Shape of the last successful query.
    last_shape: Mutex<Option<S::Shape>>,
    /// Bumped on every first page; results from older generations are discarded.
    generation: AtomicU64,
    debounce: DelayedTask,
    options: ControllerOptions<S::Shape>,
}

/// Drives a [`PaginationEngine`] against a [`PaginationSource`].
///
/// Cloning is cheap and clones share one engine. The engine is only ever locked briefly and
/// never across an `.await`; every completed operation publishes a state snapshot to the
/// [`StateStore`].
pub struct Paginator<S: PaginationSource> {
    inner: Arc<Inner<S>>,
}

impl<S: PaginationSource> Clone for Paginator<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PaginationSource> Paginator<S> {
    pub fn new(
        source: S,
        engine_options: PaginatorOptions<S::Key, S::Item>,
        options: ControllerOptions<S::Shape>,
    ) -> Self {
        let engine = PaginationEngine::new(engine_options);
        let store = StateStore::new(engine.state().clone());
        Self {
            inner: Arc::new(Inner {
                source,
                engine: Mutex::new(engine),
                store,
                last_shape: Mutex::new(None),
                generation: AtomicU64::new(0),
                debounce: DelayedTask::new(),
                options,
            }),
        }
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    pub fn options(&self) -> &ControllerOptions<S::Shape> {
        &self.inner.options
    }

    /// The last published state.
    pub fn state(&self) -> State<S> {
        self.inner.store.get()
    }

    pub fn store(&self) -> &StateStore<State<S>> {
        &self.inner.store
    }

    /// Observes state; the listener is called immediately with the current state.
    pub fn subscribe(
        &self,
        listener: impl Fn(&State<S>) + Send + Sync + 'static,
    ) -> Subscription<State<S>> {
        self.inner.store.subscribe(listener)
    }

    /// Shape of the last successful query, `None` before one succeeds or after a reset.
    pub fn last_shape(&self) -> Option<S::Shape> {
        self.inner.last_shape.lock().clone()
    }

    /// Runs `f` against the engine, then publishes the resulting state.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut Engine<S>) -> R) -> R {
        let (out, snapshot) = {
            let mut engine = self.engine();
            let out = f(&mut engine);
            (out, engine.state().clone())
        };
        self.inner.store.replace(snapshot);
        out
    }

    fn engine(&self) -> MutexGuard<'_, Engine<S>> {
        self.inner.engine.lock()
    }

    pub fn ingest_item(&self, item: S::Item) -> bool {
        self.with_engine(|engine| engine.ingest_item(item))
    }

    pub fn remove_item(&self, id: &S::Key) -> bool {
        self.with_engine(|engine| engine.remove_item(id))
    }

    pub fn boost(&self, id: S::Key, opts: BoostOptions) -> Boost {
        self.with_engine(|engine| engine.boost(id, opts))
    }

    pub fn jump_to_item(&self, id: &S::Key) -> bool {
        self.with_engine(|engine| engine.jump_to_item(id))
    }

    /// Drops all loaded data and forgets the last query shape.
    pub fn reset_state(&self) {
        self.cancel_scheduled_query();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_shape.lock() = None;
        self.with_engine(|engine| engine.reset_state());
    }

    pub async fn to_head(&self) -> Result<(), PaginatorError> {
        self.execute_query(Direction::Headward, QueryRequest::default())
            .await
    }

    pub async fn to_tail(&self) -> Result<(), PaginatorError> {
        self.execute_query(Direction::Tailward, QueryRequest::default())
            .await
    }

    /// Re-runs the current query from a first page.
    pub async fn reload(&self) -> Result<(), PaginatorError> {
        self.execute_query(
            Direction::Tailward,
            QueryRequest {
                reset: true,
                ..QueryRequest::default()
            },
        )
        .await
    }

    /// Schedules [`Self::to_head`] after the debounce delay, replacing any pending call.
    pub fn to_head_debounced(&self) {
        self.schedule(Direction::Headward);
    }

    /// Schedules [`Self::to_tail`] after the debounce delay, replacing any pending call.
    pub fn to_tail_debounced(&self) {
        self.schedule(Direction::Tailward);
    }

    /// Returns `true` if a debounced query was still waiting.
    pub fn cancel_scheduled_query(&self) -> bool {
        self.inner.debounce.cancel()
    }

    pub fn has_scheduled_query(&self) -> bool {
        self.inner.debounce.is_pending()
    }

    fn schedule(&self, direction: Direction) {
        let this = self.clone();
        let delay = Duration::from_millis(self.inner.options.debounce_ms);
        tracing::trace!(target: "paginator_adapter", ?direction, ?delay, "query scheduled");
        self.inner.debounce.schedule(delay, async move {
            if let Err(err) = this.execute_query(direction, QueryRequest::default()).await {
                tracing::warn!(target: "paginator_adapter", error = %err, "debounced query failed");
            }
        });
    }

    /// Fetches the next page toward `direction` and applies it.
    ///
    /// A no-op while another query is loading, unless `request.reset` is set. The query starts
    /// over from a first page when reset is requested, when no query succeeded yet, or when the
    /// shape differs from the last successful one. Failures are retried `max_retries` times (or
    /// `request.retry_count`), then recorded in `last_query_error`; they are returned only with
    /// `throw_errors`. A missing query shape is always returned and never recorded.
    pub async fn execute_query(
        &self,
        direction: Direction,
        request: QueryRequest<S::Shape>,
    ) -> Result<(), PaginatorError> {
        let inner = &*self.inner;
        let max_retries = request.retry_count.unwrap_or(inner.options.max_retries);

        let (params, generation, snapshot) = {
            let mut engine = self.engine();
            if engine.state().is_loading && !request.reset {
                tracing::debug!(target: "paginator_adapter", ?direction, "query skipped: already loading");
                return Ok(());
            }
            let shape = match request.shape {
                Some(shape) => shape,
                None => inner
                    .source
                    .next_query_shape(direction, engine.state())
                    .inspect_err(|err| {
                        tracing::error!(target: "paginator_adapter", error = %err, "no query shape");
                    })?,
            };
            let is_first_page = request.reset
                || match inner.last_shape.lock().as_ref() {
                    None => true,
                    Some(last) => (inner.options.has_shape_changed)(Some(last), &shape),
                };
            let generation = if is_first_page {
                engine.reset_state();
                inner.generation.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                inner.generation.load(Ordering::SeqCst)
            };
            engine.set_loading(true);

            let state = engine.state();
            let params = QueryParams {
                shape,
                direction,
                page_size: inner.options.page_size,
                cursor: if is_first_page {
                    None
                } else {
                    state
                        .cursor
                        .as_ref()
                        .and_then(|c| c.token(direction))
                        .map(str::to_owned)
                },
                offset: state.offset,
                is_first_page,
            };
            (params, generation, state.clone())
        };
        inner.store.replace(snapshot);

        tracing::debug!(
            target: "paginator_adapter",
            ?direction,
            shape = ?params.shape,
            is_first_page = params.is_first_page,
            "query started"
        );

        if params.is_first_page {
            if let Some(items) = inner.source.load_offline(&params.shape).await {
                if self.is_current(generation) {
                    tracing::trace!(target: "paginator_adapter", len = items.len(), "offline items loaded");
                    self.with_engine(|engine| engine.set_items(items));
                }
            }
        }

        let mut attempt = 0u32;
        let result = loop {
            match inner.source.query(params.clone()).await {
                Ok(page) => break Ok(page),
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        target: "paginator_adapter",
                        error = %err,
                        attempt,
                        max_retries,
                        "query failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(inner.options.retry_delay_ms)).await;
                }
                Err(err) => break Err(err),
            }
        };
        let result = match result {
            Ok(page) => {
                let raw_len = page.items.len();
                let cursor = Cursor::new(page.headward, page.tailward);
                inner
                    .source
                    .filter_query_results(page.items)
                    .await
                    .map(|items| (raw_len, items, cursor))
            }
            Err(err) => Err(err),
        };

        if !self.is_current(generation) {
            tracing::debug!(target: "paginator_adapter", "discarding result of a superseded query");
            return Ok(());
        }
        let (raw_len, items, cursor) = match result {
            Ok(settled) => settled,
            Err(err) => return self.settle_error(err, generation),
        };

        let mode = self.engine().options().mode;
        let anchor = match mode {
            PaginationMode::Derived => inner.source.anchor(&params.shape),
            _ => paginator::PageAnchor::None,
        };
        let snapshot = {
            let mut engine = self.engine();
            let items: Vec<S::Item> = items
                .into_iter()
                .filter(|item| engine.matches_filter(item))
                .collect();
            tracing::debug!(
                target: "paginator_adapter",
                raw_len,
                fetched = items.len(),
                attempts = attempt + 1,
                "query settled"
            );
            engine.batch_update(|engine| {
                engine.apply_query_result(QueryOutcome {
                    direction,
                    anchor,
                    raw_len,
                    items,
                    cursor,
                    is_first_page: params.is_first_page,
                    page_size: params.page_size,
                });
                engine.set_loading(false);
            });
            *inner.last_shape.lock() = Some(params.shape.clone());
            engine.state().clone()
        };
        inner.store.replace(snapshot.clone());
        inner.source.persist(&params.shape, &snapshot).await;
        Ok(())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    fn settle_error(&self, err: PaginatorError, generation: u64) -> Result<(), PaginatorError> {
        tracing::error!(target: "paginator_adapter", error = %err, "query failed");
        if self.is_current(generation) {
            let message = err.to_string();
            self.with_engine(|engine| {
                engine.batch_update(|engine| {
                    engine.set_query_error(Some(message));
                    engine.set_loading(false);
                });
            });
        }
        if self.inner.options.throw_errors {
            Err(err)
        } else {
            Ok(())
        }
    }
}

impl<S: PaginationSource> core::fmt::Debug for Paginator<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Paginator")
            .field("options", &self.inner.options)
            .field("last_shape", &self.inner.last_shape.lock())
            .finish_non_exhaustive()
    }
}
