use std::sync::Arc;

/// Decides whether a new query shape starts over from a first page.
pub type ShapeChanged<S> = Arc<dyn Fn(Option<&S>, &S) -> bool + Send + Sync>;

/// Query orchestration settings for [`crate::Paginator`].
pub struct ControllerOptions<S> {
    /// Delay of the `*_debounced` entry points.
    pub debounce_ms: u64,
    pub page_size: usize,
    /// Return query failures to the caller in addition to recording them in state.
    pub throw_errors: bool,
    /// Extra attempts after a failed query.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub has_shape_changed: ShapeChanged<S>,
}

impl<S: PartialEq + 'static> Default for ControllerOptions<S> {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            page_size: 10,
            throw_errors: false,
            max_retries: 0,
            retry_delay_ms: 1_000,
            has_shape_changed: Arc::new(|previous: Option<&S>, next: &S| previous != Some(next)),
        }
    }
}

impl<S: PartialEq + 'static> ControllerOptions<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> ControllerOptions<S> {
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_throw_errors(mut self, throw_errors: bool) -> Self {
        self.throw_errors = throw_errors;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn with_has_shape_changed(
        mut self,
        f: impl Fn(Option<&S>, &S) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.has_shape_changed = Arc::new(f);
        self
    }
}

impl<S> Clone for ControllerOptions<S> {
    fn clone(&self) -> Self {
        Self {
            debounce_ms: self.debounce_ms,
            page_size: self.page_size,
            throw_errors: self.throw_errors,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            has_shape_changed: Arc::clone(&self.has_shape_changed),
        }
    }
}

impl<S> core::fmt::Debug for ControllerOptions<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ControllerOptions")
            .field("debounce_ms", &self.debounce_ms)
            .field("page_size", &self.page_size)
            .field("throw_errors", &self.throw_errors)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish_non_exhaustive()
    }
}
