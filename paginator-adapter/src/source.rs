use core::fmt::Debug;

use async_trait::async_trait;
use paginator::{Direction, ItemKey, PageAnchor, PaginatorState};

use crate::PaginatorError;

/// Everything a source needs to fetch one page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParams<S> {
    pub shape: S,
    pub direction: Direction,
    pub page_size: usize,
    /// Token for `direction`, `None` on a first page.
    pub cursor: Option<String>,
    pub offset: usize,
    pub is_first_page: bool,
}

/// A fetched page and the tokens that continue it.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub headward: Option<String>,
    pub tailward: Option<String>,
}

impl<T> Page<T> {
    /// A page without continuation tokens.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            headward: None,
            tailward: None,
        }
    }

    pub fn with_cursors(mut self, headward: Option<String>, tailward: Option<String>) -> Self {
        self.headward = headward;
        self.tailward = tailward;
        self
    }
}

/// A remote, paginated dataset.
///
/// A *shape* is whatever identifies the query (filters, sort, search text). When the shape of the
/// next query differs from the previous one, the paginator starts over from a first page.
#[async_trait]
pub trait PaginationSource: Send + Sync + 'static {
    type Item: Clone + PartialEq + Send + Sync + 'static;
    type Key: ItemKey;
    type Shape: Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Describes the next query toward `direction`.
    ///
    /// An error here is a setup mistake: the paginator returns it immediately, without retrying
    /// or recording it in `last_query_error`.
    fn next_query_shape(
        &self,
        _direction: Direction,
        _state: &PaginatorState<Self::Item>,
    ) -> Result<Self::Shape, PaginatorError> {
        Err(PaginatorError::MissingQueryShape)
    }

    /// Where a shape anchors its window. Only consulted in derived pagination mode.
    fn anchor(&self, _shape: &Self::Shape) -> PageAnchor<Self::Key> {
        PageAnchor::None
    }

    async fn query(
        &self,
        params: QueryParams<Self::Shape>,
    ) -> Result<Page<Self::Item>, PaginatorError>;

    /// Post-filters a fetched page before ingestion, e.g. dropping soft-deleted records.
    async fn filter_query_results(
        &self,
        items: Vec<Self::Item>,
    ) -> Result<Vec<Self::Item>, PaginatorError> {
        Ok(items)
    }

    /// Items to show while a first page is in flight.
    async fn load_offline(&self, _shape: &Self::Shape) -> Option<Vec<Self::Item>> {
        None
    }

    /// Called with the settled state after each successful query.
    async fn persist(&self, _shape: &Self::Shape, _state: &PaginatorState<Self::Item>) {}
}
