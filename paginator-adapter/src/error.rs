use thiserror::Error;

/// Failures surfaced by [`crate::Paginator`] queries.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PaginatorError {
    /// The source rejected or failed the query.
    #[error("query failed: {0}")]
    Query(String),
    /// Local post-filtering of a fetched page failed.
    #[error("local filter failed: {0}")]
    LocalFilter(String),
    /// The source could not describe the next query.
    #[error("no query shape available for the next page")]
    MissingQueryShape,
}
