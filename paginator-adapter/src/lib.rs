//! Async query orchestration for the `paginator` crate.
//!
//! The `paginator` crate is a synchronous cache: it merges pages it is handed and places live
//! updates, but never fetches anything. This crate drives it against a remote source:
//!
//! - [`PaginationSource`]: the async query contract, plus optional offline pre-load and
//!   persistence hooks
//! - [`Paginator`]: first-page detection by query shape, retries, debounced scheduling and
//!   loading/error bookkeeping
//! - [`StateStore`]: an observable state snapshot for UI layers
//!
//! Logging goes through `tracing` under the `paginator_adapter` target.
#![forbid(unsafe_code)]

mod controller;
mod error;
mod options;
mod scheduler;
mod source;
mod store;


pub use controller::{Paginator, QueryRequest};
pub use error::PaginatorError;
pub use options::{ControllerOptions, ShapeChanged};
pub use source::{Page, PaginationSource, QueryParams};
pub use store::{StateStore, Subscription};
