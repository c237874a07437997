use core::fmt::Debug;

use thiserror::Error;

/// Consistency failures between interval storage and the item index.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IndexError<K: Debug> {
    /// An interval references an ID the item index does not hold.
    #[error("item {0:?} is referenced by an interval but missing from the item index")]
    MissingItem(K),
}
