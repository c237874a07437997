use core::fmt::Debug;
use core::hash::Hash;

/// Bounds required of item identifiers.
///
/// Identifiers key the item index (hashing), order the default tie-breaker (`Ord`), and are
/// cloned into interval storage.
pub trait ItemKey: Hash + Eq + Ord + Clone + Debug + Send + Sync + 'static {}
impl<K: Hash + Eq + Ord + Clone + Debug + Send + Sync + 'static> ItemKey for K {}
