use alloc::sync::Arc;
use core::cmp::Ordering;

use crate::normalize::compare_values;
use crate::{ItemKey, Value};

/// A total-order comparator over items.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// Resolves a sort field (dot path) on an item.
pub type PathResolver<T> = Arc<dyn Fn(&T, &str) -> Value + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Maps the conventional `1` / `-1` encoding; any negative value is descending.
    pub fn from_sign(sign: i32) -> Self {
        if sign < 0 { Self::Desc } else { Self::Asc }
    }

    pub fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Asc => ord,
            Self::Desc => ord.reverse(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortTerm {
    pub field: String,
    pub direction: SortDirection,
}

impl SortTerm {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// An ordered list of sort terms. The first term that distinguishes two items wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sort {
    terms: Vec<SortTerm>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new().then_asc(field)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new().then_desc(field)
    }

    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.terms.push(SortTerm::new(field, SortDirection::Asc));
        self
    }

    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.terms.push(SortTerm::new(field, SortDirection::Desc));
        self
    }

    /// Builds a sort from one `{field: ±1}` mapping.
    ///
    /// Multi-field mappings are accepted and taken in enumeration order; prefer
    /// [`Sort::from_mappings`] when the order matters to the caller.
    pub fn from_mapping<S: Into<String>>(entries: impl IntoIterator<Item = (S, i32)>) -> Self {
        Self {
            terms: entries
                .into_iter()
                .map(|(field, sign)| SortTerm::new(field, SortDirection::from_sign(sign)))
                .collect(),
        }
    }

    /// Builds a sort from an array of mappings, flattened in order.
    pub fn from_mappings<S, M>(mappings: impl IntoIterator<Item = M>) -> Self
    where
        S: Into<String>,
        M: IntoIterator<Item = (S, i32)>,
    {
        let mut terms = Vec::new();
        for mapping in mappings {
            terms.extend(Self::from_mapping(mapping).terms);
        }
        Self { terms }
    }

    pub fn terms(&self) -> &[SortTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl FromIterator<SortTerm> for Sort {
    fn from_iter<I: IntoIterator<Item = SortTerm>>(iter: I) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

/// The final comparison applied when every sort term ties.
pub enum TieBreaker<T> {
    /// Compare item identifiers.
    ById,
    Custom(Comparator<T>),
    /// Items that tie on every term compare equal.
    Disabled,
}

impl<T: 'static> TieBreaker<T> {
    pub(crate) fn into_comparator<K: ItemKey>(
        self,
        get_item_id: Arc<dyn Fn(&T) -> K + Send + Sync>,
    ) -> Option<Comparator<T>> {
        match self {
            Self::ById => Some(Arc::new(move |a: &T, b: &T| {
                get_item_id(a).cmp(&get_item_id(b))
            })),
            Self::Custom(cmp) => Some(cmp),
            Self::Disabled => None,
        }
    }
}

impl<T> Default for TieBreaker<T> {
    fn default() -> Self {
        Self::ById
    }
}

impl<T> Clone for TieBreaker<T> {
    fn clone(&self) -> Self {
        match self {
            Self::ById => Self::ById,
            Self::Custom(cmp) => Self::Custom(Arc::clone(cmp)),
            Self::Disabled => Self::Disabled,
        }
    }
}

impl<T> core::fmt::Debug for TieBreaker<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ById => f.write_str("ById"),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Disabled => f.write_str("Disabled"),
        }
    }
}

/// Compiles `sort` into a deterministic comparator.
///
/// Each term resolves both operands through `resolve`, normalizes them (see
/// [`crate::normalize`]) and compares ascending, flipping for descending terms. The first
/// non-equal term decides; if every term ties, `tie_breaker` decides, and without one the items
/// compare equal.
pub fn make_comparator<T: 'static>(
    sort: &Sort,
    resolve: PathResolver<T>,
    tie_breaker: Option<Comparator<T>>,
) -> Comparator<T> {
    let terms = sort.terms.clone();
    Arc::new(move |a: &T, b: &T| {
        for term in &terms {
            let va = resolve(a, &term.field);
            let vb = resolve(b, &term.field);
            let ord = compare_values(&va, &vb);
            if ord != Ordering::Equal {
                return term.direction.apply(ord);
            }
        }
        match &tie_breaker {
            Some(tb) => tb(a, b),
            None => Ordering::Equal,
        }
    })
}
