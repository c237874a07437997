//! MongoDB-style filter trees evaluated locally against items.
//!
//! Live updates arrive without the server's filtering, so the engine re-checks every ingested item
//! against the same filter the query used. Fields are read through a [`ResolverRegistry`]:
//! registered resolvers are consulted in registration order, and the first whose predicate claims
//! the field wins. Unclaimed fields fall back to dot-path traversal.
use alloc::sync::Arc;
use core::cmp::Ordering;
use std::collections::HashMap;

use unicode_normalization::UnicodeNormalization;

use crate::normalize::{compare_normalized, contains_value, set_equal, values_equal};
use crate::sort::PathResolver;
use crate::{Document, Value};

/// A single field operator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Operator {
    Eq(Value),
    Ne(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Exists(bool),
    Contains(Value),
    Autocomplete(String),
}

/// A filter tree.
///
/// A mapping with several fields is an implicit `$and` over [`Filter::Field`] nodes; a literal
/// field value is an implicit `$eq`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Field { field: String, ops: Vec<Operator> },
}

impl Default for Filter {
    fn default() -> Self {
        Self::And(Vec::new())
    }
}

impl Filter {
    pub fn field(field: impl Into<String>, ops: impl IntoIterator<Item = Operator>) -> Self {
        Self::Field {
            field: field.into(),
            ops: ops.into_iter().collect(),
        }
    }

    /// `{field: value}`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::field(field, [Operator::Eq(value.into())])
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    pub fn nor(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Nor(filters.into_iter().collect())
    }

    /// `true` for the empty filter, which every item matches.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::And(f) if f.is_empty())
    }
}

/// A resolver claims fields via `matches` and reads them via `resolve`.
pub struct FieldResolver<T> {
    pub matches: Arc<dyn Fn(&str) -> bool + Send + Sync>,
    pub resolve: PathResolver<T>,
}

impl<T> FieldResolver<T> {
    pub fn new(
        matches: impl Fn(&str) -> bool + Send + Sync + 'static,
        resolve: impl Fn(&T, &str) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            matches: Arc::new(matches),
            resolve: Arc::new(resolve),
        }
    }

    /// A resolver that claims exactly one field name.
    pub fn for_field(
        field: impl Into<String>,
        resolve: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        let field = field.into();
        Self::new(move |f| f == field, move |item, _| resolve(item))
    }
}

impl<T> Clone for FieldResolver<T> {
    fn clone(&self) -> Self {
        Self {
            matches: Arc::clone(&self.matches),
            resolve: Arc::clone(&self.resolve),
        }
    }
}

/// Ordered resolver registry with a dot-path fallback.
pub struct ResolverRegistry<T> {
    resolvers: Vec<FieldResolver<T>>,
    fallback: PathResolver<T>,
}

impl<T: Document + 'static> ResolverRegistry<T> {
    pub fn new() -> Self {
        Self::with_fallback(Arc::new(|item: &T, path: &str| item.field(path)))
    }
}

impl<T: Document + 'static> Default for ResolverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResolverRegistry<T> {
    pub fn with_fallback(fallback: PathResolver<T>) -> Self {
        Self {
            resolvers: Vec::new(),
            fallback,
        }
    }

    pub fn register(&mut self, resolver: FieldResolver<T>) {
        self.resolvers.push(resolver);
    }

    pub fn with(mut self, resolver: FieldResolver<T>) -> Self {
        self.register(resolver);
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub fn resolve(&self, item: &T, field: &str) -> Value {
        for r in &self.resolvers {
            if (r.matches)(field) {
                return (r.resolve)(item, field);
            }
        }
        (self.fallback)(item, field)
    }
}

impl<T> Clone for ResolverRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            resolvers: self.resolvers.clone(),
            fallback: Arc::clone(&self.fallback),
        }
    }
}

impl<T> core::fmt::Debug for ResolverRegistry<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("resolvers", &self.resolvers.len())
            .finish_non_exhaustive()
    }
}

/// Evaluates `filter` against `item`.
///
/// Field values are resolved at most once per call, however many operators or branches reference
/// the same field.
pub fn item_matches_filter<T>(item: &T, filter: &Filter, resolvers: &ResolverRegistry<T>) -> bool {
    let mut cache = HashMap::new();
    Evaluation {
        item,
        resolvers,
        cache: &mut cache,
    }
    .matches(filter)
}

struct Evaluation<'a, T> {
    item: &'a T,
    resolvers: &'a ResolverRegistry<T>,
    cache: &'a mut HashMap<String, Value>,
}

impl<T> Evaluation<'_, T> {
    fn matches(&mut self, filter: &Filter) -> bool {
        match filter {
            Filter::And(filters) => filters.iter().all(|f| self.matches(f)),
            Filter::Or(filters) => filters.iter().any(|f| self.matches(f)),
            Filter::Nor(filters) => !filters.iter().any(|f| self.matches(f)),
            Filter::Field { field, ops } => {
                let value = self.field(field);
                ops.iter().all(|op| operator_matches(&value, op))
            }
        }
    }

    fn field(&mut self, field: &str) -> Value {
        if let Some(v) = self.cache.get(field) {
            return v.clone();
        }
        let v = self.resolvers.resolve(self.item, field);
        self.cache.insert(field.to_owned(), v.clone());
        v
    }
}

fn operator_matches(value: &Value, op: &Operator) -> bool {
    match op {
        Operator::Eq(expected) => eq_matches(value, expected),
        Operator::Ne(expected) => !eq_matches(value, expected),
        Operator::In(list) => in_matches(value, list),
        Operator::Nin(list) => !in_matches(value, list),
        Operator::Gt(bound) => range_matches(value, bound, |o| o == Ordering::Greater),
        Operator::Gte(bound) => range_matches(value, bound, |o| o != Ordering::Less),
        Operator::Lt(bound) => range_matches(value, bound, |o| o == Ordering::Less),
        Operator::Lte(bound) => range_matches(value, bound, |o| o != Ordering::Greater),
        Operator::Exists(expected) => !value.is_null() == *expected,
        Operator::Contains(needle) => contains_matches(value, needle),
        Operator::Autocomplete(query) => autocomplete_matches(value, query),
    }
}

fn eq_matches(value: &Value, expected: &Value) -> bool {
    match (value, expected) {
        (Value::Array(a), Value::Array(b)) => set_equal(a, b),
        (Value::Array(a), scalar) => contains_value(a, scalar),
        (scalar, Value::Array(b)) => contains_value(b, scalar),
        (a, b) => values_equal(a, b),
    }
}

fn in_matches(value: &Value, list: &[Value]) -> bool {
    match value {
        Value::Array(values) => values.iter().any(|v| contains_value(list, v)),
        scalar => contains_value(list, scalar),
    }
}

fn range_matches(value: &Value, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    if matches!(value, Value::Array(_)) || matches!(bound, Value::Array(_)) {
        return false;
    }
    compare_normalized(value, bound).is_some_and(accept)
}

fn contains_matches(value: &Value, needle: &Value) -> bool {
    match (value, needle) {
        (Value::Array(values), needle) => contains_value(values, needle),
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        _ => false,
    }
}

fn autocomplete_matches(value: &Value, query: &str) -> bool {
    let value_tokens: Vec<String> = match value {
        Value::String(s) => tokenize(s),
        Value::Array(values) => values
            .iter()
            .filter_map(Value::as_str)
            .flat_map(tokenize)
            .collect(),
        _ => return false,
    };
    tokenize(query)
        .iter()
        .all(|q| value_tokens.iter().any(|v| v.starts_with(q.as_str())))
}

/// Splits text into normalized search tokens: NFKC, lowercased, whitespace-separated.
pub fn tokenize(text: &str) -> Vec<String> {
    text.nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}
