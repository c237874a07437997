/// Which end of the ordered dataset a query moves toward.
///
/// The head is index `0` of the sorted item list; the tail is its end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Headward,
    Tailward,
}

/// Opaque server-issued page tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cursor {
    pub headward: Option<String>,
    pub tailward: Option<String>,
}

impl Cursor {
    pub fn new(headward: Option<String>, tailward: Option<String>) -> Self {
        Self { headward, tailward }
    }

    pub fn token(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Headward => self.headward.as_deref(),
            Direction::Tailward => self.tailward.as_deref(),
        }
    }
}

/// The observable pagination state.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PaginatorState<T> {
    pub has_more_head: bool,
    pub has_more_tail: bool,
    pub is_loading: bool,
    /// `None` until the first page (or offline pre-load) resolves.
    pub items: Option<Vec<T>>,
    pub last_query_error: Option<String>,
    pub cursor: Option<Cursor>,
    pub offset: usize,
}

impl<T> PaginatorState<T> {
    /// Permissive defaults: both edges are assumed to have more data.
    pub fn initial(cursor: Option<Cursor>, offset: usize) -> Self {
        Self {
            has_more_head: true,
            has_more_tail: true,
            is_loading: false,
            items: None,
            last_query_error: None,
            cursor,
            offset,
        }
    }

    pub fn has_more(&self, direction: Direction) -> bool {
        match direction {
            Direction::Headward => self.has_more_head,
            Direction::Tailward => self.has_more_tail,
        }
    }

    pub fn len(&self) -> usize {
        self.items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PaginatorState<T> {
    fn default() -> Self {
        Self::initial(None, 0)
    }
}
