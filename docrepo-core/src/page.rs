//! Paged query results.
//!
//! A [`Page`] carries one slice of a result set together with the continuation token
//! needed to fetch the next slice. Continuation tokens are opaque: callers pass back
//! exactly what they received, and an absent token marks the final page.

use serde::{Deserialize, Serialize};

/// A single page of results.
///
/// # Type Parameters
///
/// * `T` - The type of items contained in this page
///
/// # Example
///
/// ```ignore
/// let mut token = None;
///
/// loop {
///     let page = repository
///         .find_paged(50, token, Query::new(), FeedOptions::partition("tenant-a"))
///         .await?;
///
///     handle(page.items);
///
///     match page.continuation_token {
///         Some(next) => token = Some(next),
///         None => break,
///     }
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub items: Vec<T>,
    /// Token for the next page, or `None` if this is the last page.
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page.
    pub fn builder(items: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(items)
    }

    /// Returns `true` if more items can be fetched with the continuation token.
    pub fn has_more(&self) -> bool {
        self.continuation_token.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            continuation_token: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    items: Vec<T>,
    continuation_token: Option<String>,
}

impl<T> PageBuilder<T> {
    /// Creates a new builder with the given items.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            continuation_token: None,
        }
    }

    /// Sets the continuation token. Empty tokens are normalized to `None`.
    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token.filter(|token| !token.is_empty());
        self
    }

    /// Builds and returns the final [`Page`] instance.
    pub fn build(self) -> Page<T> {
        Page {
            items: self.items,
            continuation_token: self.continuation_token,
        }
    }
}
