//! Repository abstraction over a document collection.
//!
//! This module defines the [`Repository`] trait: typed CRUD, paged queries and
//! projections over one logical collection of entities. Network-backed implementations
//! and the in-memory substitute share this contract, so application code and its tests
//! run unchanged against either.
//!
//! # Error Handling
//!
//! Every operation returns [`RepositoryResult<T>`](crate::error::RepositoryResult).
//! Callers branch on [`RepositoryError::kind`](crate::error::RepositoryError::kind) or
//! [`RepositoryError::status_code`](crate::error::RepositoryError::status_code):
//!
//! - `Conflict` on `add` when the id is taken
//! - `NotFound` on `replace` and `delete` when the target is missing
//! - `PreconditionFailed` when the caller's ETag is stale
//! - `InvalidOperation` when a required partition key is missing
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//!
//! async fn rename(repo: &impl Repository<Order>, id: &str) -> RepositoryResult<()> {
//!     let options = RequestOptions::partition("tenant-a");
//!
//!     if let Some(mut order) = repo.get(id, options.clone()).await? {
//!         order.customer = "renamed".into();
//!         repo.replace(order, options).await?;
//!     }
//!
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    entity::Entity,
    error::RepositoryResult,
    options::{FeedOptions, RequestOptions},
    page::Page,
    query::Query,
};

/// Typed access to one collection of entities.
///
/// # Thread Safety
///
/// Implementations are shared across tasks and must tolerate concurrent calls.
///
/// # Paging
///
/// The `_paged` operations take a page size and the continuation token from the previous
/// page. A page size of `0` disables paging. A `None` or empty token starts from the
/// beginning; the returned [`Page`] carries the token for the next page, or `None` once
/// the results are exhausted.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Inserts a new entity, generating an id if it has none.
    ///
    /// Returns the stored state, including the new ETag.
    async fn add(&self, entity: T, options: RequestOptions) -> RepositoryResult<T>;

    /// Inserts the entity or replaces the item with the same id.
    ///
    /// If the entity carries an ETag it must match the stored item's ETag.
    async fn upsert(&self, entity: T, options: RequestOptions) -> RepositoryResult<T>;

    /// Replaces an existing item.
    ///
    /// If the entity carries an ETag it must match the stored item's ETag.
    async fn replace(&self, entity: T, options: RequestOptions) -> RepositoryResult<T>;

    /// Reads an item by id. A missing item is `Ok(None)`, never an error.
    async fn get(&self, id: &str, options: RequestOptions) -> RepositoryResult<Option<T>>;

    /// Reads the stored state of an entity, addressed by its id and partition.
    async fn get_entity(&self, entity: &T, options: RequestOptions) -> RepositoryResult<Option<T>>;

    /// Deletes an item by id without an ETag check.
    async fn delete(&self, id: &str, options: RequestOptions) -> RepositoryResult<bool>;

    /// Deletes the stored item matching an entity, checking its ETag if it carries one.
    async fn delete_entity(&self, entity: &T, options: RequestOptions) -> RepositoryResult<bool>;

    /// Returns every item matched by the query.
    async fn find(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<Vec<T>>;

    /// Returns one page of the items matched by the query.
    async fn find_paged(
        &self,
        page_size: usize,
        continuation_token: Option<String>,
        query: Query<T>,
        options: FeedOptions,
    ) -> RepositoryResult<Page<T>>;

    /// Projects every item matched by the query.
    async fn select<U, F>(
        &self,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Vec<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static;

    /// Projects one page of the items matched by the query.
    async fn select_paged<U, F>(
        &self,
        page_size: usize,
        continuation_token: Option<String>,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Page<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static;

    /// Projects every matched item to a sequence and flattens the result.
    async fn select_many<U, I, F>(
        &self,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Vec<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static;

    /// Paged variant of [`Repository::select_many`].
    async fn select_many_paged<U, I, F>(
        &self,
        page_size: usize,
        continuation_token: Option<String>,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Page<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static;

    /// Applies `shaper` to the matched items, producing an intermediate sequence, then
    /// projects each intermediate value with `selector`.
    async fn select_shaped<M, U, S, F>(
        &self,
        query: Query<T>,
        shaper: S,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Vec<U>>
    where
        M: Send + 'static,
        U: Serialize + DeserializeOwned + Send + 'static,
        S: FnOnce(Vec<T>) -> Vec<M> + Send + 'static,
        F: Fn(M) -> U + Send + Sync + 'static;

    /// Paged variant of [`Repository::select_shaped`].
    async fn select_shaped_paged<M, U, S, F>(
        &self,
        page_size: usize,
        continuation_token: Option<String>,
        query: Query<T>,
        shaper: S,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Page<U>>
    where
        M: Send + 'static,
        U: Serialize + DeserializeOwned + Send + 'static,
        S: FnOnce(Vec<T>) -> Vec<M> + Send + 'static,
        F: Fn(M) -> U + Send + Sync + 'static;

    /// Counts the items matched by the query.
    async fn count(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<usize>;
}

/// Factory trait for constructing repositories.
#[async_trait]
pub trait RepositoryBuilder {
    type Repository;

    async fn build(self) -> RepositoryResult<Self::Repository>;
}
