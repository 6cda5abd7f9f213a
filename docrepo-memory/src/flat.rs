//! Flat in-memory repository: one collection, no partitioning.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};
use tracing::{debug, trace};

use docrepo_core::{
    entity::{Entity, EntityDescriptor, descriptor_for},
    error::RepositoryResult,
    options::{FeedOptions, RequestOptions},
    page::Page,
    query::Query,
    repository::{Repository, RepositoryBuilder},
};

use crate::{
    faults::Faults,
    pipeline,
    storage::{Bucket, DEFAULT_COLLECTION, ItemMetadata, ensure_id, require_id},
};

/// Thread-safe in-memory repository over a single collection.
///
/// Every stored item lives in one insertion-ordered bucket guarded by an async-aware
/// read-write lock. Partition keys in request and feed options are ignored.
///
/// # Thread Safety
///
/// `InMemoryRepository` is cloneable and keeps its state behind an `Arc`: clones share the
/// same items and the same fault registrations.
///
/// # Example
///
/// ```ignore
/// use docrepo::{prelude::*, memory::InMemoryRepository};
///
/// let repo = InMemoryRepository::<Order>::builder()
///     .collection_name("orders")
///     .build()
///     .await?;
///
/// let stored = repo.add(order, RequestOptions::new()).await?;
/// assert!(stored.etag.is_some());
/// ```
pub struct InMemoryRepository<T: Entity> {
    collection: Arc<str>,
    descriptor: EntityDescriptor<T>,
    items: Arc<RwLock<Bucket<T>>>,
    faults: Faults<T>,
}

impl<T: Entity> Clone for InMemoryRepository<T> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            descriptor: self.descriptor,
            items: Arc::clone(&self.items),
            faults: self.faults.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for InMemoryRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("collection", &self.collection)
            .field("entity", &self.descriptor.type_name())
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryRepository<T> {
    /// Creates an empty repository with the default collection name.
    pub fn new() -> Self {
        Self::with_collection(DEFAULT_COLLECTION)
    }

    fn with_collection(collection: &str) -> Self {
        Self {
            collection: Arc::from(collection),
            descriptor: descriptor_for::<T>(),
            items: Arc::new(RwLock::new(Bucket::default())),
            faults: Faults::default(),
        }
    }

    pub fn builder() -> InMemoryRepositoryBuilder<T> {
        InMemoryRepositoryBuilder::default()
    }

    /// Returns the fault-injection handle shared by every clone of this repository.
    pub fn faults(&self) -> &Faults<T> {
        &self.faults
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Returns the number of stored items.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Returns the store-managed metadata of an item. Partition keys are ignored.
    pub async fn metadata(&self, id: &str, _options: RequestOptions) -> Option<ItemMetadata> {
        self.items.read().await.metadata(id, None)
    }

    /// Removes every stored item. Fault registrations are kept.
    pub async fn clear(&self) {
        self.items.write().await.clear();
        debug!(collection = %self.collection, "cleared collection");
    }

    async fn query(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<Vec<T>> {
        let items = self.items.read().await.snapshot();

        trace!(
            collection = %self.collection,
            scanned = items.len(),
            expressions = query.uses_expressions(),
            max_item_count = ?options.max_item_count,
            "querying collection"
        );

        pipeline::apply_query(items, query)
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    async fn add(&self, mut entity: T, _options: RequestOptions) -> RepositoryResult<T> {
        self.faults.check_add(&entity).await?;

        let id = ensure_id(&self.descriptor, &mut entity)?;

        self.items
            .write()
            .await
            .add(&self.descriptor, id.clone(), entity, None)
            .inspect(|_| debug!(collection = %self.collection, id = %id, "added item"))
            .inspect_err(|e| debug!(collection = %self.collection, id = %id, error = %e, "add rejected"))
    }

    async fn upsert(&self, mut entity: T, _options: RequestOptions) -> RepositoryResult<T> {
        let id = ensure_id(&self.descriptor, &mut entity)?;

        self.items
            .write()
            .await
            .upsert(&self.descriptor, id.clone(), entity)
            .inspect(|_| debug!(collection = %self.collection, id = %id, "upserted item"))
            .inspect_err(|e| debug!(collection = %self.collection, id = %id, error = %e, "upsert rejected"))
    }

    async fn replace(&self, entity: T, _options: RequestOptions) -> RepositoryResult<T> {
        let id = require_id(&self.descriptor, &entity, "replace")?;

        self.items
            .write()
            .await
            .replace(&self.descriptor, id.clone(), entity, None)
            .inspect(|_| debug!(collection = %self.collection, id = %id, "replaced item"))
            .inspect_err(|e| debug!(collection = %self.collection, id = %id, error = %e, "replace rejected"))
    }

    async fn get(&self, id: &str, _options: RequestOptions) -> RepositoryResult<Option<T>> {
        self.faults.check_get(id).await?;

        Ok(self.items.read().await.read(id))
    }

    async fn get_entity(&self, entity: &T, options: RequestOptions) -> RepositoryResult<Option<T>> {
        let id = require_id(&self.descriptor, entity, "get")?;

        self.get(&id, options).await
    }

    async fn delete(&self, id: &str, _options: RequestOptions) -> RepositoryResult<bool> {
        let removed = self.items.write().await.delete(id);

        debug!(collection = %self.collection, id = %id, removed, "deleted item");

        Ok(removed)
    }

    async fn delete_entity(&self, entity: &T, _options: RequestOptions) -> RepositoryResult<bool> {
        let id = require_id(&self.descriptor, entity, "delete")?;

        self.items
            .write()
            .await
            .delete_checked(&self.descriptor, &id, entity)
            .inspect(|removed| debug!(collection = %self.collection, id = %id, removed, "deleted item"))
            .inspect_err(|e| debug!(collection = %self.collection, id = %id, error = %e, "delete rejected"))
    }

    async fn find(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<Vec<T>> {
        self.query(query, options).await
    }

    async fn find_paged(
        &self,
        page_size: usize,
        continuation_token: Option<String>,
        query: Query<T>,
        options: FeedOptions,
    ) -> RepositoryResult<Page<T>> {
        pipeline::read_page(page_size, continuation_token, self.query(query, options), |items| items).await
    }

    async fn select<U, F>(
        &self,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Vec<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Ok(pipeline::project(self.query(query, options).await?, selector))
    }

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
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        pipeline::read_page(
            page_size,
            continuation_token,
            self.query(query, options),
            |items| pipeline::project(items, selector),
        )
        .await
    }

    async fn select_many<U, I, F>(
        &self,
        query: Query<T>,
        selector: F,
        options: FeedOptions,
    ) -> RepositoryResult<Vec<U>>
    where
        U: Serialize + DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = U>,
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        Ok(pipeline::project_many(self.query(query, options).await?, selector))
    }

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
        F: Fn(T) -> I + Send + Sync + 'static,
    {
        pipeline::read_page(
            page_size,
            continuation_token,
            self.query(query, options),
            |items| pipeline::project_many(items, selector),
        )
        .await
    }

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
        F: Fn(M) -> U + Send + Sync + 'static,
    {
        Ok(pipeline::project_shaped(self.query(query, options).await?, shaper, selector))
    }

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
        F: Fn(M) -> U + Send + Sync + 'static,
    {
        pipeline::read_page(
            page_size,
            continuation_token,
            self.query(query, options),
            |items| pipeline::project_shaped(items, shaper, selector),
        )
        .await
    }

    async fn count(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<usize> {
        self.faults.check_count().await?;

        Ok(self.query(query, options).await?.len())
    }
}

/// Builder for [`InMemoryRepository`].
///
/// # Example
///
/// ```ignore
/// let repo = InMemoryRepository::<Order>::builder()
///     .collection_name("orders")
///     .build()
///     .await?;
/// ```
pub struct InMemoryRepositoryBuilder<T> {
    collection: Option<String>,
    _entity: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for InMemoryRepositoryBuilder<T> {
    fn default() -> Self {
        Self { collection: None, _entity: std::marker::PhantomData }
    }
}

impl<T: Entity> InMemoryRepositoryBuilder<T> {
    /// Sets the collection name used in log events and error messages.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }
}

#[async_trait]
impl<T: Entity> RepositoryBuilder for InMemoryRepositoryBuilder<T> {
    type Repository = InMemoryRepository<T>;

    async fn build(self) -> RepositoryResult<Self::Repository> {
        let collection = self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION);

        Ok(InMemoryRepository::with_collection(collection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_core::{
        entity::{EtagValue, IdValue, TimestampValue},
        error::{ErrorKind, StatusCode},
        query::Filter,
    };
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ticket {
        id: Option<String>,
        etag: Option<String>,
        updated: i64,
        title: String,
        priority: u8,
    }

    impl Entity for Ticket {
        fn descriptor() -> EntityDescriptor<Self> {
            EntityDescriptor::builder("Ticket", |t: &Self| t.id.to_id())
                .id_setter(|t: &mut Self, id: &str| t.id.assign_id(id))
                .etag(|t: &Self| t.etag.to_etag(), |t: &mut Self, etag: &str| t.etag.assign_etag(etag))
                .timestamp(|t: &mut Self, ts: i64| t.updated.assign_timestamp(ts))
                .build()
        }
    }

    fn ticket(id: &str, title: &str, priority: u8) -> Ticket {
        Ticket {
            id: Some(id.into()),
            etag: None,
            updated: 0,
            title: title.into(),
            priority,
        }
    }

    async fn seeded() -> InMemoryRepository<Ticket> {
        let repo = InMemoryRepository::new();

        for (id, title, priority) in [("t1", "login", 2), ("t2", "logout", 1), ("t3", "signup", 3)] {
            repo.add(ticket(id, title, priority), RequestOptions::new()).await.unwrap();
        }

        repo
    }

    #[tokio::test]
    async fn add_assigns_id_etag_and_timestamp() {
        let repo = InMemoryRepository::<Ticket>::new();
        let fresh = Ticket { id: None, ..ticket("", "new", 1) };

        let stored = repo.add(fresh, RequestOptions::new()).await.unwrap();
        let id = stored.id.clone().unwrap();
        let metadata = repo.metadata(&id, RequestOptions::new()).await.unwrap();

        assert_eq!(stored.etag.as_deref(), Some(metadata.etag.as_str()));
        assert_eq!(stored.updated, metadata.update_timestamp);
        assert!(metadata.update_timestamp > 0);
        assert_eq!(metadata.partition, None);
    }

    #[tokio::test]
    async fn reads_return_independent_copies() {
        let repo = seeded().await;

        let mut copy = repo.get("t1", RequestOptions::new()).await.unwrap().unwrap();
        copy.title = "mutated".into();

        let again = repo.get("t1", RequestOptions::new()).await.unwrap().unwrap();
        assert_eq!(again.title, "login");
        assert_eq!(repo.get("nope", RequestOptions::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn stale_etags_are_rejected() {
        let repo = seeded().await;
        let original = repo.get("t2", RequestOptions::new()).await.unwrap().unwrap();

        let updated = repo
            .replace(Ticket { title: "logout v2".into(), ..original.clone() }, RequestOptions::new())
            .await
            .unwrap();
        assert_ne!(updated.etag, original.etag);

        let err = repo.upsert(original.clone(), RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);

        let err = repo.delete_entity(&original, RequestOptions::new()).await.unwrap_err();
        assert!(err.is_precondition_failed());

        // Without an etag the write is unconditional.
        let blind = Ticket { etag: None, ..original };
        assert!(repo.upsert(blind, RequestOptions::new()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_items_on_delete_and_replace() {
        let repo = seeded().await;

        assert!(!repo.delete("missing", RequestOptions::new()).await.unwrap());
        assert!(!repo.delete_entity(&ticket("missing", "x", 1), RequestOptions::new()).await.unwrap());

        let err = repo.replace(ticket("missing", "x", 1), RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = repo.replace(Ticket { id: None, ..ticket("", "x", 1) }, RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        assert!(repo.delete("t1", RequestOptions::new()).await.unwrap());
        assert_eq!(repo.len().await, 2);
    }

    #[tokio::test]
    async fn queries_filter_order_and_count() {
        let repo = seeded().await;

        let titles = repo
            .select(
                Query::builder().filter(|t: &Ticket| t.priority > 1).order_by_desc(|t: &Ticket| t.priority).build(),
                |t| t.title,
                FeedOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(titles, vec!["signup", "login"]);

        let count = repo
            .count(Query::matching(Filter::starts_with("title", "log")), FeedOptions::new())
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn paging_walks_the_whole_result() {
        let repo = seeded().await;
        let mut token = None;
        let mut seen = Vec::new();
        let mut pages = 0;

        loop {
            let page = repo
                .select_paged(2, token, Query::new(), |t: Ticket| t.id, FeedOptions::new())
                .await
                .unwrap();

            pages += 1;
            seen.extend(page.items.into_iter().flatten());

            match page.continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 2);
        assert_eq!(seen, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn builder_names_the_collection_and_clones_share_state() {
        let repo = InMemoryRepository::<Ticket>::builder()
            .collection_name("tickets")
            .build()
            .await
            .unwrap();
        let clone = repo.clone();

        clone.add(ticket("t9", "shared", 1), RequestOptions::new()).await.unwrap();
        let err = repo.add(ticket("t9", "again", 1), RequestOptions::new()).await.unwrap_err();

        assert_eq!(repo.collection_name(), "tickets");
        assert_eq!(err.to_string(), "Item t9 already exists in collection");

        repo.clear().await;
        assert!(clone.is_empty().await);
    }
}
