//! Partitioned in-memory repository: one logical collection split into partition buckets.
//!
//! Buckets are created on the first write to a partition and removed once a delete
//! leaves them empty. A single lock guards the whole partition map, so operations on
//! different partitions still serialize against each other.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::BTreeMap, fmt, sync::Arc};
use tracing::{debug, trace};

use docrepo_core::{
    entity::{Entity, EntityDescriptor, descriptor_for},
    error::{RepositoryError, RepositoryResult},
    options::{FeedOptions, PartitionKey, RequestOptions},
    page::Page,
    query::Query,
    repository::{Repository, RepositoryBuilder},
};

use crate::{
    faults::Faults,
    partition::{FeedScope, PartitionKeySelector, PartitionResolver},
    pipeline,
    storage::{Bucket, DEFAULT_COLLECTION, ItemMetadata, ensure_id, require_id},
};

type PartitionMap<T> = BTreeMap<PartitionKey, Bucket<T>>;

fn partition_not_found(key: &PartitionKey) -> RepositoryError {
    RepositoryError::PartitionNotFound(key.to_string())
}

fn prune<T: Entity>(partitions: &mut PartitionMap<T>, key: &PartitionKey) {
    if partitions.get(key).is_some_and(Bucket::is_empty) {
        partitions.remove(key);
        trace!(partition = %key, "removed empty partition");
    }
}

/// Thread-safe in-memory repository over a partitioned collection.
///
/// Each operation targets one partition, chosen by the explicit key in its options or,
/// for operations that carry an entity, by the configured partition key selector. Ids
/// are unique within a partition only: the same id may be stored once per partition.
///
/// Reads need a partition key unless [`FeedOptions::enable_cross_partition_query`] is
/// set, in which case every partition is scanned in key order.
///
/// # Example
///
/// ```ignore
/// use docrepo::{prelude::*, memory::InMemoryPartitionedRepository};
///
/// let repo = InMemoryPartitionedRepository::<Order>::builder()
///     .collection_name("orders")
///     .partition_key_selector(|order| PartitionKey::from(&order.tenant))
///     .build()
///     .await?;
///
/// repo.add(order, RequestOptions::new()).await?;
/// let found = repo.get("o-1", RequestOptions::partition("tenant-a")).await?;
/// ```
pub struct InMemoryPartitionedRepository<T: Entity> {
    collection: Arc<str>,
    descriptor: EntityDescriptor<T>,
    resolver: PartitionResolver<T>,
    partitions: Arc<RwLock<PartitionMap<T>>>,
    faults: Faults<T>,
}

impl<T: Entity> Clone for InMemoryPartitionedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            descriptor: self.descriptor,
            resolver: self.resolver.clone(),
            partitions: Arc::clone(&self.partitions),
            faults: self.faults.clone(),
        }
    }
}

impl<T: Entity> fmt::Debug for InMemoryPartitionedRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPartitionedRepository")
            .field("collection", &self.collection)
            .field("entity", &self.descriptor.type_name())
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> Default for InMemoryPartitionedRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryPartitionedRepository<T> {
    /// Creates an empty repository without a partition key selector.
    ///
    /// Every operation on such a repository must pass an explicit partition key.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_COLLECTION, None)
    }

    fn with_config(collection: &str, selector: Option<PartitionKeySelector<T>>) -> Self {
        Self {
            collection: Arc::from(collection),
            descriptor: descriptor_for::<T>(),
            resolver: PartitionResolver::new(selector),
            partitions: Arc::new(RwLock::new(PartitionMap::new())),
            faults: Faults::default(),
        }
    }

    pub fn builder() -> InMemoryPartitionedRepositoryBuilder<T> {
        InMemoryPartitionedRepositoryBuilder::default()
    }

    /// Returns the fault-injection handle shared by every clone of this repository.
    pub fn faults(&self) -> &Faults<T> {
        &self.faults
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    /// Returns `true` if a partition key selector is configured.
    pub fn has_partition_key_selector(&self) -> bool {
        self.resolver.has_selector()
    }

    /// Returns the number of stored items across all partitions.
    pub async fn len(&self) -> usize {
        self.partitions.read().await.values().map(Bucket::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.partitions.read().await.is_empty()
    }

    /// Returns the keys of the partitions currently holding items, in key order.
    pub async fn partitions(&self) -> Vec<PartitionKey> {
        self.partitions.read().await.keys().cloned().collect()
    }

    /// Returns the store-managed metadata of an item.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidOperation`] if `options` carries no partition key.
    pub async fn metadata(&self, id: &str, options: RequestOptions) -> RepositoryResult<Option<ItemMetadata>> {
        let key = self.resolver.for_id(id, options.partition_key.as_ref())?;

        Ok(self
            .partitions
            .read()
            .await
            .get(&key)
            .and_then(|bucket| bucket.metadata(id, Some(&key))))
    }

    /// Removes every partition. Fault registrations are kept.
    pub async fn clear(&self) {
        self.partitions.write().await.clear();
        debug!(collection = %self.collection, "cleared collection");
    }

    async fn read_item(&self, id: &str, key: &PartitionKey) -> Option<T> {
        self.partitions
            .read()
            .await
            .get(key)
            .and_then(|bucket| bucket.read(id))
    }

    async fn query(&self, query: Query<T>, options: FeedOptions) -> RepositoryResult<Vec<T>> {
        let scope = self.resolver.for_feed(&options)?;

        let items = {
            let partitions = self.partitions.read().await;

            match &scope {
                FeedScope::Partition(key) => partitions
                    .get(key)
                    .map(Bucket::snapshot)
                    .unwrap_or_default(),
                FeedScope::AllPartitions => partitions
                    .values()
                    .flat_map(Bucket::snapshot)
                    .collect(),
            }
        };

        trace!(
            collection = %self.collection,
            scope = ?scope,
            scanned = items.len(),
            expressions = query.uses_expressions(),
            max_item_count = ?options.max_item_count,
            "querying partitions"
        );

        pipeline::apply_query(items, query)
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for InMemoryPartitionedRepository<T> {
    async fn add(&self, mut entity: T, options: RequestOptions) -> RepositoryResult<T> {
        self.faults.check_add(&entity).await?;

        let id = ensure_id(&self.descriptor, &mut entity)?;
        let key = self.resolver.for_entity(&entity, options.partition_key.as_ref())?;

        self.partitions
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .add(&self.descriptor, id.clone(), entity, Some(&key))
            .inspect(|_| debug!(collection = %self.collection, partition = %key, id = %id, "added item"))
            .inspect_err(|e| debug!(collection = %self.collection, partition = %key, id = %id, error = %e, "add rejected"))
    }

    async fn upsert(&self, mut entity: T, options: RequestOptions) -> RepositoryResult<T> {
        let id = ensure_id(&self.descriptor, &mut entity)?;
        let key = self.resolver.for_entity(&entity, options.partition_key.as_ref())?;

        self.partitions
            .write()
            .await
            .entry(key.clone())
            .or_default()
            .upsert(&self.descriptor, id.clone(), entity)
            .inspect(|_| debug!(collection = %self.collection, partition = %key, id = %id, "upserted item"))
            .inspect_err(|e| debug!(collection = %self.collection, partition = %key, id = %id, error = %e, "upsert rejected"))
    }

    async fn replace(&self, entity: T, options: RequestOptions) -> RepositoryResult<T> {
        let id = require_id(&self.descriptor, &entity, "replace")?;
        let key = self.resolver.for_entity(&entity, options.partition_key.as_ref())?;

        let mut partitions = self.partitions.write().await;
        let bucket = partitions.get_mut(&key).ok_or_else(|| partition_not_found(&key))?;

        bucket
            .replace(&self.descriptor, id.clone(), entity, Some(&key))
            .inspect(|_| debug!(collection = %self.collection, partition = %key, id = %id, "replaced item"))
            .inspect_err(|e| debug!(collection = %self.collection, partition = %key, id = %id, error = %e, "replace rejected"))
    }

    async fn get(&self, id: &str, options: RequestOptions) -> RepositoryResult<Option<T>> {
        self.faults.check_get(id).await?;

        let key = self.resolver.for_id(id, options.partition_key.as_ref())?;

        Ok(self.read_item(id, &key).await)
    }

    async fn get_entity(&self, entity: &T, options: RequestOptions) -> RepositoryResult<Option<T>> {
        let id = require_id(&self.descriptor, entity, "get")?;
        self.faults.check_get(&id).await?;

        let key = self.resolver.for_entity(entity, options.partition_key.as_ref())?;

        Ok(self.read_item(&id, &key).await)
    }

    async fn delete(&self, id: &str, options: RequestOptions) -> RepositoryResult<bool> {
        let key = self.resolver.for_id(id, options.partition_key.as_ref())?;

        let mut partitions = self.partitions.write().await;
        let removed = partitions
            .get_mut(&key)
            .ok_or_else(|| partition_not_found(&key))?
            .delete(id);

        prune(&mut partitions, &key);
        debug!(collection = %self.collection, partition = %key, id = %id, removed, "deleted item");

        Ok(removed)
    }

    async fn delete_entity(&self, entity: &T, options: RequestOptions) -> RepositoryResult<bool> {
        let id = require_id(&self.descriptor, entity, "delete")?;
        let key = self.resolver.for_entity(entity, options.partition_key.as_ref())?;

        let mut partitions = self.partitions.write().await;
        let removed = partitions
            .get_mut(&key)
            .ok_or_else(|| partition_not_found(&key))?
            .delete_checked(&self.descriptor, &id, entity)
            .inspect_err(|e| debug!(collection = %self.collection, partition = %key, id = %id, error = %e, "delete rejected"))?;

        prune(&mut partitions, &key);
        debug!(collection = %self.collection, partition = %key, id = %id, removed, "deleted item");

        Ok(removed)
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

/// Builder for [`InMemoryPartitionedRepository`].
pub struct InMemoryPartitionedRepositoryBuilder<T> {
    collection: Option<String>,
    selector: Option<PartitionKeySelector<T>>,
}

impl<T> Default for InMemoryPartitionedRepositoryBuilder<T> {
    fn default() -> Self {
        Self { collection: None, selector: None }
    }
}

impl<T: Entity> InMemoryPartitionedRepositoryBuilder<T> {
    /// Sets the collection name used in log events and error messages.
    pub fn collection_name(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Derives the partition of entity-carrying operations that pass no explicit key.
    pub fn partition_key_selector(
        mut self,
        selector: impl Fn(&T) -> PartitionKey + Send + Sync + 'static,
    ) -> Self {
        self.selector = Some(Arc::new(selector));
        self
    }
}

#[async_trait]
impl<T: Entity> RepositoryBuilder for InMemoryPartitionedRepositoryBuilder<T> {
    type Repository = InMemoryPartitionedRepository<T>;

    async fn build(self) -> RepositoryResult<Self::Repository> {
        let collection = self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION);

        Ok(InMemoryPartitionedRepository::with_config(collection, self.selector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrepo_core::{
        entity::{EtagValue, IdValue},
        error::{ErrorKind, StatusCode},
    };
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Device {
        id: String,
        etag: Option<String>,
        site: String,
        online: bool,
    }

    impl Entity for Device {
        fn descriptor() -> EntityDescriptor<Self> {
            EntityDescriptor::builder("Device", |d: &Self| d.id.to_id())
                .id_setter(|d: &mut Self, id: &str| d.id.assign_id(id))
                .etag(|d: &Self| d.etag.to_etag(), |d: &mut Self, etag: &str| d.etag.assign_etag(etag))
                .build()
        }
    }

    fn device(id: &str, site: &str) -> Device {
        Device { id: id.into(), etag: None, site: site.into(), online: true }
    }

    async fn by_site() -> InMemoryPartitionedRepository<Device> {
        InMemoryPartitionedRepository::builder()
            .collection_name("devices")
            .partition_key_selector(|d: &Device| PartitionKey::from(&d.site))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn same_id_lives_once_per_partition() {
        let repo = by_site().await;

        repo.add(device("d1", "north"), RequestOptions::new()).await.unwrap();
        repo.add(device("d1", "south"), RequestOptions::new()).await.unwrap();

        let err = repo.add(device("d1", "north"), RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Item d1 already exists in partition north");

        assert_eq!(repo.len().await, 2);
        assert_eq!(repo.partitions().await, vec![PartitionKey::from("north"), PartitionKey::from("south")]);
    }

    #[tokio::test]
    async fn explicit_keys_override_the_selector() {
        let repo = by_site().await;

        repo.add(device("d1", "north"), RequestOptions::partition("archive")).await.unwrap();

        assert!(repo.get("d1", RequestOptions::partition("north")).await.unwrap().is_none());
        assert!(repo.get("d1", RequestOptions::partition("archive")).await.unwrap().is_some());

        let metadata = repo.metadata("d1", RequestOptions::partition("archive")).await.unwrap().unwrap();
        assert_eq!(metadata.partition, Some(PartitionKey::from("archive")));
    }

    #[tokio::test]
    async fn id_addressed_operations_need_a_key() {
        let repo = by_site().await;
        repo.add(device("d1", "north"), RequestOptions::new()).await.unwrap();

        let err = repo.get("d1", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let err = repo.delete("d1", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        // Entity-addressed reads fall back to the selector.
        assert!(repo.get_entity(&device("d1", "north"), RequestOptions::new()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_partitions_and_items_on_delete() {
        let repo = by_site().await;
        repo.add(device("d1", "north"), RequestOptions::new()).await.unwrap();

        let err = repo.delete("d1", RequestOptions::partition("east")).await.unwrap_err();
        assert_eq!(err, RepositoryError::PartitionNotFound("east".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert!(!repo.delete("d2", RequestOptions::partition("north")).await.unwrap());
        assert!(repo.delete_entity(&device("d1", "north"), RequestOptions::new()).await.unwrap());

        // The emptied partition is pruned, so deleting from it again fails.
        assert!(repo.partitions().await.is_empty());
        assert!(repo.delete("d1", RequestOptions::partition("north")).await.is_err());

        let err = repo.replace(device("d1", "north"), RequestOptions::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn feeds_scan_one_partition_or_all_in_key_order() {
        let repo = by_site().await;

        for (id, site) in [("d3", "south"), ("d1", "north"), ("d2", "north")] {
            repo.add(device(id, site), RequestOptions::new()).await.unwrap();
        }

        let north = repo
            .select(Query::new(), |d: Device| d.id, FeedOptions::partition("north"))
            .await
            .unwrap();
        assert_eq!(north, vec!["d1", "d2"]);

        let all = repo
            .select(Query::new(), |d: Device| d.id, FeedOptions::cross_partition())
            .await
            .unwrap();
        assert_eq!(all, vec!["d1", "d2", "d3"]);

        assert!(repo.find(Query::new(), FeedOptions::new()).await.is_err());
        assert_eq!(repo.count(Query::new(), FeedOptions::partition("west")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn repository_without_selector_requires_keys_for_writes() {
        let repo = InMemoryPartitionedRepository::<Device>::new();
        assert!(!repo.has_partition_key_selector());

        let err = repo.add(device("d1", "north"), RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(repo.is_empty().await);

        repo.add(device("d1", "north"), RequestOptions::partition(7u32)).await.unwrap();
        assert!(repo.get("d1", RequestOptions::partition("7")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn injected_get_faults_fire_before_key_resolution() {
        let repo = by_site().await;
        repo.faults()
            .fail_get(|id| id.starts_with("d"), StatusCode::TOO_MANY_REQUESTS, Some("throttled"))
            .await;

        let err = repo.get("d1", RequestOptions::new()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.kind(), ErrorKind::Injected);
    }
}
