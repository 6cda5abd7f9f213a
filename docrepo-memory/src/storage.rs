//! Storage primitives shared by the flat and partitioned repositories.
//!
//! A [`Bucket`] is an insertion-ordered list of stored items with unique ids. It owns
//! the ETag and timestamp bookkeeping and the optimistic concurrency check; the
//! repositories decide which bucket an operation targets and hold the lock around it.

use chrono::Utc;
use uuid::Uuid;

use docrepo_core::{
    entity::{Entity, EntityDescriptor},
    error::{RepositoryError, RepositoryResult},
    options::PartitionKey,
};

/// Collection name used when a builder is not given one.
pub(crate) const DEFAULT_COLLECTION: &str = "collection";

/// Store-managed metadata of one stored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    /// Id captured when the item was written.
    pub id: String,
    /// Partition holding the item, `None` in a flat repository.
    pub partition: Option<PartitionKey>,
    /// Current ETag, replaced on every successful write.
    pub etag: String,
    /// Seconds since the Unix epoch of the last successful write.
    pub update_timestamp: i64,
}

/// One deep copy of an entity plus the metadata the store manages for it.
#[derive(Debug, Clone)]
pub(crate) struct StoredItem<T> {
    pub id: String,
    pub etag: String,
    pub update_timestamp: i64,
    pub entity: T,
}

/// Insertion-ordered items with unique ids.
///
/// Writes that replace an item remove the old copy and append the new one, so the most
/// recently written item is always last.
#[derive(Debug)]
pub(crate) struct Bucket<T> {
    items: Vec<StoredItem<T>>,
}

impl<T> Default for Bucket<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

fn scope_of(partition: Option<&PartitionKey>) -> Option<String> {
    partition.map(|key| key.to_string())
}

pub(crate) fn new_etag() -> String {
    Uuid::new_v4().to_string()
}

pub(crate) fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Returns the entity's id, generating and writing a fresh one if it has none.
///
/// # Errors
///
/// Returns [`RepositoryError::InvalidOperation`] if an id must be generated but the
/// entity's id field is not writable.
pub(crate) fn ensure_id<T>(descriptor: &EntityDescriptor<T>, entity: &mut T) -> RepositoryResult<String> {
    if let Some(id) = descriptor.id(entity) {
        return Ok(id);
    }

    if !descriptor.has_writable_id() {
        return Err(RepositoryError::InvalidOperation(format!(
            "{} has no id and its id field is read-only",
            descriptor.type_name()
        )));
    }

    let id = Uuid::new_v4().to_string();
    descriptor.assign_id(entity, &id)?;

    Ok(id)
}

/// Returns the entity's id, failing if it has none.
pub(crate) fn require_id<T>(
    descriptor: &EntityDescriptor<T>,
    entity: &T,
    operation: &str,
) -> RepositoryResult<String> {
    descriptor.id(entity).ok_or_else(|| {
        RepositoryError::InvalidOperation(format!(
            "{operation} requires a {} with an id",
            descriptor.type_name()
        ))
    })
}

/// Fails with `PreconditionFailed` if the incoming entity carries an ETag that differs
/// from the stored one. An entity without an ETag always passes.
pub(crate) fn check_precondition<T>(
    descriptor: &EntityDescriptor<T>,
    incoming: &T,
    stored: &StoredItem<T>,
) -> RepositoryResult<()> {
    match descriptor.etag(incoming) {
        Some(expected) if expected != stored.etag => Err(RepositoryError::PreconditionFailed {
            id: stored.id.clone(),
            expected,
            actual: stored.etag.clone(),
        }),
        _ => Ok(()),
    }
}

impl<T: Entity> Bucket<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&StoredItem<T>> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Returns a deep copy of the stored entity.
    pub fn read(&self, id: &str) -> Option<T> {
        self.get(id).map(|item| item.entity.clone())
    }

    /// Returns deep copies of every stored entity, in storage order.
    pub fn snapshot(&self) -> Vec<T> {
        self.items
            .iter()
            .map(|item| item.entity.clone())
            .collect()
    }

    pub fn metadata(&self, id: &str, partition: Option<&PartitionKey>) -> Option<ItemMetadata> {
        self.get(id).map(|item| ItemMetadata {
            id: item.id.clone(),
            partition: partition.cloned(),
            etag: item.etag.clone(),
            update_timestamp: item.update_timestamp,
        })
    }

    fn remove(&mut self, id: &str) -> Option<StoredItem<T>> {
        self.position(id).map(|index| self.items.remove(index))
    }

    /// Stamps a fresh ETag and timestamp onto the entity, stores it and returns a copy.
    fn store(&mut self, descriptor: &EntityDescriptor<T>, id: String, mut entity: T) -> T {
        let etag = new_etag();
        let update_timestamp = now_timestamp();

        descriptor.assign_etag(&mut entity, &etag);
        descriptor.assign_timestamp(&mut entity, update_timestamp);

        let stored = entity.clone();
        self.items.push(StoredItem { id, etag, update_timestamp, entity: stored });

        entity
    }

    pub fn add(
        &mut self,
        descriptor: &EntityDescriptor<T>,
        id: String,
        entity: T,
        partition: Option<&PartitionKey>,
    ) -> RepositoryResult<T> {
        if self.position(&id).is_some() {
            return Err(RepositoryError::Conflict { id, partition: scope_of(partition) });
        }

        Ok(self.store(descriptor, id, entity))
    }

    pub fn upsert(&mut self, descriptor: &EntityDescriptor<T>, id: String, entity: T) -> RepositoryResult<T> {
        if let Some(existing) = self.get(&id) {
            check_precondition(descriptor, &entity, existing)?;
            self.remove(&id);
        }

        Ok(self.store(descriptor, id, entity))
    }

    pub fn replace(
        &mut self,
        descriptor: &EntityDescriptor<T>,
        id: String,
        entity: T,
        partition: Option<&PartitionKey>,
    ) -> RepositoryResult<T> {
        let existing = self.get(&id).ok_or_else(|| RepositoryError::NotFound {
            id: id.clone(),
            partition: scope_of(partition),
        })?;

        check_precondition(descriptor, &entity, existing)?;
        self.remove(&id);

        Ok(self.store(descriptor, id, entity))
    }

    /// Removes an item without an ETag check. Returns `false` if it was not stored.
    pub fn delete(&mut self, id: &str) -> bool {
        self.remove(id).is_some()
    }

    /// Removes the item matching `entity` after an ETag check.
    pub fn delete_checked(&mut self, descriptor: &EntityDescriptor<T>, id: &str, entity: &T) -> RepositoryResult<bool> {
        match self.get(id) {
            Some(existing) => {
                check_precondition(descriptor, entity, existing)?;
                self.remove(id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
