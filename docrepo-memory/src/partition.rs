//! Partition key resolution for the partitioned repository.

use std::{fmt, sync::Arc};

use docrepo_core::{
    error::{RepositoryError, RepositoryResult},
    options::{FeedOptions, PartitionKey},
};

/// Derives an entity's partition key.
pub type PartitionKeySelector<T> = Arc<dyn Fn(&T) -> PartitionKey + Send + Sync>;

/// The partitions a read scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeedScope {
    Partition(PartitionKey),
    AllPartitions,
}

/// Picks the partition an operation applies to.
///
/// An explicit key from the call's options always wins. Otherwise writes and
/// entity-addressed reads fall back to the configured selector, while id-addressed
/// operations and single-partition reads have no fallback.
pub(crate) struct PartitionResolver<T> {
    selector: Option<PartitionKeySelector<T>>,
}

impl<T> Clone for PartitionResolver<T> {
    fn clone(&self) -> Self {
        Self { selector: self.selector.clone() }
    }
}

impl<T> fmt::Debug for PartitionResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionResolver")
            .field("selector", &self.selector.is_some())
            .finish()
    }
}

impl<T> PartitionResolver<T> {
    pub fn new(selector: Option<PartitionKeySelector<T>>) -> Self {
        Self { selector }
    }

    pub fn has_selector(&self) -> bool {
        self.selector.is_some()
    }

    /// Resolves the partition of an entity.
    pub fn for_entity(&self, entity: &T, explicit: Option<&PartitionKey>) -> RepositoryResult<PartitionKey> {
        if let Some(key) = explicit {
            return Ok(key.clone());
        }

        match &self.selector {
            Some(selector) => Ok(selector(entity)),
            None => Err(RepositoryError::InvalidOperation(
                "a partition key is required: pass one in the request options or configure a partition key selector".to_string(),
            )),
        }
    }

    /// Resolves the partition of an id-addressed operation, which needs an explicit key.
    pub fn for_id(&self, id: &str, explicit: Option<&PartitionKey>) -> RepositoryResult<PartitionKey> {
        explicit.cloned().ok_or_else(|| {
            RepositoryError::InvalidOperation(format!(
                "a partition key is required to address item {id}"
            ))
        })
    }

    /// Resolves the partitions a multi-item read scans.
    pub fn for_feed(&self, options: &FeedOptions) -> RepositoryResult<FeedScope> {
        match (&options.partition_key, options.enable_cross_partition_query) {
            (Some(key), _) => Ok(FeedScope::Partition(key.clone())),
            (None, true) => Ok(FeedScope::AllPartitions),
            (None, false) => Err(RepositoryError::InvalidOperation(
                "a partition key is required unless cross-partition queries are enabled".to_string(),
            )),
        }
    }
}
