//! Per-call options for repository operations.
//!
//! [`RequestOptions`] accompany point operations (add, get, upsert, replace, delete) and
//! [`FeedOptions`] accompany reads that return many items (find, select, count).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A partition key value, normalized to its string form.
///
/// Keys built from different types compare equal when their string forms match, so
/// `PartitionKey::from(7)` and `PartitionKey::from("7")` address the same partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(value: impl fmt::Display) -> Self {
        PartitionKey(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(value: &str) -> Self {
        PartitionKey(value.to_string())
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        PartitionKey(value)
    }
}

impl From<&String> for PartitionKey {
    fn from(value: &String) -> Self {
        PartitionKey(value.clone())
    }
}

impl From<Uuid> for PartitionKey {
    fn from(value: Uuid) -> Self {
        PartitionKey::new(value)
    }
}

macro_rules! display_partition_key {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PartitionKey {
                fn from(value: $ty) -> Self {
                    PartitionKey::new(value)
                }
            }
        )*
    };
}

display_partition_key!(bool, i32, i64, u32, u64);

/// Options for a single-item operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Explicit partition key. Takes precedence over a configured partition key selector.
    pub partition_key: Option<PartitionKey>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for options targeting one partition.
    pub fn partition(key: impl Into<PartitionKey>) -> Self {
        Self { partition_key: Some(key.into()) }
    }

    pub fn with_partition_key(mut self, key: impl Into<PartitionKey>) -> Self {
        self.partition_key = Some(key.into());
        self
    }
}

/// Options for multi-item reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedOptions {
    /// Explicit partition key to read from.
    pub partition_key: Option<PartitionKey>,
    /// Scan every partition instead of one. Makes `partition_key` optional.
    pub enable_cross_partition_query: bool,
    /// Hint for the number of items fetched per round trip.
    pub max_item_count: Option<usize>,
}

impl FeedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for options reading one partition.
    pub fn partition(key: impl Into<PartitionKey>) -> Self {
        Self { partition_key: Some(key.into()), ..Self::default() }
    }

    /// Shorthand for options reading every partition.
    pub fn cross_partition() -> Self {
        Self { enable_cross_partition_query: true, ..Self::default() }
    }

    pub fn with_partition_key(mut self, key: impl Into<PartitionKey>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_cross_partition_query(mut self, enabled: bool) -> Self {
        self.enable_cross_partition_query = enabled;
        self
    }

    pub fn with_max_item_count(mut self, max_item_count: usize) -> Self {
        self.max_item_count = Some(max_item_count);
        self
    }
}
