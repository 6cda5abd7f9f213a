//! Main docrepo crate providing a typed repository interface over document collections.
//!
//! This crate is the primary entry point for users of docrepo. It re-exports the core
//! types from the sub-crates, the `#[derive(Entity)]` macro and the in-memory
//! repositories used to test application code without a live database.
//!
//! # Features
//!
//! - **Typed CRUD** - Add, upsert, replace, get and delete entities defined with Serde
//! - **Optimistic concurrency** - ETags on every write, stale writes fail with 412
//! - **Partitions** - Explicit partition keys or a per-entity selector
//! - **Flexible querying** - Closure and structured filters, ordering, paging and projections
//! - **Fault injection** - Make reads, writes and counts fail on demand in tests
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryPartitionedRepository};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! pub struct Order {
//!     #[entity(id)]
//!     pub id: Option<String>,
//!     #[entity(etag)]
//!     pub etag: Option<String>,
//!     pub tenant: String,
//!     pub total: u32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orders = InMemoryPartitionedRepository::<Order>::builder()
//!         .collection_name("orders")
//!         .partition_key_selector(|order| PartitionKey::from(&order.tenant))
//!         .build()
//!         .await?;
//!
//!     let stored = orders
//!         .add(Order { id: None, etag: None, tenant: "acme".into(), total: 120 }, RequestOptions::new())
//!         .await?;
//!
//!     // Writing back a stale copy fails the ETag check.
//!     orders.replace(Order { total: 90, ..stored.clone() }, RequestOptions::new()).await?;
//!     let err = orders.replace(stored, RequestOptions::new()).await.unwrap_err();
//!     assert_eq!(err.status_code(), StatusCode::PRECONDITION_FAILED);
//!
//!     // Page through a partition.
//!     let page = orders
//!         .find_paged(10, None, Query::filtered(|o: &Order| o.total > 50), FeedOptions::partition("acme"))
//!         .await?;
//!     println!("{} orders, more: {}", page.len(), page.has_more());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory repositories for development and testing

#[allow(unused_extern_crates)]
extern crate self as docrepo;

pub mod prelude;

pub use docrepo_core::{entity, error, options, page, query, repository};
pub use docrepo_macros::Entity;

// Re-exported for implementing `Repository` and building structured filter values.
pub use async_trait::async_trait;
pub use serde_json;

/// In-memory repository implementations.
pub mod memory {
    pub use docrepo_memory::{
        Faults,
        InMemoryPartitionedRepository,
        InMemoryPartitionedRepositoryBuilder,
        InMemoryRepository,
        InMemoryRepositoryBuilder,
        ItemMetadata,
        PartitionKeySelector,
    };
}
