//! In-memory repositories for docrepo.
//!
//! This crate provides thread-safe, in-memory implementations of the `Repository` trait
//! that emulate a document database's consistency model: ETag-based optimistic
//! concurrency, per-partition id uniqueness, conflict detection and deep-copy isolation
//! between callers and the store. They let application code and its tests run against
//! the same contract as a network-backed repository without a live database.
//!
//! # Features
//!
//! - **Flat and partitioned stores** - [`InMemoryRepository`] and [`InMemoryPartitionedRepository`]
//! - **Optimistic concurrency** - Fresh ETag on every write, stale ETags are rejected
//! - **Full query support** - Closure and structured filters, ordering, skip/take, shaping
//! - **Stateless paging** - Continuation tokens carry the remaining results
//! - **Fault injection** - Fail get, add and count on demand through [`Faults`]
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryRepository};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Entity)]
//! pub struct User {
//!     #[entity(id)]
//!     pub id: Option<String>,
//!     #[entity(etag)]
//!     pub etag: Option<String>,
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let users = InMemoryRepository::<User>::builder()
//!         .collection_name("users")
//!         .build()
//!         .await?;
//!
//!     let alice = users
//!         .add(User { id: None, etag: None, name: "Alice".into() }, RequestOptions::new())
//!         .await?;
//!
//!     let found = users.get(alice.id.as_deref().unwrap_or_default(), RequestOptions::new()).await?;
//!     assert_eq!(found.map(|u| u.name).as_deref(), Some("Alice"));
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

mod evaluator;
mod pipeline;
mod storage;

pub mod faults;
pub mod flat;
pub mod partition;
pub mod partitioned;

pub use faults::Faults;
pub use flat::{InMemoryRepository, InMemoryRepositoryBuilder};
pub use partition::PartitionKeySelector;
pub use partitioned::{InMemoryPartitionedRepository, InMemoryPartitionedRepositoryBuilder};
pub use storage::ItemMetadata;
