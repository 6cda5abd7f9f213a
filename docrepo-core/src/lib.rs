//! A typed repository abstraction over document collections.
//!
//! This crate is the core of the docrepo project and provides:
//!
//! - **Entity descriptors** ([`entity`]) - Typed accessors for id, ETag and timestamp fields
//! - **Repository abstraction** ([`repository`]) - The contract shared by every backend
//! - **Query API** ([`query`]) - Closure and structured filters, ordering and shaping stages
//! - **Per-call options** ([`options`]) - Partition keys and cross-partition reads
//! - **Paged results** ([`page`]) - Pages and continuation tokens
//! - **Error handling** ([`error`]) - Error kinds with machine-checkable status codes
//!
//! # Example
//!
//! ```ignore
//! use docrepo::entity::{Entity, EntityDescriptor, IdValue};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub id: String,
//!     pub name: String,
//! }
//!
//! impl Entity for User {
//!     fn descriptor() -> EntityDescriptor<Self> {
//!         EntityDescriptor::builder("User", |u: &Self| u.id.to_id())
//!             .id_setter(|u: &mut Self, id: &str| u.id.assign_id(id))
//!             .build()
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod entity;
pub mod error;
pub mod options;
pub mod page;
pub mod query;
pub mod repository;
