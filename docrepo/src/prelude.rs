//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```

pub use docrepo_core::{
    entity::{Entity, EntityDescriptor, EntityDescriptorBuilder, EtagValue, IdValue, TimestampValue, descriptor_for},
    error::{ErrorKind, RepositoryError, RepositoryResult, StatusCode},
    options::{FeedOptions, PartitionKey, RequestOptions},
    page::Page,
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    repository::{Repository, RepositoryBuilder},
};

pub use docrepo_macros::Entity;
