//! Entity descriptors: typed accessors for an entity's identity and concurrency fields.
//!
//! A repository never inspects an entity's shape at runtime. Instead, every entity type
//! provides an [`EntityDescriptor`] made of plain function pointers that read and write
//! its id, its ETag and, optionally, its update timestamp. Descriptors are built once per
//! type and cached process-wide by [`descriptor_for`].
//!
//! # Example
//!
//! ```ignore
//! use docrepo::entity::{Entity, EntityDescriptor, IdValue, EtagValue};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Order {
//!     pub id: Option<String>,
//!     pub etag: Option<String>,
//!     pub customer: String,
//! }
//!
//! impl Entity for Order {
//!     fn descriptor() -> EntityDescriptor<Self> {
//!         EntityDescriptor::builder("Order", |o: &Self| o.id.to_id())
//!             .id_setter(|o: &mut Self, id: &str| o.id.assign_id(id))
//!             .etag(|o: &Self| o.etag.to_etag(), |o: &mut Self, etag: &str| o.etag.assign_etag(etag))
//!             .build()
//!     }
//! }
//! ```
//!
//! Most types derive the implementation instead with `#[derive(Entity)]`.

use dashmap::DashMap;
use lazy_static::lazy_static;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};
use uuid::Uuid;

use crate::error::{RepositoryError, RepositoryResult};

/// Core trait that every entity stored in a repository must implement.
///
/// `Clone` is the deep-copy capability: repositories clone an entity on every read and
/// write boundary so callers and the store never share mutable state. `Serialize` and
/// `Deserialize` are required for continuation tokens and structured filters.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Builds the accessor table for this entity type.
    ///
    /// Called at most once per type by [`descriptor_for`]; repositories read the cached copy.
    fn descriptor() -> EntityDescriptor<Self>;
}

type GetId<T> = fn(&T) -> Option<String>;
type SetId<T> = fn(&mut T, &str) -> bool;
type GetEtag<T> = fn(&T) -> Option<String>;
type SetEtag<T> = fn(&mut T, &str);
type SetTimestamp<T> = fn(&mut T, i64);

/// Accessor table for one entity type.
///
/// Descriptors are `Copy`: they only hold a type name and function pointers.
pub struct EntityDescriptor<T> {
    type_name: &'static str,
    get_id: GetId<T>,
    set_id: Option<SetId<T>>,
    get_etag: Option<GetEtag<T>>,
    set_etag: Option<SetEtag<T>>,
    set_timestamp: Option<SetTimestamp<T>>,
}

impl<T> Clone for EntityDescriptor<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityDescriptor<T> {}

impl<T> fmt::Debug for EntityDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("type_name", &self.type_name)
            .field("writable_id", &self.set_id.is_some())
            .field("etag", &self.get_etag.is_some())
            .field("timestamp", &self.set_timestamp.is_some())
            .finish()
    }
}

impl<T> EntityDescriptor<T> {
    /// Starts a descriptor for a type whose id is read by `get_id`.
    pub fn builder(type_name: &'static str, get_id: GetId<T>) -> EntityDescriptorBuilder<T> {
        EntityDescriptorBuilder::new(type_name, get_id)
    }

    /// Returns the name of the described type, used in logs and error messages.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the entity's id, or `None` if it has not been assigned one yet.
    pub fn id(&self, entity: &T) -> Option<String> {
        (self.get_id)(entity).filter(|id| !id.is_empty())
    }

    /// Returns `true` if the id field can be written by the store.
    pub fn has_writable_id(&self) -> bool {
        self.set_id.is_some()
    }

    /// Writes `id` into the entity's identity field.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidOperation`] if the id field is read-only or the
    /// value cannot be represented by the field's type.
    pub fn assign_id(&self, entity: &mut T, id: &str) -> RepositoryResult<()> {
        let set_id = self.set_id.ok_or_else(|| {
            RepositoryError::InvalidOperation(format!(
                "the id field of {} is not writable",
                self.type_name
            ))
        })?;

        if set_id(entity, id) {
            Ok(())
        } else {
            Err(RepositoryError::InvalidOperation(format!(
                "cannot assign id {id} to the id field of {}",
                self.type_name
            )))
        }
    }

    /// Returns the entity's ETag, treating an empty token as absent.
    pub fn etag(&self, entity: &T) -> Option<String> {
        self.get_etag
            .and_then(|get_etag| get_etag(entity))
            .filter(|etag| !etag.is_empty())
    }

    /// Writes a store-generated ETag into the entity, if it has an ETag field.
    pub fn assign_etag(&self, entity: &mut T, etag: &str) {
        if let Some(set_etag) = self.set_etag {
            set_etag(entity, etag);
        }
    }

    /// Writes the store's update timestamp into the entity, if it has a timestamp field.
    pub fn assign_timestamp(&self, entity: &mut T, timestamp: i64) {
        if let Some(set_timestamp) = self.set_timestamp {
            set_timestamp(entity, timestamp);
        }
    }
}

/// Builder for [`EntityDescriptor`].
pub struct EntityDescriptorBuilder<T> {
    descriptor: EntityDescriptor<T>,
}

impl<T> EntityDescriptorBuilder<T> {
    pub fn new(type_name: &'static str, get_id: GetId<T>) -> Self {
        Self {
            descriptor: EntityDescriptor {
                type_name,
                get_id,
                set_id: None,
                get_etag: None,
                set_etag: None,
                set_timestamp: None,
            },
        }
    }

    /// Makes the id field writable so the store can generate ids on insert.
    ///
    /// The setter returns `false` if the value cannot be stored in the field.
    pub fn id_setter(mut self, set_id: SetId<T>) -> Self {
        self.descriptor.set_id = Some(set_id);
        self
    }

    /// Declares the entity's ETag field.
    pub fn etag(mut self, get_etag: GetEtag<T>, set_etag: SetEtag<T>) -> Self {
        self.descriptor.get_etag = Some(get_etag);
        self.descriptor.set_etag = Some(set_etag);
        self
    }

    /// Declares a field that receives the store's update timestamp (seconds).
    pub fn timestamp(mut self, set_timestamp: SetTimestamp<T>) -> Self {
        self.descriptor.set_timestamp = Some(set_timestamp);
        self
    }

    pub fn build(self) -> EntityDescriptor<T> {
        self.descriptor
    }
}

lazy_static! {
    static ref DESCRIPTORS: DashMap<TypeId, Arc<dyn Any + Send + Sync>> = DashMap::new();
}

fn cached<T: Entity>() -> Option<EntityDescriptor<T>> {
    DESCRIPTORS
        .get(&TypeId::of::<T>())
        .and_then(|entry| entry.value().as_ref().downcast_ref::<EntityDescriptor<T>>().copied())
}

/// Returns the descriptor for `T`, building and caching it on first use.
///
/// The cache is shared by the whole process. Concurrent first calls for the same type
/// race on an atomic insert-if-absent, so [`Entity::descriptor`] runs once per type.
pub fn descriptor_for<T: Entity>() -> EntityDescriptor<T> {
    if let Some(descriptor) = cached::<T>() {
        return descriptor;
    }

    // Built outside the shard lock: a descriptor may itself look up other descriptors.
    let built: Arc<dyn Any + Send + Sync> = Arc::new(T::descriptor());
    let entry = DESCRIPTORS.entry(TypeId::of::<T>()).or_insert(built);

    let descriptor = entry
        .value()
        .as_ref()
        .downcast_ref::<EntityDescriptor<T>>()
        .copied();

    descriptor.unwrap_or_else(T::descriptor)
}

/// Conversion between an id field and its string form.
///
/// Implemented for the field types `#[derive(Entity)]` accepts as an id.
pub trait IdValue {
    /// Returns the string form of the id, or `None` if no id is set.
    fn to_id(&self) -> Option<String>;

    /// Parses `id` into the field. Returns `false` if the value does not fit.
    fn assign_id(&mut self, id: &str) -> bool;
}

impl IdValue for String {
    fn to_id(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.clone())
    }

    fn assign_id(&mut self, id: &str) -> bool {
        *self = id.to_string();
        true
    }
}

impl IdValue for Uuid {
    fn to_id(&self) -> Option<String> {
        (!self.is_nil()).then(|| self.to_string())
    }

    fn assign_id(&mut self, id: &str) -> bool {
        match Uuid::parse_str(id) {
            Ok(parsed) => {
                *self = parsed;
                true
            }
            Err(_) => false,
        }
    }
}

impl<V: IdValue + Default> IdValue for Option<V> {
    fn to_id(&self) -> Option<String> {
        self.as_ref().and_then(IdValue::to_id)
    }

    fn assign_id(&mut self, id: &str) -> bool {
        let mut value = V::default();

        if value.assign_id(id) {
            *self = Some(value);
            true
        } else {
            false
        }
    }
}

macro_rules! numeric_id_value {
    ($($ty:ty),*) => {
        $(
            impl IdValue for $ty {
                fn to_id(&self) -> Option<String> {
                    Some(self.to_string())
                }

                fn assign_id(&mut self, id: &str) -> bool {
                    match id.parse::<$ty>() {
                        Ok(parsed) => {
                            *self = parsed;
                            true
                        }
                        Err(_) => false,
                    }
                }
            }
        )*
    };
}

numeric_id_value!(i32, i64, u32, u64);

/// Conversion between an ETag field and its string form.
pub trait EtagValue {
    fn to_etag(&self) -> Option<String>;
    fn assign_etag(&mut self, etag: &str);
}

impl EtagValue for String {
    fn to_etag(&self) -> Option<String> {
        Some(self.clone())
    }

    fn assign_etag(&mut self, etag: &str) {
        *self = etag.to_string();
    }
}

impl EtagValue for Option<String> {
    fn to_etag(&self) -> Option<String> {
        self.clone()
    }

    fn assign_etag(&mut self, etag: &str) {
        *self = Some(etag.to_string());
    }
}

/// Assignment of the store's update timestamp to a field.
pub trait TimestampValue {
    fn assign_timestamp(&mut self, timestamp: i64);
}

impl TimestampValue for i64 {
    fn assign_timestamp(&mut self, timestamp: i64) {
        *self = timestamp;
    }
}

impl TimestampValue for Option<i64> {
    fn assign_timestamp(&mut self, timestamp: i64) {
        *self = Some(timestamp);
    }
}
