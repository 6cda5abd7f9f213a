#![allow(dead_code)]

use docrepo::{
    memory::{InMemoryPartitionedRepository, InMemoryRepository},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
pub struct Record {
    pub id: String,
    #[entity(etag)]
    pub etag: Option<String>,
    pub data: String,
}

impl Record {
    pub fn new(id: &str, data: &str) -> Self {
        Record { id: id.into(), etag: None, data: data.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
#[entity(name = "Order")]
pub struct Order {
    #[entity(id)]
    pub order_id: Option<String>,
    #[entity(etag)]
    pub etag: Option<String>,
    #[entity(timestamp)]
    pub updated_at: Option<i64>,
    pub tenant: String,
    pub status: String,
    pub total: u32,
    pub lines: Vec<String>,
}

impl Order {
    pub fn new(tenant: &str, status: &str, total: u32) -> Self {
        Order {
            order_id: None,
            etag: None,
            updated_at: None,
            tenant: tenant.into(),
            status: status.into(),
            total,
            lines: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.order_id = Some(id.into());
        self
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines = lines.iter().map(|line| line.to_string()).collect();
        self
    }

    pub fn id(&self) -> &str {
        self.order_id.as_deref().unwrap_or_default()
    }
}

/// An entity whose id the store may never generate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Entity)]
pub struct Sku {
    #[entity(id, readonly)]
    pub code: Option<u64>,
    pub label: String,
}

pub async fn records() -> InMemoryRepository<Record> {
    InMemoryRepository::builder()
        .collection_name("records")
        .build()
        .await
        .unwrap()
}

pub async fn orders_by_tenant() -> InMemoryPartitionedRepository<Order> {
    InMemoryPartitionedRepository::builder()
        .collection_name("orders")
        .partition_key_selector(|order: &Order| PartitionKey::from(&order.tenant))
        .build()
        .await
        .unwrap()
}
