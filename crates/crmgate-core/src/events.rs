//! Domain events produced by committed writes.
//!
//! An event is built immediately after the store of record accepts a write and
//! is then handed to a publisher. Once handed off, nothing in crmgate tracks
//! its delivery.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::model::{Contact, Customer};

/// Kind of domain change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DomainEventType {
    #[serde(rename = "customer.created")]
    CustomerCreated,
    #[serde(rename = "contact.created")]
    ContactCreated,
}

impl DomainEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventType::CustomerCreated => "customer.created",
            DomainEventType::ContactCreated => "contact.created",
        }
    }
}

impl std::fmt::Display for DomainEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A change to one entity, ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub event_type: DomainEventType,
    /// One key per affected entity, so a broker partitioning on it keeps the
    /// entity's events together.
    pub partition_key: String,
    /// JSON encoding of the committed record.
    pub payload: Vec<u8>,
    pub timestamp: OffsetDateTime,
}

impl DomainEvent {
    pub fn new(
        event_type: DomainEventType,
        partition_key: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            event_type,
            partition_key: partition_key.into(),
            payload,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn customer_created(customer: &Customer) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            DomainEventType::CustomerCreated,
            format!("customer-{}", customer.id),
            serde_json::to_vec(customer)?,
        ))
    }

    pub fn contact_created(contact: &Contact) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            DomainEventType::ContactCreated,
            format!("contact-{}", contact.id),
            serde_json::to_vec(contact)?,
        ))
    }
}
