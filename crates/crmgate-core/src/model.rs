//! Customer and contact records.
//!
//! `New*` types are what callers submit; the plain types are what the store of
//! record hands back after a commit (with generated id and timestamps).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::validation::{self, ValidationError};

/// A stored customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// A customer as submitted by a caller, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

impl NewCustomer {
    /// Trims the submitted fields and checks them against the customer rules.
    pub fn validated(self) -> Result<Self, ValidationError> {
        let customer = Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
        };
        validation::validate_customer(&customer)?;
        Ok(customer)
    }

    /// Attaches the id assigned by the store.
    pub fn into_customer(self, id: i64) -> Customer {
        Customer {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone,
        }
    }
}

/// A stored contact note attached to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: i64,
    pub customer_id: i64,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A contact note as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub customer_id: i64,
    pub content: String,
}

impl NewContact {
    pub fn validated(self) -> Result<Self, ValidationError> {
        let contact = Self {
            customer_id: self.customer_id,
            content: self.content.trim().to_string(),
        };
        validation::validate_contact(&contact)?;
        Ok(contact)
    }

    pub fn into_contact(self, id: i64, created_at: OffsetDateTime) -> Contact {
        Contact {
            id,
            customer_id: self.customer_id,
            content: self.content,
            created_at,
        }
    }
}
