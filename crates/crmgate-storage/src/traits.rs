//! Store-of-record traits.
//!
//! Reads take an already-normalized [`PageWindow`] so that every backend
//! applies the same LIMIT/OFFSET semantics. Counts ignore the window.

use std::sync::Arc;

use async_trait::async_trait;
use crmgate_core::{Contact, Customer, NewContact, NewCustomer, PageWindow};

use crate::error::StorageError;

/// Filter for customer listings.
///
/// `search` matches case-insensitively against name and email. An empty
/// search matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CustomerFilter {
    pub search: Option<String>,
}

impl CustomerFilter {
    /// Builds a filter from raw caller input, trimming and lowercasing it.
    pub fn search(term: impl AsRef<str>) -> Self {
        let term = term.as_ref().trim().to_lowercase();
        Self {
            search: (!term.is_empty()).then_some(term),
        }
    }

    /// The normalized search term, or `""` when there is none.
    pub fn term(&self) -> &str {
        self.search.as_deref().unwrap_or("")
    }
}

/// Stored login credentials for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub id: i64,
    pub email: String,
    /// PHC-format password hash.
    pub password_hash: String,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Persists a validated customer and returns it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` when the email is already taken.
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StorageError>;

    /// Lists customers matching `filter`, newest first.
    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        window: PageWindow,
    ) -> Result<Vec<Customer>, StorageError>;

    /// Counts every customer matching `filter`.
    async fn count_customers(&self, filter: &CustomerFilter) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Persists a validated contact note.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when the customer does not exist.
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StorageError>;

    /// Lists the contact notes of one customer, newest first.
    async fn list_contacts(
        &self,
        customer_id: i64,
        window: PageWindow,
    ) -> Result<Vec<Contact>, StorageError>;

    async fn count_contacts(&self, customer_id: i64) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Looks up login credentials by email. `None` when no such user exists.
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserCredentials>, StorageError>;
}

/// Everything the server needs from a store of record.
pub trait RecordStore: CustomerStore + ContactStore + UserStore {}

impl<T> RecordStore for T where T: CustomerStore + ContactStore + UserStore {}

pub type DynRecordStore = Arc<dyn RecordStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_filter_normalization() {
        assert_eq!(CustomerFilter::search("  Ali ").term(), "ali");
        assert_eq!(CustomerFilter::search("   ").search, None);
        assert_eq!(CustomerFilter::search("ALI"), CustomerFilter::search("ali"));
    }
}
