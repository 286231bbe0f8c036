//! In-memory store of record.
//!
//! Used when no database is configured and throughout the test suites. It
//! keeps the same ordering and uniqueness rules as the Postgres backend and
//! counts read calls so callers can observe when the store was consulted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use crmgate_core::{Contact, Customer, NewContact, NewCustomer, PageWindow};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::traits::{ContactStore, CustomerFilter, CustomerStore, UserCredentials, UserStore};

#[derive(Debug, Default)]
struct Tables {
    customers: BTreeMap<i64, Customer>,
    contacts: BTreeMap<i64, Contact>,
    users: Vec<UserCredentials>,
}

#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicI64,
    reads: AtomicU64,
    available: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            next_id: AtomicI64::new(1),
            reads: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Registers a login user. `password_hash` must be a PHC string.
    pub async fn insert_user(&self, email: impl Into<String>, password_hash: impl Into<String>) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tables.write().await.users.push(UserCredentials {
            id,
            email: email.into(),
            password_hash: password_hash.into(),
        });
        id
    }

    /// Number of list and count calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Makes every subsequent call fail with a connection error (or recover).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StorageError::connection("in-memory store marked unavailable"))
        }
    }

    fn record_read(&self) -> Result<(), StorageError> {
        self.check_available()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn matches(customer: &Customer, filter: &CustomerFilter) -> bool {
    match filter.search.as_deref() {
        None => true,
        Some(term) => {
            customer.name.to_lowercase().contains(term)
                || customer.email.to_lowercase().contains(term)
        }
    }
}

fn window_of<T: Clone>(rows: impl Iterator<Item = T>, window: PageWindow) -> Vec<T> {
    rows.skip(window.offset() as usize)
        .take(window.limit() as usize)
        .collect()
}

#[async_trait]
impl CustomerStore for InMemoryStore {
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StorageError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables
            .customers
            .values()
            .any(|c| c.email.eq_ignore_ascii_case(&customer.email))
        {
            return Err(StorageError::already_exists(
                "customer",
                format!("email {}", customer.email),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = customer.into_customer(id);
        tables.customers.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        window: PageWindow,
    ) -> Result<Vec<Customer>, StorageError> {
        self.record_read()?;
        let tables = self.tables.read().await;
        let rows = tables
            .customers
            .values()
            .rev()
            .filter(|c| matches(c, filter))
            .cloned();
        Ok(window_of(rows, window))
    }

    async fn count_customers(&self, filter: &CustomerFilter) -> Result<u64, StorageError> {
        self.record_read()?;
        let tables = self.tables.read().await;
        Ok(tables.customers.values().filter(|c| matches(c, filter)).count() as u64)
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StorageError> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if !tables.customers.contains_key(&contact.customer_id) {
            return Err(StorageError::not_found(
                "customer",
                contact.customer_id.to_string(),
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stored = contact.into_contact(id, OffsetDateTime::now_utc());
        tables.contacts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn list_contacts(
        &self,
        customer_id: i64,
        window: PageWindow,
    ) -> Result<Vec<Contact>, StorageError> {
        self.record_read()?;
        let tables = self.tables.read().await;
        let rows = tables
            .contacts
            .values()
            .rev()
            .filter(|c| c.customer_id == customer_id)
            .cloned();
        Ok(window_of(rows, window))
    }

    async fn count_contacts(&self, customer_id: i64) -> Result<u64, StorageError> {
        self.record_read()?;
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .values()
            .filter(|c| c.customer_id == customer_id)
            .count() as u64)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StorageError> {
        self.check_available()?;
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmgate_core::PageRequest;

    fn new_customer(name: &str, email: &str) -> NewCustomer {
        NewCustomer {
            name: name.into(),
            email: email.into(),
            phone: "5551234567".into(),
        }
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_windowed() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .create_customer(new_customer(&format!("Customer {i}"), &format!("c{i}@example.com")))
                .await
                .unwrap();
        }

        let window = PageRequest::new(Some(2), Some(2)).normalize();
        let page = store
            .list_customers(&CustomerFilter::default(), window)
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Customer 2", "Customer 1"]);

        let total = store
            .count_customers(&CustomerFilter::default())
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(store.read_count(), 2);
    }

    #[tokio::test]
    async fn test_search_matches_name_or_email() {
        let store = InMemoryStore::new();
        store
            .create_customer(new_customer("Ada Lovelace", "ada@example.com"))
            .await
            .unwrap();
        store
            .create_customer(new_customer("Alan Turing", "alan@bletchley.uk"))
            .await
            .unwrap();

        let filter = CustomerFilter::search("BLETCH");
        assert_eq!(store.count_customers(&filter).await.unwrap(), 1);
        let filter = CustomerFilter::search("a");
        assert_eq!(store.count_customers(&filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store
            .create_customer(new_customer("Ada", "ada@example.com"))
            .await
            .unwrap();
        let err = store
            .create_customer(new_customer("Ada Again", "ADA@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_contact_requires_existing_customer() {
        let store = InMemoryStore::new();
        let err = store
            .create_contact(NewContact {
                customer_id: 99,
                content: "hello".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let customer = store
            .create_customer(new_customer("Ada", "ada@example.com"))
            .await
            .unwrap();
        let contact = store
            .create_contact(NewContact {
                customer_id: customer.id,
                content: "hello".into(),
            })
            .await
            .unwrap();
        assert_eq!(contact.customer_id, customer.id);
        assert_eq!(store.count_contacts(customer.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_reads() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let err = store
            .count_customers(&CustomerFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Infrastructure);
        assert_eq!(store.read_count(), 0);
    }
}
