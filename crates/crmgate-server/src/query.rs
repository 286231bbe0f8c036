//! Cache-aside reads.
//!
//! A read is identified by its fingerprint: operation name plus the normalized
//! filter and page window. A fresh cache entry answers the read without
//! touching the store of record. On a miss (or an entry that does not decode)
//! the page and the filter-wide total are read from the store, written back to
//! the cache, and returned.
//!
//! Writes never purge entries. A cached page may be stale by up to the TTL.
//! The cache is an optimization only: when it fails, reads go to the store.

use std::future::Future;
use std::time::Duration;

use crmgate_core::{Contact, Customer, Page, PageRequest, PageWindow};
use crmgate_storage::{ContactStore, CustomerFilter, CustomerStore, DynRecordStore, StorageError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::CacheBackend;
use crate::metrics;

/// Operation names used in fingerprints.
const LIST_CUSTOMERS: &str = "customers.list";
const LIST_CONTACTS: &str = "contacts.list";

pub struct QueryService {
    cache: CacheBackend,
    store: DynRecordStore,
    ttl: Duration,
    key_prefix: String,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    filter: &'a str,
    page: u32,
    page_size: u32,
}

impl QueryService {
    pub fn new(
        cache: CacheBackend,
        store: DynRecordStore,
        ttl: Duration,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            store,
            ttl,
            key_prefix: key_prefix.into(),
        }
    }

    /// Cache key for `operation` over `filter` and `window`.
    ///
    /// The filter text must already be normalized; two requests that mean the
    /// same thing must produce the same key.
    pub fn fingerprint(&self, operation: &str, filter: &str, window: PageWindow) -> String {
        let encoded = serde_json::to_string(&Fingerprint {
            filter,
            page: window.page,
            page_size: window.page_size,
        })
        .unwrap_or_else(|_| format!("{filter}|{}|{}", window.page, window.page_size));
        format!("{}{operation}:{encoded}", self.key_prefix)
    }

    /// Customers matching `search` (case-insensitive on name and email).
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Page<Customer>, StorageError> {
        let filter = search.map(CustomerFilter::search).unwrap_or_default();
        let window = page.normalize();
        let key = self.fingerprint(LIST_CUSTOMERS, filter.term(), window);

        let (store, filter) = (&self.store, &filter);
        self.cached(LIST_CUSTOMERS, key, move || async move {
            let (items, total) = tokio::try_join!(
                store.list_customers(filter, window),
                store.count_customers(filter),
            )?;
            Ok(Page::new(items, total, window))
        })
        .await
    }

    /// Contact notes of one customer.
    pub async fn list_contacts(
        &self,
        customer_id: i64,
        page: PageRequest,
    ) -> Result<Page<Contact>, StorageError> {
        let window = page.normalize();
        let key = self.fingerprint(LIST_CONTACTS, &customer_id.to_string(), window);

        let store = &self.store;
        self.cached(LIST_CONTACTS, key, move || async move {
            let (items, total) = tokio::try_join!(
                store.list_contacts(customer_id, window),
                store.count_contacts(customer_id),
            )?;
            Ok(Page::new(items, total, window))
        })
        .await
    }

    async fn cached<T, F, Fut>(
        &self,
        operation: &'static str,
        key: String,
        load: F,
    ) -> Result<Page<T>, StorageError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Page<T>, StorageError>>,
    {
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Page<T>>(&bytes) {
                Ok(page) => {
                    tracing::debug!(key = %key, "cache hit");
                    metrics::record_cache_hit(operation);
                    return Ok(page);
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "undecodable cache entry, reloading");
                    metrics::record_cache_miss(operation);
                }
            },
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                metrics::record_cache_miss(operation);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed, using store");
                metrics::record_cache_error("get");
            }
        }

        let page = load().await?;

        match serde_json::to_vec(&page) {
            Ok(bytes) => {
                if let Err(e) = self.cache.set(&key, bytes, self.ttl).await {
                    tracing::warn!(key = %key, error = %e, "cache write failed");
                    metrics::record_cache_error("set");
                }
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "failed to encode page for cache"),
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmgate_core::NewCustomer;
    use crmgate_storage::{CustomerStore, InMemoryStore};
    use std::sync::Arc;

    fn service(store: Arc<InMemoryStore>) -> QueryService {
        QueryService::new(
            CacheBackend::new_local(),
            store,
            Duration::from_secs(30),
            "test:",
        )
    }

    async fn seed(store: &InMemoryStore, n: usize) {
        for i in 0..n {
            store
                .create_customer(NewCustomer {
                    name: format!("Customer {i}"),
                    email: format!("c{i}@example.com"),
                    phone: "5551234567".into(),
                })
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_default_filled_and_explicit_requests_share_fingerprint() {
        let svc = service(Arc::new(InMemoryStore::new()));
        let implicit = PageRequest::new(None, None).normalize();
        let explicit = PageRequest::new(Some(1), Some(10)).normalize();
        assert_eq!(
            svc.fingerprint(LIST_CUSTOMERS, "", implicit),
            svc.fingerprint(LIST_CUSTOMERS, "", explicit)
        );
        assert_ne!(
            svc.fingerprint(LIST_CUSTOMERS, "", implicit),
            svc.fingerprint(LIST_CONTACTS, "", implicit)
        );
    }

    #[tokio::test]
    async fn test_search_case_does_not_change_fingerprint() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, 3).await;
        let svc = service(store.clone());

        svc.list_customers(Some("CUSTOMER"), PageRequest::default())
            .await
            .unwrap();
        let reads = store.read_count();
        svc.list_customers(Some("  customer "), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(store.read_count(), reads);
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_on_miss() {
        let store = Arc::new(InMemoryStore::new());
        store.set_available(false);
        let svc = service(store);

        let err = svc
            .list_customers(None, PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_reloaded() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, 1).await;
        let svc = service(store.clone());

        let key = svc.fingerprint(LIST_CUSTOMERS, "", PageRequest::default().normalize());
        svc.cache
            .set(&key, b"not json".to_vec(), Duration::from_secs(30))
            .await
            .unwrap();

        let page = svc.list_customers(None, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(store.read_count() > 0);
    }
}
