//! `PostgresStore`: the store-of-record traits over a primary and an optional
//! replica pool.

use async_trait::async_trait;
use crmgate_core::{Contact, Customer, NewContact, NewCustomer, PageWindow};
use crmgate_storage::{
    ContactStore, CustomerFilter, CustomerStore, StorageError, UserCredentials, UserStore,
};
use sqlx_postgres::PgPool;
use tracing::info;

use crate::config::PostgresConfig;
use crate::pool::create_pool;
use crate::queries;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    primary: PgPool,
    replica: Option<PgPool>,
}

impl PostgresStore {
    /// Connects the primary pool and, if configured, the replica pool.
    pub async fn new(config: &PostgresConfig) -> Result<Self, StorageError> {
        let primary = create_pool(config).await?;
        let replica = match config.replica() {
            Some(replica_config) => {
                let pool = create_pool(&replica_config).await?;
                info!("Read queries will use the replica pool");
                Some(pool)
            }
            None => None,
        };
        Ok(Self { primary, replica })
    }

    pub fn from_pools(primary: PgPool, replica: Option<PgPool>) -> Self {
        Self { primary, replica }
    }

    fn reader(&self) -> &PgPool {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Closes both pools, waiting for checked-out connections.
    pub async fn close(&self) {
        self.primary.close().await;
        if let Some(replica) = &self.replica {
            replica.close().await;
        }
    }
}

#[async_trait]
impl CustomerStore for PostgresStore {
    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer, StorageError> {
        queries::insert_customer(&self.primary, customer).await
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        window: PageWindow,
    ) -> Result<Vec<Customer>, StorageError> {
        queries::select_customers(self.reader(), filter, window).await
    }

    async fn count_customers(&self, filter: &CustomerFilter) -> Result<u64, StorageError> {
        queries::count_customers(self.reader(), filter).await
    }
}

#[async_trait]
impl ContactStore for PostgresStore {
    async fn create_contact(&self, contact: NewContact) -> Result<Contact, StorageError> {
        queries::insert_contact(&self.primary, contact).await
    }

    async fn list_contacts(
        &self,
        customer_id: i64,
        window: PageWindow,
    ) -> Result<Vec<Contact>, StorageError> {
        queries::select_contacts(self.reader(), customer_id, window).await
    }

    async fn count_contacts(&self, customer_id: i64) -> Result<u64, StorageError> {
        queries::count_contacts(self.reader(), customer_id).await
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StorageError> {
        queries::select_user_by_email(&self.primary, email).await
    }
}
