//! # crmgate-storage
//!
//! Store-of-record abstraction for crmgate.
//!
//! The request pipeline never talks to a database directly. It goes through
//! the traits in this crate, which the Postgres backend (`crmgate-db-postgres`)
//! and the in-memory backend in [`memory`] both implement.
//!
//! ## Example
//!
//! ```ignore
//! use crmgate_core::PageRequest;
//! use crmgate_storage::{CustomerFilter, CustomerStore, StorageError};
//!
//! async fn first_page(store: &dyn CustomerStore) -> Result<u64, StorageError> {
//!     let filter = CustomerFilter::search("ali");
//!     store.count_customers(&filter).await
//! }
//! ```

mod error;
pub mod memory;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use memory::InMemoryStore;
pub use traits::{
    ContactStore, CustomerFilter, CustomerStore, DynRecordStore, RecordStore, UserCredentials,
    UserStore,
};
