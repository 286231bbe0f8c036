//! # crmgate-core
//!
//! Record types shared by every crmgate crate:
//!
//! - [`model`] - customers and contacts as stored and as submitted
//! - [`validation`] - input rules applied before anything reaches the store
//! - [`pagination`] - page/pageSize normalization and the `Page<T>` envelope
//! - [`events`] - domain events emitted after a committed write

pub mod events;
pub mod model;
pub mod pagination;
pub mod validation;

pub use events::{DomainEvent, DomainEventType};
pub use model::{Contact, Customer, NewContact, NewCustomer};
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest, PageWindow};
pub use validation::ValidationError;
