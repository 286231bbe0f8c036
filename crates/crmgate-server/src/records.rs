//! Write path: validate, commit, then emit.

use std::sync::Arc;

use crmgate_core::{Contact, Customer, DomainEvent, NewContact, NewCustomer, ValidationError};
use crmgate_storage::{ContactStore, CustomerStore, DynRecordStore, StorageError};

use crate::events::EventEmitter;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Creates records in the store of record and announces them.
///
/// The commit alone decides success. The domain event is scheduled after the
/// commit and its fate is never reported to the caller.
pub struct RecordService {
    store: DynRecordStore,
    emitter: Arc<EventEmitter>,
}

impl RecordService {
    pub fn new(store: DynRecordStore, emitter: Arc<EventEmitter>) -> Self {
        Self { store, emitter }
    }

    pub async fn create_customer(&self, input: NewCustomer) -> Result<Customer, RecordError> {
        let customer = self.store.create_customer(input.validated()?).await?;
        tracing::info!(customer.id = customer.id, "customer created");
        self.emit(DomainEvent::customer_created(&customer));
        Ok(customer)
    }

    pub async fn create_contact(&self, input: NewContact) -> Result<Contact, RecordError> {
        let contact = self.store.create_contact(input.validated()?).await?;
        tracing::info!(
            contact.id = contact.id,
            customer.id = contact.customer_id,
            "contact created"
        );
        self.emit(DomainEvent::contact_created(&contact));
        Ok(contact)
    }

    fn emit(&self, event: Result<DomainEvent, serde_json::Error>) {
        match event {
            Ok(event) => {
                self.emitter.emit(event);
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode domain event, skipping"),
        }
    }
}
