//! Repository layer: typed access to the record store

pub mod events;
pub mod registrations;
pub mod visitors;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    error::AppError,
    store::{from_record, Filter, RecordStore, StoreError, StoreResult, Table},
};

/// Main repository struct holding the record store
#[derive(Clone)]
pub struct Repository {
    pub store: Arc<dyn RecordStore>,
    pub events: events::EventsRepository,
    pub visitors: visitors::VisitorsRepository,
    pub registrations: registrations::RegistrationsRepository,
}

impl Repository {
    /// Create a new repository over the given store
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            events: events::EventsRepository::new(store.clone()),
            visitors: visitors::VisitorsRepository::new(store.clone()),
            registrations: registrations::RegistrationsRepository::new(store.clone()),
            store,
        }
    }
}

/// Turn a store miss into a descriptive `NotFound`
fn not_found(err: StoreError, what: impl FnOnce() -> String) -> AppError {
    match err {
        StoreError::NotFound(_) => AppError::NotFound(what()),
        other => AppError::Store(other),
    }
}

/// First row matching `filter`, or `None`
async fn find_one<T: DeserializeOwned>(
    store: &dyn RecordStore,
    table: Table,
    filter: &Filter,
) -> StoreResult<Option<T>> {
    match store.select_one(table, filter).await {
        Ok(record) => Ok(Some(from_record(record)?)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
