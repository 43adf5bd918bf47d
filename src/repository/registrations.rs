//! Registrations repository

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{find_one, not_found};
use crate::{
    error::{AppError, AppResult},
    models::registration::{Registration, RegistrationStatus},
    store::{from_record, to_record, Filter, Order, Record, RecordStore, Table},
};

#[derive(Clone)]
pub struct RegistrationsRepository {
    store: Arc<dyn RecordStore>,
}

impl RegistrationsRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// All registrations of an event, oldest first
    pub async fn list_for_event(&self, event_id: Uuid) -> AppResult<Vec<Registration>> {
        let filter = Filter::all().equals("event_id", event_id.to_string());
        let rows = self
            .store
            .select_many(Table::Registrations, &filter, Some(Order::asc("registered_at")))
            .await?;
        let registrations = rows
            .into_iter()
            .map(from_record::<Registration>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(registrations)
    }

    /// The confirmed or checked-in registration of a visitor for an event
    pub async fn find_active(&self, visitor_id: Uuid, event_id: Uuid) -> AppResult<Option<Registration>> {
        let filter = Filter::all()
            .equals("visitor_id", visitor_id.to_string())
            .equals("event_id", event_id.to_string());
        let rows = self.store.select_many(Table::Registrations, &filter, None).await?;
        for row in rows {
            let registration: Registration = from_record(row)?;
            if registration.status.is_active() {
                return Ok(Some(registration));
            }
        }
        Ok(None)
    }

    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<Registration>> {
        let filter = Filter::all().equals("confirmation_code", code);
        Ok(find_one(self.store.as_ref(), Table::Registrations, &filter).await?)
    }

    pub async fn get_by_code(&self, code: &str) -> AppResult<Registration> {
        self.find_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Registration {} not found", code)))
    }

    /// Number of active registrations referencing an event
    pub async fn count_active(&self, event_id: Uuid) -> AppResult<i32> {
        let registrations = self.list_for_event(event_id).await?;
        let count = registrations.iter().filter(|r| r.status.is_active()).count();
        i32::try_from(count).map_err(|_| AppError::Internal(format!("registration count overflow for event {}", event_id)))
    }

    /// Insert a registration. Duplicate codes or a second active
    /// registration for the same visitor and event surface as store conflicts.
    pub async fn create(&self, registration: &Registration) -> AppResult<Registration> {
        let record = self
            .store
            .insert(Table::Registrations, to_record(registration)?)
            .await?;
        Ok(from_record(record)?)
    }

    /// Move a registration from its current status to `next`.
    ///
    /// The write only happens if the stored status still equals
    /// `registration.status`; otherwise `StoreError::PreconditionFailed`.
    pub async fn transition(
        &self,
        registration: &Registration,
        next: RegistrationStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Registration> {
        let mut patch = Record::new();
        patch.insert("status".to_string(), next.as_str().into());
        let stamp_column = match next {
            RegistrationStatus::CheckedIn => Some("checked_in_at"),
            RegistrationStatus::Cancelled => Some("cancelled_at"),
            RegistrationStatus::Confirmed => None,
        };
        if let Some(column) = stamp_column {
            patch.insert(column.to_string(), serde_json::to_value(at).map_err(|e| AppError::Internal(e.to_string()))?);
        }
        let precondition = Filter::all().equals("status", registration.status.as_str());

        let record = self
            .store
            .update(Table::Registrations, registration.id, patch, Some(precondition))
            .await
            .map_err(|e| not_found(e, || format!("Registration {} not found", registration.confirmation_code)))?;
        Ok(from_record(record)?)
    }
}
