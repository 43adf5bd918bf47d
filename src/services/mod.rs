//! Business logic services

pub mod events;
pub mod registrations;
pub mod visitors;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub events: events::EventsService,
    pub registrations: registrations::RegistrationsService,
    pub visitors: visitors::VisitorsService,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let calendar = config.events.calendar();
        Self {
            events: events::EventsService::new(
                repository.clone(),
                calendar,
                config.registration.counter_retry_limit,
            ),
            registrations: registrations::RegistrationsService::new(
                repository.clone(),
                calendar,
                config.registration.clone(),
            ),
            visitors: visitors::VisitorsService::new(repository.clone()),
            repository,
        }
    }

    /// Whether the record store answers
    pub async fn ready(&self) -> AppResult<()> {
        self.repository.store.ping().await?;
        Ok(())
    }
}
