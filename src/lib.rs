//! Accueil: event registration and front-desk check-in
//!
//! Visitors register for concerts, exhibitions and workshops run by a
//! cultural center; staff check them in at the door with a confirmation
//! code. Event status (upcoming, active, completed) is derived from the
//! schedule at request time, and registration counters are reconciled
//! against the registrations actually stored.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Wire services over a record store
    pub fn new(config: AppConfig, store: Arc<dyn store::RecordStore>) -> Self {
        let repository = repository::Repository::new(store);
        let services = services::Services::new(repository, &config);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
