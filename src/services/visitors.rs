//! Visitor express lookup

use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::visitor::{normalize_phone, Visitor, VisitorShort},
    repository::Repository,
};

#[derive(Clone)]
pub struct VisitorsService {
    repository: Repository,
}

impl VisitorsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Find a returning visitor by phone number, in any formatting
    pub async fn lookup_by_phone(&self, phone: &str) -> AppResult<VisitorShort> {
        let normalized = normalize_phone(phone)
            .ok_or_else(|| AppError::Validation(format!("Invalid phone number {:?}", phone)))?;
        self.repository
            .visitors
            .find_by_phone(&normalized)
            .await?
            .map(VisitorShort::from)
            .ok_or_else(|| AppError::NotFound(format!("No visitor with phone {}", normalized)))
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Visitor> {
        self.repository.visitors.get_by_id(id).await
    }
}
