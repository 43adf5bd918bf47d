//! Visitor model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Visitor record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Visitor {
    pub id: Uuid,
    pub name: String,
    pub surname: Option<String>,
    pub email: Option<String>,
    /// Normalized phone number, natural key for returning visitors
    pub phone: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Short visitor representation returned by express lookup
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisitorShort {
    pub id: Uuid,
    pub name: String,
    pub surname: Option<String>,
}

impl From<Visitor> for VisitorShort {
    fn from(visitor: Visitor) -> Self {
        Self {
            id: visitor.id,
            name: visitor.name,
            surname: visitor.surname,
        }
    }
}

/// Identifying information supplied with a registration.
///
/// Returning visitors may send only their phone number; name and email are
/// required when no visitor matches the phone. Visitors without a phone are
/// matched on their normalized email.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct VisitorInfo {
    #[validate(length(max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 100))]
    pub surname: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 30))]
    pub phone: Option<String>,
}

impl VisitorInfo {
    pub fn normalized_phone(&self) -> Option<String> {
        self.phone.as_deref().and_then(normalize_phone)
    }

    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().and_then(normalize_email)
    }
}

/// Query parameters for express lookup
#[derive(Debug, Deserialize, IntoParams)]
pub struct VisitorLookupQuery {
    pub phone: String,
}

/// Strip formatting from a phone number, keeping a leading `+`.
///
/// Returns `None` when nothing dialable remains.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut normalized = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        normalized.push('+');
    }
    normalized.extend(trimmed.chars().filter(char::is_ascii_digit));
    if normalized.trim_start_matches('+').is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Trimmed, non-empty text
/// Trim and lowercase an email address; `None` when blank
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
