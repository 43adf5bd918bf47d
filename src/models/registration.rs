//! Registration (confirmation record) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Registration status.
///
/// `Confirmed` is initial; `CheckedIn` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Confirmed,
    CheckedIn,
    Cancelled,
}

impl RegistrationStatus {
    /// Stored column value
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Confirmed => "confirmed",
            RegistrationStatus::CheckedIn => "checked_in",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    /// Active registrations count towards the event counter
    pub fn is_active(&self) -> bool {
        !matches!(self, RegistrationStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: RegistrationStatus) -> bool {
        matches!(
            (self, next),
            (RegistrationStatus::Confirmed, RegistrationStatus::CheckedIn)
                | (RegistrationStatus::Confirmed, RegistrationStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Registration {
    pub id: Uuid,
    pub visitor_id: Uuid,
    pub event_id: Uuid,
    /// Short code presented at check-in
    pub confirmation_code: String,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// Result of register / cancel
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    /// Event counter after the operation
    pub registration_count: i32,
    /// False when an existing registration was returned
    pub created: bool,
    pub over_capacity: bool,
}
