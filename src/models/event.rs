//! Event model (concerts, exhibitions, workshops, guided tours)

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::lifecycle::{EventStatus, InvalidSchedule, Schedule};

/// Event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    /// Free-form category (concert, exhibition, workshop, ...)
    pub category: String,
    /// Scheduled date, center local time
    pub event_date: NaiveDate,
    /// Scheduled start time, center local time
    pub start_time: NaiveTime,
    /// Duration in hours, may be fractional
    pub duration_hours: f64,
    pub venue: String,
    pub capacity: i32,
    /// Number of active registrations
    pub registration_count: i32,
    /// Price in cents, 0 for free events
    pub price_cents: i64,
    pub description: Option<String>,
    /// Bumped on every counter write, guards compare-and-swap updates
    #[serde(default)]
    pub counter_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn schedule(&self) -> Result<Schedule, InvalidSchedule> {
        Schedule::new(self.event_date, self.start_time, self.duration_hours)
    }

    /// Overbooking is allowed but reported
    pub fn is_over_capacity(&self) -> bool {
        self.registration_count > self.capacity
    }
}

/// Event with its derived lifecycle status
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventView {
    pub event: Event,
    pub status: EventStatus,
    pub publicly_listed: bool,
    pub over_capacity: bool,
}

/// Create event request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateEvent {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    /// Event date (YYYY-MM-DD)
    pub event_date: String,
    /// Start time (HH:MM)
    pub start_time: String,
    pub duration_hours: f64,
    #[validate(length(min = 1, max = 200))]
    pub venue: String,
    #[validate(range(min = 1))]
    pub capacity: i32,
    #[validate(range(min = 0))]
    pub price_cents: Option<i64>,
    pub description: Option<String>,
}

/// Update event request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateEvent {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub event_date: Option<String>,
    pub start_time: Option<String>,
    pub duration_hours: Option<f64>,
    #[validate(length(min = 1, max = 200))]
    pub venue: Option<String>,
    #[validate(range(min = 1))]
    pub capacity: Option<i32>,
    #[validate(range(min = 0))]
    pub price_cents: Option<i64>,
    pub description: Option<String>,
}

impl UpdateEvent {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.category.is_none()
            && self.event_date.is_none()
            && self.start_time.is_none()
            && self.duration_hours.is_none()
            && self.venue.is_none()
            && self.capacity.is_none()
            && self.price_cents.is_none()
            && self.description.is_none()
    }

    pub fn touches_schedule(&self) -> bool {
        self.event_date.is_some() || self.start_time.is_some() || self.duration_hours.is_some()
    }
}

/// Query parameters for events
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct EventQuery {
    /// Filter by category
    pub category: Option<String>,
    /// Include completed events (administrative view)
    pub include_completed: Option<bool>,
}

/// Stored counter compared with the actual number of active registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CounterAudit {
    pub event_id: Uuid,
    pub stored: i32,
    pub actual: i32,
    /// `stored - actual`; positive means double counting
    pub drift: i32,
}
