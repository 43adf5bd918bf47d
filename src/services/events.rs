//! Events service: administration, public listing and counter diagnostics

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::registrations::sync_registration_count;
use crate::{
    context::RequestContext,
    error::{AppError, AppResult},
    lifecycle::{is_publicly_listed, parse_date, parse_time, Calendar, Schedule},
    models::event::{CounterAudit, CreateEvent, Event, EventQuery, EventView, UpdateEvent},
    repository::Repository,
    store::{to_record, Record},
};

/// Columns never written through an event update
const PROTECTED_COLUMNS: &[&str] = &["id", "created_at", "registration_count", "counter_version"];

#[derive(Clone)]
pub struct EventsService {
    repository: Repository,
    calendar: Calendar,
    counter_retry_limit: u32,
}

impl EventsService {
    pub fn new(repository: Repository, calendar: Calendar, counter_retry_limit: u32) -> Self {
        Self { repository, calendar, counter_retry_limit }
    }

    /// Derive the lifecycle status of an event at the context instant
    pub fn view(&self, ctx: &RequestContext, event: Event) -> AppResult<EventView> {
        let status = self.calendar.status_at(&event.schedule()?, ctx.as_of);
        Ok(EventView {
            status,
            publicly_listed: is_publicly_listed(status),
            over_capacity: event.is_over_capacity(),
            event,
        })
    }

    /// List events by start instant. Completed events are left out unless
    /// `include_completed` is set.
    pub async fn list(&self, ctx: &RequestContext, query: &EventQuery) -> AppResult<Vec<EventView>> {
        let mut events = self.repository.events.list(query.category.as_deref()).await?;
        events.sort_by_key(|e| (e.event_date, e.start_time));

        let include_completed = query.include_completed.unwrap_or(false);
        let mut views = Vec::with_capacity(events.len());
        for event in events {
            let event_id = event.id;
            match self.view(ctx, event) {
                Ok(view) if include_completed || view.publicly_listed => views.push(view),
                Ok(_) => {}
                Err(e) => tracing::warn!(%event_id, "Skipping event with invalid schedule: {}", e),
            }
        }
        Ok(views)
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> AppResult<EventView> {
        let event = self.repository.events.get_by_id(id).await?;
        self.view(ctx, event)
    }

    pub async fn create(&self, ctx: &RequestContext, data: CreateEvent) -> AppResult<EventView> {
        data.validate()?;
        let schedule = Schedule::parse(&data.event_date, &data.start_time, data.duration_hours)?;

        let event = Event {
            id: Uuid::new_v4(),
            title: data.title.trim().to_string(),
            category: data.category.trim().to_string(),
            event_date: schedule.start().date(),
            start_time: schedule.start().time(),
            duration_hours: data.duration_hours,
            venue: data.venue.trim().to_string(),
            capacity: data.capacity,
            registration_count: 0,
            price_cents: data.price_cents.unwrap_or(0),
            description: data.description,
            counter_version: 0,
            created_at: Utc::now(),
            updated_at: None,
        };
        require_text("title", &event.title)?;
        require_text("category", &event.category)?;
        require_text("venue", &event.venue)?;

        let created = self.repository.events.create(&event).await?;
        tracing::info!(caller = %ctx.caller, event_id = %created.id, title = %created.title, "Event created");
        self.view(ctx, created)
    }

    /// Apply a partial update; the schedule is re-validated on merged values
    pub async fn update(&self, ctx: &RequestContext, id: Uuid, data: UpdateEvent) -> AppResult<EventView> {
        data.validate()?;
        if data.is_empty() {
            return Err(AppError::Validation("No fields to update".to_string()));
        }

        let mut event = self.repository.events.get_by_id(id).await?;
        if data.touches_schedule() {
            if let Some(ref date) = data.event_date {
                event.event_date = parse_date(date)?;
            }
            if let Some(ref time) = data.start_time {
                event.start_time = parse_time(time)?;
            }
            if let Some(hours) = data.duration_hours {
                event.duration_hours = hours;
            }
            event.schedule()?;
        }
        if let Some(title) = data.title {
            event.title = title.trim().to_string();
        }
        if let Some(category) = data.category {
            event.category = category.trim().to_string();
        }
        if let Some(venue) = data.venue {
            event.venue = venue.trim().to_string();
        }
        if let Some(capacity) = data.capacity {
            event.capacity = capacity;
        }
        if let Some(price) = data.price_cents {
            event.price_cents = price;
        }
        if let Some(description) = data.description {
            event.description = Some(description);
        }
        require_text("title", &event.title)?;
        require_text("category", &event.category)?;
        require_text("venue", &event.venue)?;
        event.updated_at = Some(Utc::now());

        let mut patch: Record = to_record(&event)?;
        patch.retain(|column, _| !PROTECTED_COLUMNS.contains(&column.as_str()));

        let updated = self.repository.events.update(id, patch).await?;
        tracing::info!(caller = %ctx.caller, event_id = %id, "Event updated");
        self.view(ctx, updated)
    }

    /// Delete an event that never received a registration
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> AppResult<()> {
        self.repository.events.get_by_id(id).await?;
        let registrations = self.repository.registrations.list_for_event(id).await?;
        if !registrations.is_empty() {
            return Err(AppError::Conflict(format!(
                "Event {} has {} registration(s) and cannot be deleted",
                id,
                registrations.len()
            )));
        }
        self.repository.events.delete(id).await?;
        tracing::info!(caller = %ctx.caller, event_id = %id, "Event deleted");
        Ok(())
    }

    /// Compare the stored counter with the number of active registrations
    pub async fn audit_counter(&self, id: Uuid) -> AppResult<CounterAudit> {
        let event = self.repository.events.get_by_id(id).await?;
        let actual = self.repository.registrations.count_active(id).await?;
        let audit = CounterAudit {
            event_id: id,
            stored: event.registration_count,
            actual,
            drift: event.registration_count - actual,
        };
        if audit.drift != 0 {
            tracing::warn!(event_id = %id, stored = audit.stored, actual, "Registration counter drift detected");
        }
        Ok(audit)
    }

    /// Reset the stored counter to the number of active registrations
    pub async fn repair_counter(&self, ctx: &RequestContext, id: Uuid) -> AppResult<CounterAudit> {
        let before = self.audit_counter(id).await?;
        let event = sync_registration_count(&self.repository, id, self.counter_retry_limit).await?;
        tracing::info!(
            caller = %ctx.caller,
            event_id = %id,
            from = before.stored,
            to = event.registration_count,
            "Registration counter repaired"
        );
        Ok(CounterAudit {
            event_id: id,
            stored: event.registration_count,
            actual: before.actual,
            drift: event.registration_count - before.actual,
        })
    }
}

fn require_text(field: &str, value: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{} must not be blank", field)));
    }
    Ok(())
}
