//! Registration service: register, check in, cancel
//!
//! Each logical registration yields exactly one visitor row (when the
//! visitor is new), exactly one active registration row and exactly one net
//! change of the event counter, however many times it is retried and however
//! many identical calls race.
//!
//! The store does the heavy lifting: unique keys on visitor phone (email for
//! visitors without one), on confirmation code and on (visitor, event) among active registrations turn
//! a lost race into a conflict that is resolved here by returning the
//! winner's row. The counter is then written with a single conditional
//! update whose value is the number of active registrations, so a retry
//! after a partial failure converges instead of counting twice.

use std::future::Future;

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::RegistrationConfig,
    context::RequestContext,
    error::{AppError, AppResult},
    lifecycle::Calendar,
    models::{
        event::Event,
        registration::{Registration, RegistrationOutcome, RegistrationStatus},
        visitor::{non_blank, Visitor, VisitorInfo},
    },
    repository::Repository,
    store::{StoreError, VISITORS_EMAIL_KEY, VISITORS_PHONE_KEY},
};

/// Unambiguous characters only: no 0/O, 1/I
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Clone)]
pub struct RegistrationsService {
    repository: Repository,
    calendar: Calendar,
    config: RegistrationConfig,
}

impl RegistrationsService {
    pub fn new(repository: Repository, calendar: Calendar, config: RegistrationConfig) -> Self {
        Self { repository, calendar, config }
    }

    /// Register a visitor for an event.
    ///
    /// Returns the existing registration, without touching the counter
    /// again, when the visitor is already registered.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        event_id: Uuid,
        info: VisitorInfo,
    ) -> AppResult<RegistrationOutcome> {
        with_deadline(ctx, self.register_inner(ctx, event_id, info)).await
    }

    async fn register_inner(
        &self,
        ctx: &RequestContext,
        event_id: Uuid,
        info: VisitorInfo,
    ) -> AppResult<RegistrationOutcome> {
        let event = self.repository.events.get_by_id(event_id).await?;
        let status = self.calendar.status_at(&event.schedule()?, ctx.as_of);
        if !status.accepts_registrations() {
            return Err(AppError::EventNotAcceptingRegistrations { event_id, status });
        }

        info.validate()
            .map_err(|e| AppError::InvalidVisitorData(e.to_string()))?;
        let visitor = self.resolve_visitor(&info).await?;

        let (registration, created) =
            match self.repository.registrations.find_active(visitor.id, event_id).await? {
                Some(existing) => (existing, false),
                None => self.insert_registration(&visitor, &event).await?,
            };

        let event = sync_registration_count(&self.repository, event_id, self.config.counter_retry_limit).await?;

        if created {
            tracing::info!(
                caller = %ctx.caller,
                %event_id,
                visitor_id = %visitor.id,
                code = %registration.confirmation_code,
                count = event.registration_count,
                "Registration created"
            );
        } else {
            tracing::info!(
                caller = %ctx.caller,
                %event_id,
                visitor_id = %visitor.id,
                code = %registration.confirmation_code,
                "Visitor already registered, returning existing registration"
            );
        }

        Ok(RegistrationOutcome {
            registration,
            registration_count: event.registration_count,
            created,
            over_capacity: event.is_over_capacity(),
        })
    }

    /// Check a visitor in by confirmation code
    pub async fn check_in(&self, ctx: &RequestContext, code: &str) -> AppResult<Registration> {
        with_deadline(ctx, async {
            let code = normalize_code(code);
            let registration = self.repository.registrations.get_by_code(&code).await?;
            let updated = self.advance(&registration, RegistrationStatus::CheckedIn).await?;
            tracing::info!(caller = %ctx.caller, %code, event_id = %updated.event_id, "Visitor checked in");
            Ok(updated)
        })
        .await
    }

    /// Cancel a registration by confirmation code and release its place
    pub async fn cancel(&self, ctx: &RequestContext, code: &str) -> AppResult<RegistrationOutcome> {
        with_deadline(ctx, async {
            let code = normalize_code(code);
            let registration = self.repository.registrations.get_by_code(&code).await?;

            if registration.status == RegistrationStatus::Cancelled {
                // A previous attempt may have stopped before the counter write
                sync_registration_count(&self.repository, registration.event_id, self.config.counter_retry_limit)
                    .await?;
                return Err(AppError::AlreadyCancelled(code));
            }

            let updated = self.advance(&registration, RegistrationStatus::Cancelled).await?;
            let event = sync_registration_count(&self.repository, updated.event_id, self.config.counter_retry_limit)
                .await?;
            tracing::info!(
                caller = %ctx.caller,
                %code,
                event_id = %updated.event_id,
                count = event.registration_count,
                "Registration cancelled"
            );

            Ok(RegistrationOutcome {
                registration: updated,
                registration_count: event.registration_count,
                created: false,
                over_capacity: event.is_over_capacity(),
            })
        })
        .await
    }

    pub async fn get_by_code(&self, code: &str) -> AppResult<Registration> {
        self.repository.registrations.get_by_code(&normalize_code(code)).await
    }

    pub async fn list_for_event(&self, event_id: Uuid) -> AppResult<Vec<Registration>> {
        self.repository.events.get_by_id(event_id).await?;
        self.repository.registrations.list_for_event(event_id).await
    }

    /// Reuse the visitor owning the phone number (or, without a phone, the
    /// email), or create a new one
    async fn resolve_visitor(&self, info: &VisitorInfo) -> AppResult<Visitor> {
        let phone = info.normalized_phone();
        let email = info.normalized_email();
        if let Some(visitor) = self.find_visitor(phone.as_deref(), email.as_deref()).await? {
            return Ok(visitor);
        }

        let name = non_blank(info.name.as_deref())
            .ok_or_else(|| AppError::InvalidVisitorData("name is required for new visitors".to_string()))?;
        let email = email
            .ok_or_else(|| AppError::InvalidVisitorData("email is required for new visitors".to_string()))?;

        let visitor = Visitor {
            id: Uuid::new_v4(),
            name,
            surname: non_blank(info.surname.as_deref()),
            email: Some(email.clone()),
            phone: phone.clone(),
            registered_at: Utc::now(),
        };

        match self.repository.visitors.create(&visitor).await {
            Ok(created) => {
                tracing::debug!(visitor_id = %created.id, "Visitor created");
                Ok(created)
            }
            // Lost a race with a concurrent registration for the same visitor
            Err(AppError::Store(e))
                if e.is_conflict_on(VISITORS_PHONE_KEY) || e.is_conflict_on(VISITORS_EMAIL_KEY) =>
            {
                self.find_visitor(phone.as_deref(), Some(&email))
                    .await?
                    .ok_or_else(|| AppError::Internal(format!("visitor vanished after {}", e)))
            }
            Err(e) => Err(e),
        }
    }

    async fn find_visitor(&self, phone: Option<&str>, email: Option<&str>) -> AppResult<Option<Visitor>> {
        match (phone, email) {
            (Some(phone), _) => self.repository.visitors.find_by_phone(phone).await,
            (None, Some(email)) => self.repository.visitors.find_phoneless_by_email(email).await,
            (None, None) => Ok(None),
        }
    }

    /// Insert a confirmed registration with a fresh confirmation code.
    ///
    /// Returns `(registration, created)`; `created` is false when a
    /// concurrent call registered the same visitor first.
    async fn insert_registration(&self, visitor: &Visitor, event: &Event) -> AppResult<(Registration, bool)> {
        let attempts = self.config.max_code_attempts.max(1);
        for _ in 0..attempts {
            let code = generate_confirmation_code(self.config.code_length);
            if self.repository.registrations.find_by_code(&code).await?.is_some() {
                tracing::debug!("Confirmation code collision, regenerating");
                continue;
            }

            let registration = Registration {
                id: Uuid::new_v4(),
                visitor_id: visitor.id,
                event_id: event.id,
                confirmation_code: code,
                status: RegistrationStatus::Confirmed,
                registered_at: Utc::now(),
                checked_in_at: None,
                cancelled_at: None,
            };

            match self.repository.registrations.create(&registration).await {
                Ok(created) => return Ok((created, true)),
                Err(AppError::Store(StoreError::Conflict { constraint, .. })) => {
                    if let Some(existing) =
                        self.repository.registrations.find_active(visitor.id, event.id).await?
                    {
                        return Ok((existing, false));
                    }
                    tracing::debug!(%constraint, "Registration insert conflict, regenerating code");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Internal(format!(
            "no unique confirmation code after {} attempts",
            attempts
        )))
    }

    /// Conditionally move a registration forward, reporting terminal states
    async fn advance(&self, registration: &Registration, next: RegistrationStatus) -> AppResult<Registration> {
        if !registration.status.can_transition_to(next) {
            return Err(terminal_state_error(registration));
        }
        match self
            .repository
            .registrations
            .transition(registration, next, Utc::now())
            .await
        {
            Err(AppError::Store(StoreError::PreconditionFailed { .. })) => {
                // Someone else moved it first; report what they did
                let current = self
                    .repository
                    .registrations
                    .get_by_code(&registration.confirmation_code)
                    .await?;
                Err(terminal_state_error(&current))
            }
            other => other,
        }
    }
}

/// Bring an event's counter in line with its active registrations.
///
/// The write is a compare-and-swap on the counter and its version; a
/// concurrent writer makes it re-read and retry, up to `retry_limit` times.
pub(crate) async fn sync_registration_count(
    repository: &Repository,
    event_id: Uuid,
    retry_limit: u32,
) -> AppResult<Event> {
    let mut retries = 0;
    loop {
        let event = repository.events.get_by_id(event_id).await?;
        let actual = repository.registrations.count_active(event_id).await?;
        if event.registration_count == actual {
            return Ok(event);
        }

        match repository.events.swap_registration_count(&event, actual).await {
            Ok(updated) => {
                let stored = event.registration_count;
                if (actual - stored).abs() > 1 {
                    tracing::warn!(%event_id, stored, actual, "Registration counter drift repaired");
                } else {
                    tracing::debug!(%event_id, stored, actual, "Registration counter updated");
                }
                if updated.is_over_capacity() {
                    tracing::warn!(
                        %event_id,
                        count = updated.registration_count,
                        capacity = updated.capacity,
                        "Event is over capacity"
                    );
                }
                return Ok(updated);
            }
            Err(AppError::Store(StoreError::PreconditionFailed { .. })) if retries < retry_limit => {
                retries += 1;
                tracing::debug!(%event_id, retries, "Registration counter moved concurrently, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run an operation under the caller's deadline
async fn with_deadline<T>(
    ctx: &RequestContext,
    operation: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    match tokio::time::timeout(ctx.timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(caller = %ctx.caller, timeout = ?ctx.timeout, "Operation timed out");
            Err(AppError::Store(StoreError::Timeout))
        }
    }
}

fn terminal_state_error(registration: &Registration) -> AppError {
    let code = registration.confirmation_code.clone();
    match registration.status {
        RegistrationStatus::CheckedIn => AppError::AlreadyCheckedIn(code),
        RegistrationStatus::Cancelled => AppError::AlreadyCancelled(code),
        RegistrationStatus::Confirmed => {
            AppError::Conflict(format!("Registration {} changed concurrently", code))
        }
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Random confirmation code over [`CODE_ALPHABET`]
pub fn generate_confirmation_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
