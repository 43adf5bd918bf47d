//! Request-scoped context passed into every service operation

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Who is calling. Used for logging only; this is not authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Anonymous visitor using the public pages
    Visitor,
    /// Front-desk or administrative staff member
    Staff(String),
    /// Internal jobs and tests
    System,
}

impl std::fmt::Display for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caller::Visitor => f.write_str("visitor"),
            Caller::Staff(name) => write!(f, "staff:{}", name),
            Caller::System => f.write_str("system"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: Caller,
    /// Instant at which event status is evaluated
    pub as_of: DateTime<Utc>,
    /// Bound on the whole operation, store calls included
    pub timeout: Duration,
}

impl RequestContext {
    pub fn new(caller: Caller, as_of: DateTime<Utc>, timeout: Duration) -> Self {
        Self { caller, as_of, timeout }
    }

    /// Context evaluated at the current system time
    pub fn now(caller: Caller, timeout: Duration) -> Self {
        Self::new(caller, Utc::now(), timeout)
    }
}
