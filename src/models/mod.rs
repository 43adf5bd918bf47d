//! Data models for Accueil

pub mod event;
pub mod registration;
pub mod visitor;

// Re-export commonly used types
pub use event::{Event, EventView};
pub use registration::{Registration, RegistrationOutcome, RegistrationStatus};
pub use visitor::{Visitor, VisitorInfo, VisitorShort};
