//! Calendar core for agenda.
//!
//! Event model, instant resolution, sparse patches, duplicate/conflict
//! detection for new events, and scope-aware updates of recurring series.
//! Remote calendars are reached through the [`store::CalendarStore`] trait.

pub mod detect;
pub mod error;
pub mod patch;
pub mod recurrence;
pub mod store;
pub mod store_memory;
pub mod time;
pub mod types;

pub use error::{Error, Result, ValidationError};
