//! Google Calendar backend for agenda.
//!
//! Implements [`agenda_calendar::store::CalendarStore`] against the Calendar
//! v3 REST API. Tokens come from an [`auth::AccessTokenProvider`]; this crate
//! never refreshes them.

pub mod auth;
pub mod store;
mod wire;

pub use {
    auth::{AccessTokenProvider, StaticToken},
    store::{DEFAULT_BASE_URL, GoogleCalendarStore},
};
