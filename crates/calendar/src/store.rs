//! Calendar store abstraction consumed by the detector and resolver.

use std::sync::Arc;

use {async_trait::async_trait, tracing::warn};

use crate::{
    Result,
    patch::{EventPatch, WriteFlags},
    time::TimeWindow,
    types::{BusyCalendar, CalendarInfo, Event},
};

/// Zone used when a calendar's own zone cannot be determined.
pub const FALLBACK_TIMEZONE: &str = "UTC";

/// Remote calendar service.
///
/// Implementations must report missing events as [`crate::Error::NotFound`]
/// and throttling as [`crate::Error::RateLimited`] so callers can tell them
/// apart from other upstream failures.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>>;

    /// IANA zone configured on the calendar, if it has one.
    async fn calendar_timezone(&self, calendar_id: &str) -> Result<Option<String>>;

    /// Events (recurring series expanded into instances where the service
    /// supports it) intersecting `window`.
    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<Event>>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event>;

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &Event,
        flags: WriteFlags,
    ) -> Result<Event>;

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Event>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()>;

    async fn free_busy(
        &self,
        calendar_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<BusyCalendar>>;
}

pub type SharedCalendarStore = Arc<dyn CalendarStore>;

/// The calendar's zone, or [`FALLBACK_TIMEZONE`] when the lookup fails or the
/// calendar has none.
pub async fn resolve_timezone(store: &dyn CalendarStore, calendar_id: &str) -> String {
    resolve_timezone_or(store, calendar_id, FALLBACK_TIMEZONE).await
}

/// The calendar's zone, or `fallback` when the lookup fails or the calendar
/// has none.
pub async fn resolve_timezone_or(
    store: &dyn CalendarStore,
    calendar_id: &str,
    fallback: &str,
) -> String {
    match store.calendar_timezone(calendar_id).await {
        Ok(Some(tz)) => tz,
        Ok(None) => fallback.to_string(),
        Err(e) => {
            warn!(calendar_id, fallback, error = %e, "calendar timezone lookup failed");
            fallback.to_string()
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::store_memory::InMemoryStore};

    #[tokio::test]
    async fn resolve_timezone_uses_calendar_zone() {
        let store = InMemoryStore::new();
        store.add_calendar("work", Some("Europe/Paris"));
        assert_eq!(resolve_timezone(&store, "work").await, "Europe/Paris");
    }

    #[tokio::test]
    async fn resolve_timezone_falls_back_to_utc() {
        let store = InMemoryStore::new();
        store.add_calendar("zoneless", None);
        assert_eq!(resolve_timezone(&store, "zoneless").await, "UTC");
        assert_eq!(resolve_timezone(&store, "missing").await, "UTC");
    }

    #[tokio::test]
    async fn resolve_timezone_or_uses_given_fallback() {
        let store = InMemoryStore::new();
        store.add_calendar("zoneless", None);
        store.add_calendar("tokyo", Some("Asia/Tokyo"));
        assert_eq!(
            resolve_timezone_or(&store, "zoneless", "Europe/Rome").await,
            "Europe/Rome"
        );
        assert_eq!(
            resolve_timezone_or(&store, "tokyo", "Europe/Rome").await,
            "Asia/Tokyo"
        );
    }
}
