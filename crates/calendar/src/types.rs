//! Calendar data model, serialized with the remote service's field names.

use std::collections::BTreeMap;

use {
    chrono::{DateTime, NaiveDate, SecondsFormat, Utc},
    serde::{Deserialize, Serialize},
};

use crate::{
    Result,
    error::ValidationError,
    time::{self, TimeWindow},
};

/// Start or end of an event: a civil date for all-day events, or a
/// date-time (with optional IANA zone) for timed events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTime {
    Date {
        date: NaiveDate,
    },
    DateTime {
        #[serde(rename = "dateTime")]
        date_time: String,
        #[serde(
            rename = "timeZone",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        time_zone: Option<String>,
    },
}

impl EventTime {
    #[must_use]
    pub fn date(date: NaiveDate) -> Self {
        Self::Date { date }
    }

    /// Render `instant` as wall-clock time in `tz`, tagged with that zone.
    pub fn timed(instant: DateTime<Utc>, tz: &str) -> Result<Self> {
        let zone = time::parse_timezone(tz)?;
        Ok(Self::DateTime {
            date_time: instant
                .with_timezone(&zone)
                .to_rfc3339_opts(SecondsFormat::Secs, false),
            time_zone: Some(tz.to_string()),
        })
    }

    #[must_use]
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date { .. })
    }

    /// The zone this value carries, if any.
    #[must_use]
    pub fn time_zone(&self) -> Option<&str> {
        match self {
            Self::Date { .. } => None,
            Self::DateTime { time_zone, .. } => time_zone.as_deref(),
        }
    }

    /// Resolve to an absolute instant. Dates resolve to local midnight in
    /// `fallback_tz`; date-times without an offset use their own zone first.
    pub fn resolve(&self, fallback_tz: &str) -> Result<DateTime<Utc>> {
        match self {
            Self::Date { date } => {
                let zone = time::parse_timezone(fallback_tz)?;
                Ok(time::localize(&zone, time::start_of_day(*date)).with_timezone(&Utc))
            },
            Self::DateTime {
                date_time,
                time_zone,
            } => time::to_instant(date_time, time_zone.as_deref().unwrap_or(fallback_tz)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, alias = "display_name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional: Option<bool>,
    #[serde(
        default,
        alias = "response_status",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminders {
    #[serde(default, alias = "use_default")]
    pub use_default: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedProperties {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub private: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shared: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(alias = "file_url")]
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, alias = "mime_type", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, alias = "icon_link", skip_serializing_if = "Option::is_none")]
    pub icon_link: Option<String>,
    #[serde(default, alias = "file_id", skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Default,
    Public,
    Private,
    Confidential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    Cancelled,
}

/// A calendar event as stored by the remote calendar service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_start_time: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_properties: Option<ExtendedProperties>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparency: Option<Transparency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,

    // Server-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, rename = "iCalUID", skip_serializing_if = "Option::is_none")]
    pub i_cal_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hangout_link: Option<String>,
}

/// Whether an event stands alone or carries a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Single,
    Recurring,
}

impl EventKind {
    #[must_use]
    pub fn of(event: &Event) -> Self {
        if event.recurrence.is_empty() {
            Self::Single
        } else {
            Self::Recurring
        }
    }
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::of(self)
    }

    /// True when the event's start is a civil date.
    #[must_use]
    pub fn is_all_day(&self) -> bool {
        self.start.as_ref().is_some_and(EventTime::is_all_day)
    }

    #[must_use]
    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or_default()
    }

    /// Check the all-day/timed invariant without resolving instants.
    pub fn validate_times(&self) -> std::result::Result<(&EventTime, &EventTime), ValidationError> {
        let start = self
            .start
            .as_ref()
            .ok_or(ValidationError::MissingTime { field: "start" })?;
        let end = self
            .end
            .as_ref()
            .ok_or(ValidationError::MissingTime { field: "end" })?;
        if start.is_all_day() != end.is_all_day() {
            return Err(ValidationError::MixedEventTimes);
        }
        Ok((start, end))
    }

    /// Absolute interval covered by the event. All-day events span local
    /// midnight of the start date to local midnight of the (exclusive) end date.
    pub fn window(&self, fallback_tz: &str) -> Result<TimeWindow> {
        let (start, end) = self.validate_times()?;
        let window = TimeWindow::new(start.resolve(fallback_tz)?, end.resolve(fallback_tz)?);
        if window.end < window.start {
            return Err(ValidationError::EndBeforeStart {
                start: window.start.to_rfc3339(),
                end: window.end.to_rfc3339(),
            }
            .into());
        }
        Ok(window)
    }

    /// Copy of this event suitable for inserting as a brand-new event: content
    /// is kept, server identity is dropped.
    #[must_use]
    pub fn duplicate_for_new_series(&self) -> Self {
        Self {
            id: None,
            etag: None,
            i_cal_uid: None,
            created: None,
            updated: None,
            html_link: None,
            hangout_link: None,
            recurring_event_id: None,
            original_start_time: None,
            ..self.clone()
        }
    }
}

/// A calendar visible to the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInfo {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

/// Busy intervals reported for one calendar by a free-busy query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyCalendar {
    pub calendar_id: String,
    pub busy: Vec<TimeWindow>,
    /// Per-calendar failures (e.g. `notFound`) reported alongside results.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
