use thiserror::Error;

/// Request-level problems. Surfaced to the caller verbatim and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error(
        "modification scope '{scope}' only applies to recurring events; event {event_id} is not recurring"
    )]
    NonRecurringScope { event_id: String, scope: String },

    #[error("original_start_time is required when modification_scope is 'this_instance_only'")]
    MissingOriginalInstant,

    #[error("future_start_date is required when modification_scope is 'this_and_following'")]
    MissingFutureInstant,

    #[error("future_start_date must be in the future, got {instant}")]
    SplitInstantNotFuture { instant: String },

    #[error("invalid timestamp '{value}': expected RFC 3339, YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD")]
    InvalidTimestamp { value: String },

    #[error("unknown modification scope '{scope}'")]
    UnknownScope { scope: String },

    #[error("event start and end must both be all-day dates or both be timed")]
    MixedEventTimes,

    #[error("event end ({end}) is before its start ({start})")]
    EndBeforeStart { start: String, end: String },

    #[error("event is missing its {field} time")]
    MissingTime { field: &'static str },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("event not found: {event_id} (calendar {calendar_id})")]
    NotFound {
        calendar_id: String,
        event_id: String,
    },

    #[error("calendar not found: {calendar_id}")]
    CalendarNotFound { calendar_id: String },

    #[error("event {event_id} is not a recurring event")]
    NotRecurring { event_id: String },

    #[error("calendar service rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("permission denied by calendar service: {message}")]
    PermissionDenied { message: String },

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error(
        "series {master_id} was truncated with UNTIL={until} but the continuation series could not be created: {source}"
    )]
    SeriesSplitIncomplete {
        master_id: String,
        until: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(calendar_id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self::NotFound {
            calendar_id: calendar_id.into(),
            event_id: event_id.into(),
        }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }

    #[must_use]
    pub fn upstream(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether the error came from request validation rather than the store.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
