//! Config schema. Every section is `#[serde(default)]`, so an empty file is
//! a valid configuration.

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_CALENDAR: &str = "primary";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaConfig {
    pub calendar: CalendarConfig,
    pub conflicts: ConflictsConfig,
}

/// Remote calendar access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Calendar used when a request names none.
    pub default_calendar: String,
    /// IANA zone for times without an offset when the calendar reports none.
    pub default_timezone: Option<String>,
    pub api_base_url: String,
    /// OAuth access token. Usually `${AGENDA_ACCESS_TOKEN}`.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<Secret<String>>,
    pub timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_calendar: DEFAULT_CALENDAR.into(),
            default_timezone: None,
            api_base_url: DEFAULT_API_BASE_URL.into(),
            access_token: None,
            timeout_secs: 30,
        }
    }
}

/// Duplicate and conflict checks run before events are created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictsConfig {
    pub check_duplicates: bool,
    pub check_conflicts: bool,
    /// Similarity in `[0, 1]` at which a duplicate warning is raised.
    pub duplicate_threshold: f64,
    /// Calendars scanned for matches; empty means the target calendar only.
    pub calendars_to_check: Vec<String>,
}

impl Default for ConflictsConfig {
    fn default() -> Self {
        Self {
            check_duplicates: true,
            check_conflicts: true,
            duplicate_threshold: 0.7,
            calendars_to_check: Vec::new(),
        }
    }
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
