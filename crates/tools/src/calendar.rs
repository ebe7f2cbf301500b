//! AgentTool implementation for calendar operations.

use {
    anyhow::{Result, anyhow, bail},
    async_trait::async_trait,
    chrono::{DateTime, Duration, Utc},
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use {
    agenda_calendar::{
        detect::{
            ConflictDetector, CreationDecision, DetectorConfig, decide, describe_blocked,
            format_warnings,
        },
        patch::{EventChanges, WriteFlags, build_patch},
        recurrence::{
            ModificationRequest, ModificationScope, RecurrenceResolver, ScopeKind, instance_id,
        },
        store::{FALLBACK_TIMEZONE, SharedCalendarStore, resolve_timezone_or},
        time::{self, TimeWindow},
        types::{Event, EventTime},
    },
    agenda_config::{AgendaConfig, ConflictsConfig},
};

use crate::registry::AgentTool;

/// Window listed when `list_events` is called without `time_max`.
const DEFAULT_LIST_DAYS: i64 = 7;

/// Duration of a timed event created without an `end`.
const DEFAULT_EVENT_MINUTES: i64 = 60;

#[derive(Debug, Clone)]
pub struct CalendarToolSettings {
    pub default_calendar: String,
    /// Zone for offset-less times when the calendar reports none.
    pub default_timezone: Option<String>,
    pub detector: DetectorConfig,
}

impl Default for CalendarToolSettings {
    fn default() -> Self {
        Self {
            default_calendar: "primary".into(),
            default_timezone: None,
            detector: DetectorConfig::default(),
        }
    }
}

impl CalendarToolSettings {
    #[must_use]
    pub fn from_config(config: &AgendaConfig) -> Self {
        Self {
            default_calendar: config.calendar.default_calendar.clone(),
            default_timezone: config.calendar.default_timezone.clone(),
            detector: detector_config(&config.conflicts),
        }
    }
}

#[must_use]
pub fn detector_config(conflicts: &ConflictsConfig) -> DetectorConfig {
    DetectorConfig {
        check_duplicates: conflicts.check_duplicates,
        check_conflicts: conflicts.check_conflicts,
        duplicate_threshold: conflicts.duplicate_threshold,
        calendars_to_check: conflicts.calendars_to_check.clone(),
    }
}

/// Calendar agent tool: listing, CRUD with duplicate/conflict screening, and
/// scope-aware updates of recurring events.
pub struct CalendarTool {
    store: SharedCalendarStore,
    settings: CalendarToolSettings,
    detector: ConflictDetector,
    resolver: RecurrenceResolver,
}

impl CalendarTool {
    pub fn new(store: SharedCalendarStore, settings: CalendarToolSettings) -> Self {
        Self {
            detector: ConflictDetector::new(store.clone()),
            resolver: RecurrenceResolver::new(store.clone()),
            store,
            settings,
        }
    }

    fn calendar_id<'a>(&'a self, params: &'a Value) -> &'a str {
        str_param(params, "calendar_id").unwrap_or(&self.settings.default_calendar)
    }

    async fn timezone(&self, calendar_id: &str) -> String {
        let fallback = self
            .settings
            .default_timezone
            .as_deref()
            .unwrap_or(FALLBACK_TIMEZONE);
        resolve_timezone_or(self.store.as_ref(), calendar_id, fallback).await
    }

    async fn list_calendars(&self) -> Result<Value> {
        let calendars = self.store.list_calendars().await?;
        Ok(json!({ "calendars": calendars }))
    }

    async fn list_events(&self, params: &Value) -> Result<Value> {
        let calendar_id = self.calendar_id(params);
        let tz = self.timezone(calendar_id).await;

        let start = match str_param(params, "time_min") {
            Some(raw) => time::to_instant(raw, &tz)?,
            None => Utc::now(),
        };
        let end = match str_param(params, "time_max") {
            Some(raw) => time::to_instant(raw, &tz)?,
            None => start + Duration::days(DEFAULT_LIST_DAYS),
        };
        let window = checked_window(start, end)?;

        let mut events = self.store.list_events(calendar_id, &window).await?;
        if let Some(query) = str_param(params, "query") {
            let query = query.to_lowercase();
            events.retain(|e| {
                e.title().to_lowercase().contains(&query)
                    || e
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&query))
            });
        }
        if let Some(max) = params.get("max_results").and_then(Value::as_u64) {
            events.truncate(usize::try_from(max).unwrap_or(usize::MAX));
        }

        Ok(json!({
            "calendar_id": calendar_id,
            "time_zone": tz,
            "time_min": window.start,
            "time_max": window.end,
            "events": events,
        }))
    }

    async fn get_event(&self, params: &Value) -> Result<Value> {
        let calendar_id = self.calendar_id(params);
        let event_id = require(params, "event_id", "get_event")?;
        let event = self.store.get_event(calendar_id, event_id).await?;
        Ok(json!({ "event": event }))
    }

    async fn create_event(&self, params: &Value) -> Result<Value> {
        let calendar_id = self.calendar_id(params);
        require(params, "summary", "create_event")?;
        require(params, "start", "create_event")?;
        let allow_duplicates = params
            .get("allow_duplicates")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let tz = self.timezone(calendar_id).await;
        let changes = parse_changes(params)?;
        let patch = build_patch(&changes, &tz)?;
        let mut candidate = Event::default();
        patch.apply_to(&mut candidate)?;
        if candidate.end.is_none() {
            candidate.end = Some(default_end(&candidate, &tz)?);
        }
        candidate.window(&tz)?;

        let config = &self.settings.detector;
        let warnings = if config.check_duplicates || config.check_conflicts {
            let result = self.detector.check(&candidate, calendar_id, config).await?;
            match decide(&result, config, allow_duplicates) {
                CreationDecision::Blocked { duplicate } => {
                    info!(
                        calendar_id,
                        duplicate_id = ?duplicate.event.id,
                        similarity = duplicate.similarity,
                        "refused to create duplicate event"
                    );
                    return Ok(json!({
                        "created": false,
                        "blocked": true,
                        "message": describe_blocked(&duplicate),
                        "duplicate": duplicate,
                    }));
                },
                CreationDecision::Proceed { warnings } => warnings,
            }
        } else {
            Vec::new()
        };

        let flags = patch.flags.union(WriteFlags::for_event(&candidate));
        let created = self.store.insert_event(calendar_id, &candidate, flags).await?;
        info!(
            calendar_id,
            event_id = ?created.id,
            warnings = warnings.len(),
            "created event"
        );
        Ok(json!({
            "created": true,
            "event": created,
            "warnings": warnings,
        }))
    }

    async fn update_event(&self, params: &Value) -> Result<Value> {
        let calendar_id = self.calendar_id(params);
        let event_id = require(params, "event_id", "update_event")?;
        let tz = self.timezone(calendar_id).await;

        let kind: Option<ScopeKind> = str_param(params, "modification_scope")
            .map(str::parse)
            .transpose()?;
        let scope = ModificationScope::parse(
            kind,
            str_param(params, "original_start_time"),
            str_param(params, "future_start_date"),
            &tz,
            Utc::now(),
        )?;

        let changes = parse_changes(params)?;
        if changes.is_empty() {
            bail!("'update_event' requires at least one field to change");
        }

        let warnings = if changes.touches_time() && self.settings.detector.check_conflicts {
            self.conflicts_after_update(calendar_id, event_id, &scope, &changes, &tz)
                .await
        } else {
            Vec::new()
        };

        let request = ModificationRequest {
            calendar_id: calendar_id.to_string(),
            event_id: event_id.to_string(),
            scope,
            changes,
        };
        let update = self.resolver.update_event_with_scope(&request, &tz).await?;
        Ok(json!({
            "updated": true,
            "result": update,
            "warnings": warnings,
        }))
    }

    /// Conflict warnings for the event as it will look after the update.
    /// Best effort: failures are logged and yield no warnings.
    async fn conflicts_after_update(
        &self,
        calendar_id: &str,
        event_id: &str,
        scope: &ModificationScope,
        changes: &EventChanges,
        tz: &str,
    ) -> Vec<String> {
        let check = async {
            let target = match scope {
                ModificationScope::ThisInstanceOnly { original_start } => {
                    let addressed = self.store.get_event(calendar_id, event_id).await?;
                    let master_id = addressed
                        .recurring_event_id
                        .unwrap_or_else(|| event_id.to_string());
                    instance_id(&master_id, original_start)
                },
                _ => event_id.to_string(),
            };
            let mut candidate = self.store.get_event(calendar_id, &target).await?;
            let patch = build_patch(changes, tz)?;
            patch.apply_to(&mut candidate)?;
            candidate.id = Some(target);

            let config = DetectorConfig {
                check_duplicates: false,
                ..self.settings.detector.clone()
            };
            let result = self.detector.check(&candidate, calendar_id, &config).await?;
            Ok::<_, agenda_calendar::Error>(format_warnings(&result))
        };

        match check.await {
            Ok(warnings) => warnings,
            Err(e) => {
                warn!(calendar_id, event_id, error = %e, "conflict check for update skipped");
                Vec::new()
            },
        }
    }

    async fn delete_event(&self, params: &Value) -> Result<Value> {
        let calendar_id = self.calendar_id(params);
        let event_id = require(params, "event_id", "delete_event")?;
        self.store.delete_event(calendar_id, event_id).await?;
        info!(calendar_id, event_id, "deleted event");
        Ok(json!({
            "deleted": true,
            "calendar_id": calendar_id,
            "event_id": event_id,
        }))
    }

    async fn get_freebusy(&self, params: &Value) -> Result<Value> {
        let calendar_ids: Vec<String> = match params.get("calendar_ids") {
            None | Some(Value::Null) => vec![self.calendar_id(params).to_string()],
            Some(Value::Array(ids)) => ids
                .iter()
                .map(|id| {
                    id.as_str()
                        .map(String::from)
                        .ok_or_else(|| anyhow!("'calendar_ids' must be a list of strings"))
                })
                .collect::<Result<_>>()?,
            Some(_) => bail!("'calendar_ids' must be a list of strings"),
        };
        if calendar_ids.is_empty() {
            bail!("'get_freebusy' requires at least one calendar id");
        }

        let tz = self.timezone(&calendar_ids[0]).await;
        let window = checked_window(
            time::to_instant(require(params, "time_min", "get_freebusy")?, &tz)?,
            time::to_instant(require(params, "time_max", "get_freebusy")?, &tz)?,
        )?;
        let calendars = self.store.free_busy(&calendar_ids, &window).await?;
        Ok(json!({
            "time_min": window.start,
            "time_max": window.end,
            "calendars": calendars,
        }))
    }
}

// ── Parameter helpers ───────────────────────────────────────────────────────

fn str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn require<'a>(params: &'a Value, key: &str, operation: &str) -> Result<&'a str> {
    str_param(params, key).ok_or_else(|| anyhow!("'{operation}' requires '{key}' parameter"))
}

/// Field changes carried by `params`. Attendees may be given as bare emails.
fn parse_changes(params: &Value) -> Result<EventChanges> {
    let mut params = params.clone();
    if let Some(Value::Array(attendees)) = params.get_mut("attendees") {
        for attendee in attendees.iter_mut() {
            if let Value::String(email) = attendee {
                *attendee = json!({ "email": email });
            }
        }
    }
    serde_json::from_value(params).map_err(|e| anyhow!("invalid event fields: {e}"))
}

fn default_end(event: &Event, tz: &str) -> Result<EventTime> {
    match &event.start {
        Some(EventTime::Date { date }) => Ok(EventTime::date(*date + Duration::days(1))),
        Some(start @ EventTime::DateTime { .. }) => {
            let tz = start.time_zone().unwrap_or(tz);
            let instant = start.resolve(tz)? + Duration::minutes(DEFAULT_EVENT_MINUTES);
            Ok(EventTime::timed(instant, tz)?)
        },
        None => bail!("'create_event' requires 'start' parameter"),
    }
}

fn checked_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeWindow> {
    if end <= start {
        bail!(
            "time_max ({}) must be after time_min ({})",
            end.to_rfc3339(),
            start.to_rfc3339()
        );
    }
    Ok(TimeWindow::new(start, end))
}

#[async_trait]
impl AgentTool for CalendarTool {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Manage calendar events.\n\n\
         Operations:\n\
         - list_calendars: List calendars visible to the account.\n\
         - list_events: Events in a window. Params: calendar_id, time_min, time_max (default: next 7 days), \
           query, max_results.\n\
         - get_event: Params: event_id.\n\
         - create_event: Params: summary, start (required), end, time_zone, description, location, attendees, \
           recurrence, reminders, color_id, conference_data, attachments, transparency, visibility. \
           Near-certain duplicates are refused unless allow_duplicates is true; similar or overlapping \
           events are returned as warnings.\n\
         - update_event: Params: event_id plus any fields to change (null clears a field, [] clears a list). \
           For recurring events set modification_scope: all (default), this_instance_only (needs \
           original_start_time) or this_and_following (needs a future future_start_date).\n\
         - delete_event: Params: event_id.\n\
         - get_freebusy: Busy intervals. Params: calendar_ids, time_min, time_max.\n\n\
         Times are RFC 3339, or local YYYY-MM-DDTHH:MM:SS in the calendar's zone, or YYYY-MM-DD for all-day \
         events. calendar_id defaults to the configured calendar."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["operation"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": [
                        "list_calendars", "list_events", "get_event", "create_event",
                        "update_event", "delete_event", "get_freebusy"
                    ],
                    "description": "The calendar operation to perform"
                },
                "calendar_id": {
                    "type": "string",
                    "description": "Calendar id (defaults to the configured calendar)"
                },
                "calendar_ids": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Calendars to query (get_freebusy)"
                },
                "event_id": { "type": "string", "description": "Event id" },
                "time_min": { "type": "string", "description": "Window start" },
                "time_max": { "type": "string", "description": "Window end" },
                "query": { "type": "string", "description": "Text filter on title and description (list_events)" },
                "max_results": { "type": "integer", "minimum": 1 },
                "summary": { "type": "string", "description": "Event title" },
                "description": { "type": ["string", "null"] },
                "location": { "type": ["string", "null"] },
                "start": { "type": "string", "description": "Start date-time, or date for all-day events" },
                "end": { "type": "string", "description": "End date-time, or exclusive end date for all-day events" },
                "time_zone": { "type": "string", "description": "IANA zone for start/end (defaults to the calendar's)" },
                "attendees": {
                    "type": "array",
                    "items": {
                        "anyOf": [
                            { "type": "string", "description": "Email address" },
                            {
                                "type": "object",
                                "required": ["email"],
                                "properties": {
                                    "email": { "type": "string" },
                                    "display_name": { "type": "string" },
                                    "optional": { "type": "boolean" }
                                }
                            }
                        ]
                    }
                },
                "recurrence": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "RRULE/EXDATE/RDATE lines, e.g. RRULE:FREQ=WEEKLY;BYDAY=MO"
                },
                "reminders": {
                    "type": "object",
                    "properties": {
                        "use_default": { "type": "boolean" },
                        "overrides": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "method": { "type": "string", "enum": ["email", "popup"] },
                                    "minutes": { "type": "integer", "minimum": 0 }
                                }
                            }
                        }
                    }
                },
                "color_id": { "type": ["string", "null"] },
                "conference_data": { "type": "object", "description": "Conference data as accepted by the calendar service" },
                "attachments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["file_url"],
                        "properties": {
                            "file_url": { "type": "string" },
                            "title": { "type": "string" },
                            "mime_type": { "type": "string" }
                        }
                    }
                },
                "extended_properties": {
                    "type": "object",
                    "properties": {
                        "private": { "type": "object", "additionalProperties": { "type": "string" } },
                        "shared": { "type": "object", "additionalProperties": { "type": "string" } }
                    }
                },
                "transparency": { "type": "string", "enum": ["opaque", "transparent"] },
                "visibility": { "type": "string", "enum": ["default", "public", "private", "confidential"] },
                "allow_duplicates": {
                    "type": "boolean",
                    "description": "Create even if a near-identical event exists (create_event)"
                },
                "modification_scope": {
                    "type": "string",
                    "enum": ["all", "this_instance_only", "this_and_following"],
                    "description": "Which occurrences of a recurring event to change (update_event)"
                },
                "original_start_time": {
                    "type": "string",
                    "description": "Original start of the instance to change (this_instance_only)"
                },
                "future_start_date": {
                    "type": "string",
                    "description": "First occurrence to change; must be in the future (this_and_following)"
                }
            }
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let operation = params
            .get("operation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("missing 'operation' parameter"))?;
        debug!(operation, "calendar tool call");

        match operation {
            "list_calendars" => self.list_calendars().await,
            "list_events" => self.list_events(&params).await,
            "get_event" => self.get_event(&params).await,
            "create_event" => self.create_event(&params).await,
            "update_event" => self.update_event(&params).await,
            "delete_event" => self.delete_event(&params).await,
            "get_freebusy" => self.get_freebusy(&params).await,
            _ => bail!("unknown operation: {operation}"),
        }
    }
}
