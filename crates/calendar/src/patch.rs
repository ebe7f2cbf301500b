//! Sparse update payloads with explicit-presence semantics.
//!
//! A field missing from [`EventChanges`] is left untouched on the server. A
//! field that is present is written verbatim, including empty lists (which
//! clear the list) and `null` for cleared scalars.

use {
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value, json},
};

use crate::{
    Result,
    time,
    types::{Attachment, Attendee, Event, ExtendedProperties, Reminders, Transparency, Visibility},
};

/// Requested field changes for an event.
///
/// Clearable scalars use `Option<Option<T>>`: `None` leaves the field alone,
/// `Some(None)` clears it, `Some(Some(v))` sets it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventChanges {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Option<String>>,
    /// RFC 3339 or civil date-time, or `YYYY-MM-DD` for all-day events.
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// IANA zone applied to `start`/`end`; defaults to the calendar's zone.
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub attendees: Option<Vec<Attendee>>,
    #[serde(default, deserialize_with = "present")]
    pub color_id: Option<Option<String>>,
    #[serde(default)]
    pub reminders: Option<Reminders>,
    #[serde(default)]
    pub conference_data: Option<Value>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub extended_properties: Option<ExtendedProperties>,
    #[serde(default)]
    pub transparency: Option<Transparency>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub recurrence: Option<Vec<String>>,
}

/// Distinguishes an explicit `null` from a missing key.
fn present<'de, T, D>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl EventChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the change set moves the event in time.
    #[must_use]
    pub fn touches_time(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

/// Query-level switches the calendar service needs to honour some fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteFlags {
    /// Set when conference-creation data is written.
    pub conference_data_version: Option<u8>,
    /// Set when the attachment list is written, even if empty.
    pub supports_attachments: bool,
}

impl WriteFlags {
    /// Flags required to write `event` in full.
    #[must_use]
    pub fn for_event(event: &Event) -> Self {
        Self {
            conference_data_version: event.conference_data.as_ref().map(|_| 1),
            supports_attachments: !event.attachments.is_empty(),
        }
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            conference_data_version: self
                .conference_data_version
                .max(other.conference_data_version),
            supports_attachments: self.supports_attachments || other.supports_attachments,
        }
    }
}

/// Minimal update payload plus the flags it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventPatch {
    pub body: Map<String, Value>,
    pub flags: WriteFlags,
}

impl EventPatch {
    /// A patch that only replaces the recurrence lines.
    #[must_use]
    pub fn recurrence_only(lines: Vec<String>) -> Self {
        let mut body = Map::new();
        body.insert("recurrence".into(), json!(lines));
        Self {
            body,
            flags: WriteFlags::default(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Merge this patch onto `event`: present keys overwrite, `null` clears.
    pub fn apply_to(&self, event: &mut Event) -> Result<()> {
        let mut value = serde_json::to_value(&*event)?;
        if let Value::Object(fields) = &mut value {
            for (key, patched) in &self.body {
                if patched.is_null() {
                    fields.remove(key);
                } else {
                    fields.insert(key.clone(), patched.clone());
                }
            }
        }
        *event = serde_json::from_value(value)?;
        Ok(())
    }
}

/// Wrap a caller-supplied time as a date or a zoned date-time.
fn wrap_time(value: &str, tz: &str) -> Value {
    if time::is_date_only(value) {
        json!({ "date": value.trim() })
    } else {
        json!({ "dateTime": value.trim(), "timeZone": tz })
    }
}

fn optional_text(value: &Option<String>) -> Value {
    value.as_ref().map_or(Value::Null, |v| Value::String(v.clone()))
}

/// Build the sparse patch for `changes`.
///
/// `start`/`end` are zoned with `changes.time_zone` when given, otherwise
/// with `default_tz`.
pub fn build_patch(changes: &EventChanges, default_tz: &str) -> Result<EventPatch> {
    let mut body = Map::new();
    let mut flags = WriteFlags::default();

    if let Some(summary) = &changes.summary {
        body.insert("summary".into(), Value::String(summary.clone()));
    }
    if let Some(description) = &changes.description {
        body.insert("description".into(), optional_text(description));
    }
    if let Some(location) = &changes.location {
        body.insert("location".into(), optional_text(location));
    }

    let tz = changes.time_zone.as_deref().unwrap_or(default_tz);
    if let Some(start) = &changes.start {
        body.insert("start".into(), wrap_time(start, tz));
    }
    if let Some(end) = &changes.end {
        body.insert("end".into(), wrap_time(end, tz));
    }

    if let Some(attendees) = &changes.attendees {
        body.insert("attendees".into(), serde_json::to_value(attendees)?);
    }
    if let Some(color_id) = &changes.color_id {
        body.insert("colorId".into(), optional_text(color_id));
    }
    if let Some(reminders) = &changes.reminders {
        body.insert("reminders".into(), serde_json::to_value(reminders)?);
    }
    if let Some(conference_data) = &changes.conference_data {
        body.insert("conferenceData".into(), conference_data.clone());
        flags.conference_data_version = Some(1);
    }
    if let Some(attachments) = &changes.attachments {
        body.insert("attachments".into(), serde_json::to_value(attachments)?);
        flags.supports_attachments = true;
    }
    if let Some(extended) = &changes.extended_properties {
        body.insert("extendedProperties".into(), serde_json::to_value(extended)?);
    }
    if let Some(transparency) = changes.transparency {
        body.insert("transparency".into(), serde_json::to_value(transparency)?);
    }
    if let Some(visibility) = changes.visibility {
        body.insert("visibility".into(), serde_json::to_value(visibility)?);
    }
    if let Some(recurrence) = &changes.recurrence {
        body.insert("recurrence".into(), json!(recurrence));
    }

    Ok(EventPatch { body, flags })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn changes(value: Value) -> EventChanges {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn absent_fields_are_omitted() {
        let patch = build_patch(&changes(json!({ "summary": "Retro" })), "UTC").unwrap();
        assert_eq!(patch.body.len(), 1);
        assert_eq!(patch.body["summary"], "Retro");
        assert_eq!(patch.flags, WriteFlags::default());
    }

    #[test]
    fn empty_change_set_builds_empty_patch() {
        let c = EventChanges::default();
        assert!(c.is_empty());
        assert!(build_patch(&c, "UTC").unwrap().is_empty());
    }

    #[test]
    fn explicit_null_clears_scalar() {
        let c = changes(json!({ "location": null, "description": "notes" }));
        assert_eq!(c.location, Some(None));
        let patch = build_patch(&c, "UTC").unwrap();
        assert!(patch.body["location"].is_null());
        assert_eq!(patch.body["description"], "notes");
        assert!(!patch.body.contains_key("colorId"));
    }

    #[test]
    fn empty_attachment_list_is_written_and_flagged() {
        let patch = build_patch(&changes(json!({ "attachments": [] })), "UTC").unwrap();
        assert_eq!(patch.body["attachments"], json!([]));
        assert!(patch.flags.supports_attachments);
        assert_eq!(patch.flags.conference_data_version, None);
    }

    #[test]
    fn conference_data_sets_version_flag() {
        let c = changes(json!({
            "conference_data": { "createRequest": { "requestId": "abc" } }
        }));
        let patch = build_patch(&c, "UTC").unwrap();
        assert_eq!(patch.flags.conference_data_version, Some(1));
        assert!(!patch.flags.supports_attachments);
        assert_eq!(
            patch.body["conferenceData"]["createRequest"]["requestId"],
            "abc"
        );
    }

    #[test]
    fn times_use_default_zone() {
        let c = changes(json!({ "start": "2024-06-15T14:00:00" }));
        let patch = build_patch(&c, "Europe/Paris").unwrap();
        assert_eq!(
            patch.body["start"],
            json!({ "dateTime": "2024-06-15T14:00:00", "timeZone": "Europe/Paris" })
        );
        assert!(!patch.body.contains_key("end"));
    }

    #[test]
    fn explicit_zone_wins_over_default() {
        let c = changes(json!({
            "start": "2024-06-15T14:00:00",
            "end": "2024-06-15T15:00:00",
            "time_zone": "Asia/Tokyo"
        }));
        let patch = build_patch(&c, "Europe/Paris").unwrap();
        assert_eq!(patch.body["start"]["timeZone"], "Asia/Tokyo");
        assert_eq!(patch.body["end"]["timeZone"], "Asia/Tokyo");
    }

    #[test]
    fn date_only_values_become_all_day() {
        let c = changes(json!({ "start": "2024-06-15", "end": "2024-06-16" }));
        let patch = build_patch(&c, "UTC").unwrap();
        assert_eq!(patch.body["start"], json!({ "date": "2024-06-15" }));
        assert_eq!(patch.body["end"], json!({ "date": "2024-06-16" }));
    }

    #[test]
    fn apply_merges_onto_event() {
        let mut event = Event {
            id: Some("evt".into()),
            summary: Some("Old".into()),
            location: Some("Room A".into()),
            ..Default::default()
        };
        let c = changes(json!({ "summary": "New", "location": null }));
        build_patch(&c, "UTC").unwrap().apply_to(&mut event).unwrap();
        assert_eq!(event.summary.as_deref(), Some("New"));
        assert_eq!(event.location, None);
        assert_eq!(event.id.as_deref(), Some("evt"));
    }

    #[test]
    fn recurrence_only_patch_has_single_key() {
        let patch = EventPatch::recurrence_only(vec!["RRULE:FREQ=DAILY".into()]);
        assert_eq!(patch.body.len(), 1);
        assert_eq!(patch.body["recurrence"], json!(["RRULE:FREQ=DAILY"]));
    }

    #[test]
    fn flags_for_event_follow_content() {
        let event = Event {
            conference_data: Some(json!({ "conferenceId": "x" })),
            ..Default::default()
        };
        let flags = WriteFlags::for_event(&event);
        assert_eq!(flags.conference_data_version, Some(1));
        assert!(!flags.supports_attachments);
        let merged = flags.union(WriteFlags {
            conference_data_version: None,
            supports_attachments: true,
        });
        assert!(merged.supports_attachments);
        assert_eq!(merged.conference_data_version, Some(1));
    }
}
