//! In-memory calendar store for tests and local runs.
//!
//! Recurring series are not expanded by `list_events`; instance ids of the
//! form `{master}_{YYYYMMDDTHHMMSSZ}` are materialized on demand by
//! `get_event`/`patch_event`, mirroring how the remote service addresses them.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {async_trait::async_trait, chrono::Utc};

use crate::{
    Error, Result,
    patch::{EventPatch, WriteFlags},
    store::{CalendarStore, FALLBACK_TIMEZONE},
    time::{self, TimeWindow},
    types::{BusyCalendar, CalendarInfo, Event, EventStatus, EventTime, Transparency},
};

struct CalendarEntry {
    info: CalendarInfo,
    events: BTreeMap<String, Event>,
}

impl CalendarEntry {
    fn timezone(&self) -> &str {
        self.info.time_zone.as_deref().unwrap_or(FALLBACK_TIMEZONE)
    }

    /// Synthesize a single occurrence of a recurring master from its id.
    fn materialize_instance(&self, event_id: &str) -> Option<Event> {
        let (master_id, stamp) = event_id.rsplit_once('_')?;
        let master = self.events.get(master_id)?;
        if master.recurrence.is_empty() {
            return None;
        }
        let original = time::parse_compact_utc_timestamp(stamp)?;
        let tz = master
            .start
            .as_ref()
            .and_then(EventTime::time_zone)
            .unwrap_or(self.timezone());
        let (start, end) = match (&master.start, &master.end) {
            (Some(EventTime::Date { date: first }), Some(EventTime::Date { date: last })) => {
                let zone = time::parse_timezone(tz).ok()?;
                let day = original.with_timezone(&zone).date_naive();
                (EventTime::date(day), EventTime::date(day + (*last - *first)))
            },
            _ => {
                let duration = master.window(tz).ok()?.duration();
                (
                    EventTime::timed(original, tz).ok()?,
                    EventTime::timed(original + duration, tz).ok()?,
                )
            },
        };
        Some(Event {
            id: Some(event_id.to_string()),
            recurrence: Vec::new(),
            recurring_event_id: Some(master_id.to_string()),
            original_start_time: Some(start.clone()),
            start: Some(start),
            end: Some(end),
            etag: None,
            ..master.clone()
        })
    }
}

/// A patch as received by the store.
#[derive(Debug, Clone)]
pub struct RecordedPatch {
    pub calendar_id: String,
    pub event_id: String,
    pub patch: EventPatch,
}

/// An insert as received by the store.
#[derive(Debug, Clone)]
pub struct RecordedInsert {
    pub calendar_id: String,
    pub event: Event,
    pub flags: WriteFlags,
}

/// In-memory store backed by `BTreeMap`s. No persistence.
pub struct InMemoryStore {
    calendars: Mutex<BTreeMap<String, CalendarEntry>>,
    patches: Mutex<Vec<RecordedPatch>>,
    inserts: Mutex<Vec<RecordedInsert>>,
    fail_inserts: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            calendars: Mutex::new(BTreeMap::new()),
            patches: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
        }
    }

    pub fn add_calendar(&self, calendar_id: &str, time_zone: Option<&str>) {
        let mut calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        let primary = calendars.is_empty();
        calendars.insert(calendar_id.to_string(), CalendarEntry {
            info: CalendarInfo {
                id: calendar_id.to_string(),
                summary: Some(calendar_id.to_string()),
                description: None,
                time_zone: time_zone.map(String::from),
                primary,
                access_role: Some("owner".into()),
                background_color: None,
            },
            events: BTreeMap::new(),
        });
    }

    /// Store `event` as-is (creating the calendar if needed), assigning an id
    /// when it has none. Returns the stored copy.
    pub fn put_event(&self, calendar_id: &str, mut event: Event) -> Event {
        let mut calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        let entry = calendars
            .entry(calendar_id.to_string())
            .or_insert_with(|| CalendarEntry {
                info: CalendarInfo {
                    id: calendar_id.to_string(),
                    summary: None,
                    description: None,
                    time_zone: None,
                    primary: false,
                    access_role: None,
                    background_color: None,
                },
                events: BTreeMap::new(),
            });
        let id = event
            .id
            .get_or_insert_with(|| uuid::Uuid::new_v4().simple().to_string())
            .clone();
        entry.events.insert(id, event.clone());
        event
    }

    pub fn event(&self, calendar_id: &str, event_id: &str) -> Option<Event> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        calendars.get(calendar_id)?.events.get(event_id).cloned()
    }

    pub fn events(&self, calendar_id: &str) -> Vec<Event> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        calendars
            .get(calendar_id)
            .map(|entry| entry.events.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn patches(&self) -> Vec<RecordedPatch> {
        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn inserts(&self) -> Vec<RecordedInsert> {
        self.inserts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Make every subsequent insert fail as if the service returned nothing.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn stamp(event: &mut Event) {
    let now = Utc::now().to_rfc3339();
    event.etag = Some(format!("\"{}\"", uuid::Uuid::new_v4().simple()));
    event.created.get_or_insert_with(|| now.clone());
    event.updated = Some(now);
}

#[async_trait]
impl CalendarStore for InMemoryStore {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        Ok(calendars.values().map(|entry| entry.info.clone()).collect())
    }

    async fn calendar_timezone(&self, calendar_id: &str) -> Result<Option<String>> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        calendars
            .get(calendar_id)
            .map(|entry| entry.info.time_zone.clone())
            .ok_or_else(|| Error::CalendarNotFound {
                calendar_id: calendar_id.to_string(),
            })
    }

    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<Event>> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        let entry = calendars
            .get(calendar_id)
            .ok_or_else(|| Error::CalendarNotFound {
                calendar_id: calendar_id.to_string(),
            })?;
        let tz = entry.timezone();
        Ok(entry
            .events
            .values()
            .filter(|event| {
                event
                    .window(tz)
                    .is_ok_and(|w| w.start < window.end && window.start < w.end)
            })
            .cloned()
            .collect())
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        let entry = calendars
            .get(calendar_id)
            .ok_or_else(|| Error::not_found(calendar_id, event_id))?;
        entry
            .events
            .get(event_id)
            .cloned()
            .or_else(|| entry.materialize_instance(event_id))
            .ok_or_else(|| Error::not_found(calendar_id, event_id))
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &Event,
        flags: WriteFlags,
    ) -> Result<Event> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(Error::Upstream {
                context: format!("insert event into {calendar_id}"),
                source: "calendar service returned no data".into(),
            });
        }

        let mut stored = event.clone();
        let id = uuid::Uuid::new_v4().simple().to_string();
        stored.html_link = Some(format!("memory://{calendar_id}/{id}"));
        stored.i_cal_uid = Some(format!("{id}@memory"));
        stored.id = Some(id);
        stored.created = None;
        stamp(&mut stored);
        let stored = self.put_event(calendar_id, stored);

        self.inserts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedInsert {
                calendar_id: calendar_id.to_string(),
                event: event.clone(),
                flags,
            });
        Ok(stored)
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Event> {
        let updated = {
            let mut calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
            let entry = calendars
                .get_mut(calendar_id)
                .ok_or_else(|| Error::not_found(calendar_id, event_id))?;
            let mut event = entry
                .events
                .get(event_id)
                .cloned()
                .or_else(|| entry.materialize_instance(event_id))
                .ok_or_else(|| Error::not_found(calendar_id, event_id))?;
            patch.apply_to(&mut event)?;
            stamp(&mut event);
            entry.events.insert(event_id.to_string(), event.clone());
            event
        };

        self.patches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedPatch {
                calendar_id: calendar_id.to_string(),
                event_id: event_id.to_string(),
                patch: patch.clone(),
            });
        Ok(updated)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let mut calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        calendars
            .get_mut(calendar_id)
            .and_then(|entry| entry.events.remove(event_id))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(calendar_id, event_id))
    }

    async fn free_busy(
        &self,
        calendar_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<BusyCalendar>> {
        let calendars = self.calendars.lock().unwrap_or_else(|e| e.into_inner());
        Ok(calendar_ids
            .iter()
            .map(|calendar_id| match calendars.get(calendar_id) {
                Some(entry) => {
                    let tz = entry.timezone();
                    let mut busy: Vec<TimeWindow> = entry
                        .events
                        .values()
                        .filter(|e| e.status != Some(EventStatus::Cancelled))
                        .filter(|e| e.transparency != Some(Transparency::Transparent))
                        .filter_map(|e| e.window(tz).ok())
                        .filter(|w| w.overlaps(window))
                        .collect();
                    busy.sort_by_key(|w| w.start);
                    BusyCalendar {
                        calendar_id: calendar_id.clone(),
                        busy,
                        errors: Vec::new(),
                    }
                },
                None => BusyCalendar {
                    calendar_id: calendar_id.clone(),
                    busy: Vec::new(),
                    errors: vec!["notFound".into()],
                },
            })
            .collect())
    }
}
