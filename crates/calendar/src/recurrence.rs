//! Scope-aware updates of recurring events.
//!
//! A change to a recurring event applies to the whole series, to one
//! instance, or to an instant and everything after it. The last case splits
//! the series in two sequential writes: the master is truncated with an
//! `UNTIL=` clause, then a continuation series is inserted. The writes are not
//! atomic and a failed insert is reported, never rolled back.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    tracing::{debug, error, info},
};

use crate::{
    Error, Result,
    error::ValidationError,
    patch::{EventChanges, EventPatch, WriteFlags, build_patch},
    store::SharedCalendarStore,
    time,
    types::{Event, EventKind, EventTime},
};

/// The scope a caller asked for, before its parameters are validated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    #[default]
    All,
    #[serde(alias = "single", alias = "instance")]
    ThisInstanceOnly,
    #[serde(alias = "future", alias = "following")]
    ThisAndFollowing,
}

impl ScopeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::ThisInstanceOnly => "this_instance_only",
            Self::ThisAndFollowing => "this_and_following",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "this_instance_only" | "single" | "instance" => Ok(Self::ThisInstanceOnly),
            "this_and_following" | "future" | "following" => Ok(Self::ThisAndFollowing),
            other => Err(ValidationError::UnknownScope {
                scope: other.to_string(),
            }),
        }
    }
}

/// A validated scope; each variant carries the instant it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationScope {
    All,
    ThisInstanceOnly { original_start: DateTime<Utc> },
    ThisAndFollowing { split_at: DateTime<Utc> },
}

impl ModificationScope {
    /// Validate a raw request at the boundary.
    ///
    /// Timestamps without an offset are read in `tz`. The split instant must
    /// be strictly after `now`.
    pub fn parse(
        kind: Option<ScopeKind>,
        original_start_time: Option<&str>,
        future_start_date: Option<&str>,
        tz: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        match kind.unwrap_or_default() {
            ScopeKind::All => Ok(Self::All),
            ScopeKind::ThisInstanceOnly => {
                let raw = non_blank(original_start_time)
                    .ok_or(ValidationError::MissingOriginalInstant)?;
                Ok(Self::ThisInstanceOnly {
                    original_start: time::to_instant(raw, tz)?,
                })
            },
            ScopeKind::ThisAndFollowing => {
                let raw = non_blank(future_start_date)
                    .ok_or(ValidationError::MissingFutureInstant)?;
                let split_at = time::to_instant(raw, tz)?;
                if split_at <= now {
                    return Err(ValidationError::SplitInstantNotFuture {
                        instant: split_at.to_rfc3339(),
                    }
                    .into());
                }
                Ok(Self::ThisAndFollowing { split_at })
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::All => ScopeKind::All,
            Self::ThisInstanceOnly { .. } => ScopeKind::ThisInstanceOnly,
            Self::ThisAndFollowing { .. } => ScopeKind::ThisAndFollowing,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModificationRequest {
    pub calendar_id: String,
    pub event_id: String,
    pub scope: ModificationScope,
    pub changes: EventChanges,
}

impl Default for ModificationRequest {
    fn default() -> Self {
        Self {
            calendar_id: "primary".into(),
            event_id: String::new(),
            scope: ModificationScope::All,
            changes: EventChanges::default(),
        }
    }
}

/// What a scoped update wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ScopedUpdate {
    /// The master was patched; every instance follows.
    Series { event: Event },
    /// One instance was patched.
    Instance { event: Event },
    /// The master was truncated and a continuation series inserted.
    Split { master: Event, continuation: Event },
}

/// Identifier the calendar service uses for one occurrence of a series.
#[must_use]
pub fn instance_id(master_id: &str, original_start: &DateTime<Utc>) -> String {
    format!("{master_id}_{}", time::compact_utc_timestamp(original_start))
}

/// Bound a recurrence rule with `UNTIL=`, replacing any `UNTIL`/`COUNT`.
///
/// Other clauses keep their order. An `RRULE:` prefix is preserved.
#[must_use]
pub fn rewrite_rule_until(line: &str, until: &DateTime<Utc>) -> String {
    let (prefix, rule) = match line.split_once(':') {
        Some((prefix, rule)) if prefix.trim().eq_ignore_ascii_case("RRULE") => {
            (Some(prefix), rule)
        },
        _ => (None, line),
    };

    let mut clauses: Vec<String> = rule
        .split(';')
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .filter(|clause| {
            let key = clause.split('=').next().unwrap_or_default().trim();
            !key.eq_ignore_ascii_case("UNTIL") && !key.eq_ignore_ascii_case("COUNT")
        })
        .map(String::from)
        .collect();
    clauses.push(format!("UNTIL={}", time::compact_utc_timestamp(until)));

    match prefix {
        Some(prefix) => format!("{prefix}:{}", clauses.join(";")),
        None => clauses.join(";"),
    }
}

/// Rewrite the first rule line of `recurrence`; other lines are copied.
#[must_use]
pub fn truncate_recurrence(recurrence: &[String], until: &DateTime<Utc>) -> Vec<String> {
    let target = recurrence
        .iter()
        .position(|line| line.trim_start().to_ascii_uppercase().starts_with("RRULE"))
        .unwrap_or(0);
    recurrence
        .iter()
        .enumerate()
        .map(|(i, line)| {
            if i == target {
                rewrite_rule_until(line, until)
            } else {
                line.clone()
            }
        })
        .collect()
}

/// Applies modification requests to single and recurring events.
pub struct RecurrenceResolver {
    store: SharedCalendarStore,
}

impl RecurrenceResolver {
    pub fn new(store: SharedCalendarStore) -> Self {
        Self { store }
    }

    /// Apply `request`. Times in the changes without a zone use `default_tz`.
    pub async fn update_event_with_scope(
        &self,
        request: &ModificationRequest,
        default_tz: &str,
    ) -> Result<ScopedUpdate> {
        let calendar_id = request.calendar_id.as_str();
        let fetched = self.store.get_event(calendar_id, &request.event_id).await?;
        let master = match fetched.recurring_event_id.clone() {
            Some(master_id) => {
                debug!(
                    event_id = %request.event_id,
                    %master_id, "addressed event is an instance, using its series"
                );
                self.store.get_event(calendar_id, &master_id).await?
            },
            None => fetched,
        };
        let master_id = master
            .id
            .clone()
            .unwrap_or_else(|| request.event_id.clone());

        if master.kind() == EventKind::Single && request.scope != ModificationScope::All {
            return Err(ValidationError::NonRecurringScope {
                event_id: master_id,
                scope: request.scope.kind().to_string(),
            }
            .into());
        }

        match request.scope {
            ModificationScope::All => {
                let patch = build_patch(&request.changes, default_tz)?;
                let event = self.store.patch_event(calendar_id, &master_id, &patch).await?;
                info!(calendar_id, event_id = %master_id, "updated event series");
                Ok(ScopedUpdate::Series { event })
            },
            ModificationScope::ThisInstanceOnly { original_start } => {
                let patch = build_patch(&request.changes, default_tz)?;
                let target = instance_id(&master_id, &original_start);
                let event = self.store.patch_event(calendar_id, &target, &patch).await?;
                info!(calendar_id, event_id = %target, "updated single instance");
                Ok(ScopedUpdate::Instance { event })
            },
            ModificationScope::ThisAndFollowing { split_at } => {
                self.split(calendar_id, &master_id, &master, split_at, &request.changes, default_tz)
                    .await
            },
        }
    }

    /// Truncate the series `master_id` before `split_at` and continue it
    /// from `split_at` as a new series carrying `changes`.
    pub async fn split_series(
        &self,
        calendar_id: &str,
        master_id: &str,
        split_at: DateTime<Utc>,
        changes: &EventChanges,
        default_tz: &str,
    ) -> Result<ScopedUpdate> {
        let master = self.store.get_event(calendar_id, master_id).await?;
        self.split(calendar_id, master_id, &master, split_at, changes, default_tz)
            .await
    }

    async fn split(
        &self,
        calendar_id: &str,
        master_id: &str,
        master: &Event,
        split_at: DateTime<Utc>,
        changes: &EventChanges,
        default_tz: &str,
    ) -> Result<ScopedUpdate> {
        if master.recurrence.is_empty() {
            return Err(Error::NotRecurring {
                event_id: master_id.to_string(),
            });
        }

        let series_tz = master
            .start
            .as_ref()
            .and_then(EventTime::time_zone)
            .unwrap_or(default_tz)
            .to_string();
        let patch = build_patch(changes, &series_tz)?;
        let mut continuation = build_continuation(master, &patch, changes, split_at, &series_tz)?;

        let until = split_at - Duration::days(1);
        let until_stamp = time::compact_utc_timestamp(&until);
        let truncated = EventPatch::recurrence_only(truncate_recurrence(&master.recurrence, &until));
        let master = self
            .store
            .patch_event(calendar_id, master_id, &truncated)
            .await?;
        info!(calendar_id, event_id = master_id, until = %until_stamp, "truncated series");

        let flags = WriteFlags::for_event(&continuation).union(patch.flags);
        continuation = match self.store.insert_event(calendar_id, &continuation, flags).await {
            Ok(inserted) => inserted,
            Err(source) => {
                error!(
                    calendar_id,
                    event_id = master_id,
                    until = %until_stamp,
                    error = %source,
                    "continuation insert failed, series left truncated"
                );
                return Err(Error::SeriesSplitIncomplete {
                    master_id: master_id.to_string(),
                    until: until_stamp,
                    source: Box::new(source),
                });
            },
        };
        info!(
            calendar_id,
            event_id = master_id,
            continuation_id = ?continuation.id,
            "split series"
        );

        Ok(ScopedUpdate::Split {
            master,
            continuation,
        })
    }
}

/// Content of the series that continues from `split_at`.
fn build_continuation(
    master: &Event,
    patch: &EventPatch,
    changes: &EventChanges,
    split_at: DateTime<Utc>,
    series_tz: &str,
) -> Result<Event> {
    let mut continuation = master.duplicate_for_new_series();
    patch.apply_to(&mut continuation)?;

    if changes.start.is_none() {
        continuation.start = Some(if master.is_all_day() {
            let zone = time::parse_timezone(series_tz)?;
            EventTime::date(split_at.with_timezone(&zone).date_naive())
        } else {
            EventTime::timed(split_at, series_tz)?
        });
    }

    if changes.end.is_none() {
        let start = continuation
            .start
            .clone()
            .ok_or(ValidationError::MissingTime { field: "start" })?;
        continuation.end = Some(match start {
            EventTime::Date { date } => {
                let days = match (&master.start, &master.end) {
                    (Some(EventTime::Date { date: s }), Some(EventTime::Date { date: e })) => {
                        (*e - *s).num_days().max(1)
                    },
                    _ => 1,
                };
                EventTime::date(date + Duration::days(days))
            },
            timed @ EventTime::DateTime { .. } => {
                let duration = master.window(series_tz)?.duration();
                let tz = timed.time_zone().unwrap_or(series_tz).to_string();
                EventTime::timed(timed.resolve(&tz)? + duration, &tz)?
            },
        });
    }

    continuation.validate_times()?;
    Ok(continuation)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {chrono::NaiveDate, rstest::rstest, serde_json::json};

    use {super::*, crate::store_memory::InMemoryStore};

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn weekly_standup() -> Event {
        Event {
            summary: Some("Standup".into()),
            location: Some("Room A".into()),
            start: Some(EventTime::DateTime {
                date_time: "2024-01-01T09:00:00".into(),
                time_zone: Some("America/New_York".into()),
            }),
            end: Some(EventTime::DateTime {
                date_time: "2024-01-01T09:30:00".into(),
                time_zone: Some("America/New_York".into()),
            }),
            recurrence: vec![
                "RRULE:FREQ=WEEKLY;BYDAY=MO;COUNT=50".into(),
                "EXDATE;TZID=America/New_York:20240108T090000".into(),
            ],
            conference_data: Some(json!({ "conferenceId": "abc-defg-hij" })),
            ..Default::default()
        }
    }

    fn setup(event: Event) -> (Arc<InMemoryStore>, RecurrenceResolver, String) {
        let store = Arc::new(InMemoryStore::new());
        store.add_calendar("primary", Some("America/New_York"));
        let stored = store.put_event("primary", event);
        let resolver = RecurrenceResolver::new(store.clone());
        (store, resolver, stored.id.unwrap())
    }

    fn changes(value: serde_json::Value) -> EventChanges {
        serde_json::from_value(value).unwrap()
    }

    #[rstest]
    #[case("all", ScopeKind::All)]
    #[case("", ScopeKind::All)]
    #[case("this_instance_only", ScopeKind::ThisInstanceOnly)]
    #[case("single", ScopeKind::ThisInstanceOnly)]
    #[case("This_And_Following", ScopeKind::ThisAndFollowing)]
    #[case("future", ScopeKind::ThisAndFollowing)]
    fn scope_kind_parses(#[case] raw: &str, #[case] expected: ScopeKind) {
        assert_eq!(raw.parse::<ScopeKind>().unwrap(), expected);
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let err = "sometimes".parse::<ScopeKind>().unwrap_err();
        assert_eq!(err, ValidationError::UnknownScope {
            scope: "sometimes".into()
        });
    }

    #[test]
    fn instance_scope_requires_original_start() {
        let err = ModificationScope::parse(
            Some(ScopeKind::ThisInstanceOnly),
            None,
            None,
            "UTC",
            Utc::now(),
        )
        .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("original_start_time"));
    }

    #[test]
    fn following_scope_requires_future_instant() {
        let now = utc("2024-06-01T00:00:00Z");
        let missing =
            ModificationScope::parse(Some(ScopeKind::ThisAndFollowing), None, Some("  "), "UTC", now)
                .unwrap_err();
        assert!(missing.to_string().contains("future_start_date"));

        let past = ModificationScope::parse(
            Some(ScopeKind::ThisAndFollowing),
            None,
            Some("2024-05-01T09:00:00Z"),
            "UTC",
            now,
        )
        .unwrap_err();
        assert!(matches!(
            past,
            Error::Validation(ValidationError::SplitInstantNotFuture { .. })
        ));

        let exactly_now = ModificationScope::parse(
            Some(ScopeKind::ThisAndFollowing),
            None,
            Some("2024-06-01T00:00:00Z"),
            "UTC",
            now,
        );
        assert!(exactly_now.is_err());
    }

    #[test]
    fn civil_scope_times_use_calendar_zone() {
        let scope = ModificationScope::parse(
            Some(ScopeKind::ThisInstanceOnly),
            Some("2024-01-15T09:00:00"),
            None,
            "America/New_York",
            Utc::now(),
        )
        .unwrap();
        assert_eq!(scope, ModificationScope::ThisInstanceOnly {
            original_start: utc("2024-01-15T14:00:00Z")
        });
    }

    #[test]
    fn missing_kind_means_whole_series() {
        let scope = ModificationScope::parse(None, None, None, "UTC", Utc::now()).unwrap();
        assert_eq!(scope, ModificationScope::All);
    }

    #[rstest]
    #[case("2024-06-15T10:00:00Z")]
    #[case("2024-06-15T17:30:00+07:30")]
    #[case("2024-06-15T02:00:00-08:00")]
    fn instance_id_is_offset_invariant(#[case] original: &str) {
        assert_eq!(
            instance_id("abc123", &utc(original)),
            "abc123_20240615T100000Z"
        );
    }

    #[test]
    fn rewrite_drops_count_and_appends_until() {
        let until = utc("2024-03-03T14:00:00Z");
        assert_eq!(
            rewrite_rule_until("RRULE:FREQ=WEEKLY;COUNT=50;BYDAY=MO", &until),
            "RRULE:FREQ=WEEKLY;BYDAY=MO;UNTIL=20240303T140000Z"
        );
        assert_eq!(
            rewrite_rule_until("FREQ=DAILY;INTERVAL=2", &until),
            "FREQ=DAILY;INTERVAL=2;UNTIL=20240303T140000Z"
        );
    }

    #[test]
    fn rewriting_twice_replaces_until() {
        let first = rewrite_rule_until("RRULE:FREQ=DAILY", &utc("2024-03-03T00:00:00Z"));
        let second = rewrite_rule_until(&first, &utc("2024-04-10T00:00:00Z"));
        assert_eq!(second, "RRULE:FREQ=DAILY;UNTIL=20240410T000000Z");
        assert_eq!(second.matches("UNTIL=").count(), 1);
    }

    #[test]
    fn truncate_rewrites_first_rule_and_copies_the_rest() {
        let lines = vec![
            "EXDATE:20240108T140000Z".to_string(),
            "RRULE:FREQ=WEEKLY;UNTIL=20250101T000000Z".to_string(),
            "RRULE:FREQ=MONTHLY".to_string(),
        ];
        let out = truncate_recurrence(&lines, &utc("2024-03-03T14:00:00Z"));
        assert_eq!(out, vec![
            "EXDATE:20240108T140000Z".to_string(),
            "RRULE:FREQ=WEEKLY;UNTIL=20240303T140000Z".to_string(),
            "RRULE:FREQ=MONTHLY".to_string(),
        ]);
    }

    #[tokio::test]
    async fn whole_series_patches_master() {
        let (store, resolver, master_id) = setup(weekly_standup());
        let request = ModificationRequest {
            event_id: master_id.clone(),
            changes: changes(json!({ "summary": "Daily sync" })),
            ..Default::default()
        };

        let update = resolver
            .update_event_with_scope(&request, "America/New_York")
            .await
            .unwrap();
        assert!(matches!(update, ScopedUpdate::Series { .. }));
        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].event_id, master_id);
        assert!(!patches[0].patch.body.contains_key("recurrence"));
        assert_eq!(
            store.event("primary", &master_id).unwrap().summary.as_deref(),
            Some("Daily sync")
        );
    }

    #[tokio::test]
    async fn instance_scope_patches_instance_id() {
        let (store, resolver, master_id) = setup(weekly_standup());
        let request = ModificationRequest {
            event_id: master_id.clone(),
            scope: ModificationScope::ThisInstanceOnly {
                original_start: utc("2024-01-15T09:00:00-05:00"),
            },
            changes: changes(json!({ "location": "Room B" })),
            ..Default::default()
        };

        let update = resolver
            .update_event_with_scope(&request, "America/New_York")
            .await
            .unwrap();
        let ScopedUpdate::Instance { event } = update else {
            panic!("expected instance update");
        };
        assert_eq!(event.location.as_deref(), Some("Room B"));
        assert_eq!(event.recurring_event_id.as_deref(), Some(master_id.as_str()));
        assert_eq!(
            store.patches()[0].event_id,
            format!("{master_id}_20240115T140000Z")
        );
        let master = store.event("primary", &master_id).unwrap();
        assert_eq!(master.recurrence, weekly_standup().recurrence);
        assert_eq!(master.location.as_deref(), Some("Room A"));
    }

    #[tokio::test]
    async fn addressing_an_instance_targets_its_series() {
        let (store, resolver, master_id) = setup(weekly_standup());
        let request = ModificationRequest {
            event_id: format!("{master_id}_20240122T140000Z"),
            changes: changes(json!({ "summary": "Renamed" })),
            ..Default::default()
        };

        resolver
            .update_event_with_scope(&request, "America/New_York")
            .await
            .unwrap();
        assert_eq!(store.patches()[0].event_id, master_id);
    }

    #[tokio::test]
    async fn single_event_rejects_instance_scope() {
        let single = Event {
            recurrence: Vec::new(),
            ..weekly_standup()
        };
        let (store, resolver, event_id) = setup(single);
        let request = ModificationRequest {
            event_id: event_id.clone(),
            scope: ModificationScope::ThisInstanceOnly {
                original_start: utc("2024-01-01T14:00:00Z"),
            },
            ..Default::default()
        };

        let err = resolver
            .update_event_with_scope(&request, "UTC")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::NonRecurringScope { .. })
        ));
        assert!(store.patches().is_empty());
    }

    #[tokio::test]
    async fn split_truncates_master_and_inserts_continuation() {
        let (store, resolver, master_id) = setup(weekly_standup());
        let request = ModificationRequest {
            event_id: master_id.clone(),
            scope: ModificationScope::ThisAndFollowing {
                split_at: utc("2024-03-04T14:00:00Z"),
            },
            changes: changes(json!({ "summary": "Standup v2" })),
            ..Default::default()
        };

        let update = resolver
            .update_event_with_scope(&request, "America/New_York")
            .await
            .unwrap();
        let ScopedUpdate::Split {
            master,
            continuation,
        } = update
        else {
            panic!("expected split");
        };

        assert_eq!(master.recurrence, vec![
            "RRULE:FREQ=WEEKLY;BYDAY=MO;UNTIL=20240303T140000Z".to_string(),
            "EXDATE;TZID=America/New_York:20240108T090000".to_string(),
        ]);
        assert_eq!(master.summary.as_deref(), Some("Standup"));

        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].patch.body.len(), 1);

        assert_ne!(continuation.id.as_deref(), Some(master_id.as_str()));
        assert_eq!(continuation.summary.as_deref(), Some("Standup v2"));
        assert_eq!(continuation.location.as_deref(), Some("Room A"));
        assert_eq!(continuation.recurrence, weekly_standup().recurrence);
        let window = continuation.window("America/New_York").unwrap();
        assert_eq!(window.start, utc("2024-03-04T14:00:00Z"));
        assert_eq!(window.duration(), Duration::minutes(30));

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].event.id, None);
        assert_eq!(inserts[0].event.etag, None);
        assert_eq!(inserts[0].flags.conference_data_version, Some(1));
    }

    #[tokio::test]
    async fn split_honours_explicit_start() {
        let (_store, resolver, master_id) = setup(weekly_standup());
        let update = resolver
            .split_series(
                "primary",
                &master_id,
                utc("2024-03-04T14:00:00Z"),
                &changes(json!({ "start": "2024-03-04T10:00:00" })),
                "UTC",
            )
            .await
            .unwrap();
        let ScopedUpdate::Split { continuation, .. } = update else {
            panic!("expected split");
        };
        let window = continuation.window("UTC").unwrap();
        assert_eq!(window.start, utc("2024-03-04T15:00:00Z"));
        assert_eq!(window.end, utc("2024-03-04T15:30:00Z"));
    }

    #[tokio::test]
    async fn all_day_split_keeps_day_span() {
        let retreat = Event {
            summary: Some("Retreat".into()),
            start: Some(EventTime::date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())),
            end: Some(EventTime::date(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap())),
            recurrence: vec!["RRULE:FREQ=MONTHLY".into()],
            ..Default::default()
        };
        let (_store, resolver, master_id) = setup(retreat);
        let update = resolver
            .split_series(
                "primary",
                &master_id,
                utc("2024-05-01T12:00:00Z"),
                &EventChanges::default(),
                "America/New_York",
            )
            .await
            .unwrap();
        let ScopedUpdate::Split { continuation, .. } = update else {
            panic!("expected split");
        };
        assert_eq!(
            continuation.start,
            Some(EventTime::date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()))
        );
        assert_eq!(
            continuation.end,
            Some(EventTime::date(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap()))
        );
    }

    #[tokio::test]
    async fn failed_insert_leaves_series_truncated() {
        let (store, resolver, master_id) = setup(weekly_standup());
        store.fail_inserts(true);

        let err = resolver
            .split_series(
                "primary",
                &master_id,
                utc("2024-03-04T14:00:00Z"),
                &EventChanges::default(),
                "America/New_York",
            )
            .await
            .unwrap_err();
        match err {
            Error::SeriesSplitIncomplete {
                master_id: truncated,
                until,
                ..
            } => {
                assert_eq!(truncated, master_id);
                assert_eq!(until, "20240303T140000Z");
            },
            other => panic!("unexpected error: {other}"),
        }
        let master = store.event("primary", &master_id).unwrap();
        assert!(master.recurrence[0].contains("UNTIL=20240303T140000Z"));
        assert!(store.inserts().is_empty());
    }

    #[tokio::test]
    async fn splitting_a_single_event_is_not_recurring() {
        let single = Event {
            recurrence: Vec::new(),
            ..weekly_standup()
        };
        let (_store, resolver, event_id) = setup(single);
        let err = resolver
            .split_series(
                "primary",
                &event_id,
                utc("2024-03-04T14:00:00Z"),
                &EventChanges::default(),
                "UTC",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRecurring { .. }));
    }

    #[test]
    fn default_request_updates_whole_series_on_primary() {
        let request = ModificationRequest {
            event_id: "evt".into(),
            ..Default::default()
        };
        assert_eq!(request.calendar_id, "primary");
        assert_eq!(request.scope, ModificationScope::All);
        assert!(request.changes.is_empty());
    }
}
