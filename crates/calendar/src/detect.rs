//! Duplicate and scheduling-conflict detection for candidate events.
//!
//! An existing event is only ever compared with a candidate when their time
//! windows overlap. Overlapping events that look like the same real-world
//! occurrence are reported as duplicates. The rest are reported as conflicts.

use std::collections::BTreeSet;

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    Result,
    store::{SharedCalendarStore, resolve_timezone},
    time::TimeWindow,
    types::{Event, EventStatus, EventTime, Transparency},
};

/// Similarity at or above which creation is refused unless explicitly allowed.
pub const BLOCKING_THRESHOLD: f64 = 0.95;

/// Default similarity at or above which a duplicate warning is raised.
pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.7;

const EXACT_TITLE_SCORE: f64 = 0.95;
const CONTAINMENT_SCORE: f64 = 0.70;
const PARTIAL_TITLE_WEIGHT: f64 = 0.5;
const LOCATION_BONUS: f64 = 0.1;
const PARTIAL_CAP: f64 = 0.6;
const KIND_MISMATCH_CAP: f64 = 0.3;
const CONTAINMENT_TITLE_SIMILARITY: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub check_duplicates: bool,
    pub check_conflicts: bool,
    /// Warn line for duplicates, in `[0, 1]`.
    pub duplicate_threshold: f64,
    /// Calendars to scan. Empty means the calendar the event is written to.
    pub calendars_to_check: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            check_duplicates: true,
            check_conflicts: true,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            calendars_to_check: Vec::new(),
        }
    }
}

/// The existing side of a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRef {
    pub id: Option<String>,
    pub calendar_id: String,
    pub title: String,
    pub html_link: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
}

impl EventRef {
    fn new(calendar_id: &str, event: &Event) -> Self {
        Self {
            id: event.id.clone(),
            calendar_id: calendar_id.to_string(),
            title: event.title().to_string(),
            html_link: event.html_link.clone(),
            start: event.start.clone(),
            end: event.end.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub event: EventRef,
    /// In `[0, 1]`.
    pub similarity: f64,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapMatch {
    pub event: EventRef,
    pub overlap_minutes: i64,
    /// Share of the candidate's own duration, in percent.
    pub overlap_percentage: f64,
    /// One event lies entirely within the other.
    pub fully_contained: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConflictCheckResult {
    pub has_conflicts: bool,
    pub duplicates: Vec<SimilarityMatch>,
    pub conflicts: Vec<OverlapMatch>,
}

/// Caller-side outcome for an event creation.
#[derive(Debug, Clone, PartialEq)]
pub enum CreationDecision {
    /// A near-certain duplicate exists; nothing should be written.
    Blocked { duplicate: SimilarityMatch },
    /// Safe to write; warnings should accompany the success response.
    Proceed { warnings: Vec<String> },
}

// ── Scoring ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum TitleMatch {
    Exact,
    Containment,
    Partial(f64),
}

impl TitleMatch {
    fn similarity(self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::Containment => CONTAINMENT_TITLE_SIMILARITY,
            Self::Partial(jaccard) => jaccard,
        }
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn classify_titles(a: &str, b: &str) -> TitleMatch {
    let (na, nb) = (normalize(a), normalize(b));
    if na.is_empty() || nb.is_empty() {
        return TitleMatch::Partial(0.0);
    }
    if na == nb {
        return TitleMatch::Exact;
    }

    let (ta, tb) = (tokens(&na), tokens(&nb));
    if ta.is_empty() || tb.is_empty() {
        return TitleMatch::Partial(0.0);
    }
    if ta.is_subset(&tb) || tb.is_subset(&ta) {
        return TitleMatch::Containment;
    }
    let shared = ta.intersection(&tb).count() as f64;
    let total = ta.union(&tb).count() as f64;
    TitleMatch::Partial(shared / total)
}

/// Similarity of two titles in `[0, 1]`: 1.0 when equal after normalization,
/// 0.8 when one's tokens contain the other's, token Jaccard otherwise.
#[must_use]
pub fn title_similarity(a: &str, b: &str) -> f64 {
    classify_titles(a, b).similarity()
}

fn same_location(a: &Event, b: &Event) -> bool {
    match (a.location.as_deref(), b.location.as_deref()) {
        (Some(la), Some(lb)) => {
            let (la, lb) = (normalize(la), normalize(lb));
            !la.is_empty() && la == lb
        },
        _ => false,
    }
}

/// Duplicate score for a candidate/existing pair occupying the given
/// windows, or `None` when the windows do not overlap (non-overlapping events
/// are never duplicates).
#[must_use]
pub fn similarity_score(
    candidate: &Event,
    candidate_window: &TimeWindow,
    existing: &Event,
    existing_window: &TimeWindow,
) -> Option<f64> {
    if !candidate_window.overlaps(existing_window) {
        return None;
    }

    let title = classify_titles(candidate.title(), existing.title());
    if candidate.is_all_day() != existing.is_all_day() {
        return Some(KIND_MISMATCH_CAP * title.similarity());
    }

    Some(match title {
        TitleMatch::Exact => EXACT_TITLE_SCORE,
        TitleMatch::Containment => CONTAINMENT_SCORE,
        TitleMatch::Partial(jaccard) => {
            let location = if same_location(candidate, existing) {
                LOCATION_BONUS
            } else {
                0.0
            };
            (PARTIAL_TITLE_WEIGHT * jaccard + location).min(PARTIAL_CAP)
        },
    })
}

fn suggestion_for(similarity: f64) -> String {
    if similarity >= BLOCKING_THRESHOLD {
        "This appears to be a duplicate of an existing event. Consider updating the existing \
         event instead of creating a new one."
            .to_string()
    } else {
        "A similar event already exists at an overlapping time. Verify this is not a duplicate."
            .to_string()
    }
}

fn percent(fraction: f64) -> u32 {
    (fraction * 100.0).round() as u32
}

fn link_suffix(event: &EventRef) -> String {
    event
        .html_link
        .as_deref()
        .map(|link| format!(" ({link})"))
        .unwrap_or_default()
}

/// Human-readable refusal for a blocked creation.
#[must_use]
pub fn describe_blocked(duplicate: &SimilarityMatch) -> String {
    let mut text = format!(
        "Duplicate event detected: \"{}\" in calendar {} is {}% similar to the event being \
         created.",
        duplicate.event.title,
        duplicate.event.calendar_id,
        percent(duplicate.similarity),
    );
    if let Some(link) = &duplicate.event.html_link {
        text.push_str(&format!(" View it at {link}."));
    }
    text.push_str(" Set allow_duplicates to create it anyway.");
    text
}

#[must_use]
pub fn describe_duplicate(duplicate: &SimilarityMatch) -> String {
    format!(
        "POTENTIAL DUPLICATE: \"{}\"{} is {}% similar. {}",
        duplicate.event.title,
        link_suffix(&duplicate.event),
        percent(duplicate.similarity),
        duplicate.suggestion,
    )
}

#[must_use]
pub fn describe_conflict(conflict: &OverlapMatch) -> String {
    let unit = if conflict.overlap_minutes == 1 {
        "minute"
    } else {
        "minutes"
    };
    format!(
        "SCHEDULING CONFLICT: overlaps with \"{}\"{} for {} {unit} ({}% of this event){}",
        conflict.event.title,
        link_suffix(&conflict.event),
        conflict.overlap_minutes,
        conflict.overlap_percentage.round() as i64,
        if conflict.fully_contained {
            ", one event lies entirely within the other"
        } else {
            ""
        },
    )
}

/// Warnings for every reported duplicate and conflict.
#[must_use]
pub fn format_warnings(result: &ConflictCheckResult) -> Vec<String> {
    result
        .duplicates
        .iter()
        .map(describe_duplicate)
        .chain(result.conflicts.iter().map(describe_conflict))
        .collect()
}

/// Apply the creation policy to a check result.
#[must_use]
pub fn decide(
    result: &ConflictCheckResult,
    config: &DetectorConfig,
    allow_duplicates: bool,
) -> CreationDecision {
    if !allow_duplicates
        && let Some(blocking) = result
            .duplicates
            .iter()
            .find(|d| d.similarity >= BLOCKING_THRESHOLD)
    {
        return CreationDecision::Blocked {
            duplicate: blocking.clone(),
        };
    }

    let warnings = result
        .duplicates
        .iter()
        .filter(|d| d.similarity >= config.duplicate_threshold)
        .map(describe_duplicate)
        .chain(result.conflicts.iter().map(describe_conflict))
        .collect();
    CreationDecision::Proceed { warnings }
}

// ── Detector ────────────────────────────────────────────────────────────────

/// Scans existing events for duplicates of, and conflicts with, a candidate.
///
/// Read-only: only lists events and looks up calendar zones.
pub struct ConflictDetector {
    store: SharedCalendarStore,
}

impl ConflictDetector {
    pub fn new(store: SharedCalendarStore) -> Self {
        Self { store }
    }

    /// Evaluate `candidate`, which is about to be written to `calendar_id`.
    pub async fn check(
        &self,
        candidate: &Event,
        calendar_id: &str,
        config: &DetectorConfig,
    ) -> Result<ConflictCheckResult> {
        let mut result = ConflictCheckResult::default();
        if !config.check_duplicates && !config.check_conflicts {
            return Ok(result);
        }

        let target_tz = resolve_timezone(self.store.as_ref(), calendar_id).await;
        let window = candidate.window(&target_tz)?;

        let calendars: Vec<&str> = if config.calendars_to_check.is_empty() {
            vec![calendar_id]
        } else {
            config
                .calendars_to_check
                .iter()
                .map(String::as_str)
                .collect()
        };

        for calendar in calendars {
            let tz = if calendar == calendar_id {
                target_tz.clone()
            } else {
                resolve_timezone(self.store.as_ref(), calendar).await
            };
            let existing = self.store.list_events(calendar, &window).await?;
            debug!(
                calendar_id = calendar,
                count = existing.len(),
                "scanning existing events"
            );
            for event in &existing {
                self.evaluate(candidate, &window, calendar, event, &tz, config, &mut result);
            }
        }

        result
            .duplicates
            .sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        result.has_conflicts = !result.duplicates.is_empty() || !result.conflicts.is_empty();

        if result.has_conflicts {
            info!(
                duplicates = result.duplicates.len(),
                conflicts = result.conflicts.len(),
                "candidate event matches existing events"
            );
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        candidate: &Event,
        window: &TimeWindow,
        calendar_id: &str,
        existing: &Event,
        tz: &str,
        config: &DetectorConfig,
        result: &mut ConflictCheckResult,
    ) {
        // The candidate itself, or an instance of the series it is.
        if candidate.id.is_some()
            && (candidate.id == existing.id || candidate.id == existing.recurring_event_id)
        {
            return;
        }
        if existing.status == Some(EventStatus::Cancelled) {
            return;
        }
        let existing_window = match existing.window(tz) {
            Ok(w) => w,
            Err(e) => {
                debug!(event_id = ?existing.id, error = %e, "skipping event without usable times");
                return;
            },
        };

        if !window.overlaps(&existing_window) {
            return;
        }

        if config.check_duplicates
            && let Some(similarity) =
                similarity_score(candidate, window, existing, &existing_window)
            && similarity >= config.duplicate_threshold
        {
            debug!(event_id = ?existing.id, similarity, "possible duplicate");
            result.duplicates.push(SimilarityMatch {
                event: EventRef::new(calendar_id, existing),
                similarity,
                suggestion: suggestion_for(similarity),
            });
            return;
        }

        if config.check_conflicts && existing.transparency != Some(Transparency::Transparent) {
            let overlap_minutes = window.overlap(&existing_window).num_minutes();
            let candidate_minutes = window.duration().num_minutes();
            let overlap_percentage = if candidate_minutes > 0 {
                overlap_minutes as f64 / candidate_minutes as f64 * 100.0
            } else {
                0.0
            };
            result.conflicts.push(OverlapMatch {
                event: EventRef::new(calendar_id, existing),
                overlap_minutes,
                overlap_percentage,
                fully_contained: existing_window.contains(window)
                    || window.contains(&existing_window),
            });
        }
    }
}
