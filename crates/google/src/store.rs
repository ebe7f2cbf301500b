//! [`CalendarStore`] over the Google Calendar v3 REST API.

use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, SecondsFormat, Utc},
    reqwest::{Client, Method, RequestBuilder, Response, StatusCode},
    secrecy::ExposeSecret,
    serde::de::DeserializeOwned,
    tracing::{debug, warn},
    url::Url,
};

use agenda_calendar::{
    Error, Result,
    patch::{EventPatch, WriteFlags},
    store::CalendarStore,
    time::TimeWindow,
    types::{BusyCalendar, CalendarInfo, Event},
};

use crate::{
    auth::AccessTokenProvider,
    wire::{
        CalendarListPage, CalendarResource, ErrorEnvelope, EventsPage, FreeBusyItem,
        FreeBusyRequest, FreeBusyResponse,
    },
};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Page size requested when listing; the service caps it at 2500.
const PAGE_SIZE: &str = "250";

const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Non-2xx reply that maps to no more specific error.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

pub struct GoogleCalendarStore {
    client: Client,
    base_url: Url,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GoogleCalendarStore {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Self::with_base_url(tokens, DEFAULT_BASE_URL)
    }

    /// Point the store at another API root (a proxy or a test server).
    pub fn with_base_url(tokens: Arc<dyn AccessTokenProvider>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::upstream(format!("invalid calendar API URL '{base_url}'"), e))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::message(format!(
                "calendar API URL '{base_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            tokens,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.tokens.access_token().await?;
        debug!(%method, url = %url, "calendar API request");
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(token.expose_secret())
            .header("Accept", "application/json"))
    }

    async fn send(
        &self,
        builder: RequestBuilder,
        context: &str,
        target: Target<'_>,
    ) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|source| Error::upstream(context, source))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(map_error(status, &body, context, target))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context: &str,
        target: Target<'_>,
    ) -> Result<T> {
        self.send(builder, context, target)
            .await?
            .json()
            .await
            .map_err(|source| Error::upstream(format!("{context}: invalid response"), source))
    }
}

/// What a request addressed, for not-found reporting.
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Calendar(&'a str),
    Event(&'a str, &'a str),
    Service,
}

fn map_error(status: StatusCode, body: &str, context: &str, target: Target<'_>) -> Error {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        body.trim().to_string()
    } else {
        envelope.error.message.clone()
    };
    let rate_limited = envelope
        .error
        .errors
        .iter()
        .any(|detail| RATE_LIMIT_REASONS.contains(&detail.reason.as_str()));

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => match target {
            Target::Event(calendar_id, event_id) => Error::not_found(calendar_id, event_id),
            Target::Calendar(calendar_id) => Error::CalendarNotFound {
                calendar_id: calendar_id.to_string(),
            },
            Target::Service => Error::upstream(context, ApiError {
                status: status.as_u16(),
                message,
            }),
        },
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { message },
        StatusCode::FORBIDDEN if rate_limited => Error::RateLimited { message },
        StatusCode::FORBIDDEN => Error::PermissionDenied { message },
        _ => {
            warn!(status = status.as_u16(), context, "calendar API error");
            Error::upstream(context, ApiError {
                status: status.as_u16(),
                message,
            })
        },
    }
}

fn rfc3339(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn apply_flags(url: &mut Url, flags: WriteFlags) {
    if let Some(version) = flags.conference_data_version {
        url.query_pairs_mut()
            .append_pair("conferenceDataVersion", &version.to_string());
    }
    if flags.supports_attachments {
        url.query_pairs_mut()
            .append_pair("supportsAttachments", "true");
    }
}

#[async_trait]
impl CalendarStore for GoogleCalendarStore {
    async fn list_calendars(&self) -> Result<Vec<CalendarInfo>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint(&["users", "me", "calendarList"]);
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let req = self.request(Method::GET, url).await?;
            let page: CalendarListPage = self
                .fetch(req, "list calendars", Target::Service)
                .await?;
            calendars.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(calendars)
    }

    async fn calendar_timezone(&self, calendar_id: &str) -> Result<Option<String>> {
        let url = self.endpoint(&["calendars", calendar_id]);
        let req = self.request(Method::GET, url).await?;
        let calendar: CalendarResource = self
            .fetch(req, "get calendar", Target::Calendar(calendar_id))
            .await?;
        Ok(calendar.time_zone.filter(|tz| !tz.is_empty()))
    }

    async fn list_events(&self, calendar_id: &str, window: &TimeWindow) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.endpoint(&["calendars", calendar_id, "events"]);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("timeMin", &rfc3339(&window.start))
                    .append_pair("timeMax", &rfc3339(&window.end))
                    .append_pair("singleEvents", "true")
                    .append_pair("orderBy", "startTime")
                    .append_pair("maxResults", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let req = self.request(Method::GET, url).await?;
            let page: EventsPage = self
                .fetch(req, "list events", Target::Calendar(calendar_id))
                .await?;
            events.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(calendar_id, count = events.len(), "listed events");
        Ok(events)
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id]);
        let req = self.request(Method::GET, url).await?;
        self.fetch(req, "get event", Target::Event(calendar_id, event_id))
            .await
    }

    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &Event,
        flags: WriteFlags,
    ) -> Result<Event> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events"]);
        apply_flags(&mut url, flags);
        let req = self.request(Method::POST, url).await?.json(event);
        self.fetch(req, "insert event", Target::Calendar(calendar_id))
            .await
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Event> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events", event_id]);
        apply_flags(&mut url, patch.flags);
        let req = self.request(Method::PATCH, url).await?.json(&patch.body);
        self.fetch(req, "patch event", Target::Event(calendar_id, event_id))
            .await
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let url = self.endpoint(&["calendars", calendar_id, "events", event_id]);
        let req = self.request(Method::DELETE, url).await?;
        self.send(req, "delete event", Target::Event(calendar_id, event_id))
            .await?;
        Ok(())
    }

    async fn free_busy(
        &self,
        calendar_ids: &[String],
        window: &TimeWindow,
    ) -> Result<Vec<BusyCalendar>> {
        let url = self.endpoint(&["freeBusy"]);
        let body = FreeBusyRequest {
            time_min: window.start,
            time_max: window.end,
            items: calendar_ids
                .iter()
                .map(|id| FreeBusyItem { id: id.as_str() })
                .collect(),
        };
        let req = self.request(Method::POST, url).await?.json(&body);
        let mut resp: FreeBusyResponse = self.fetch(req, "query free/busy", Target::Service).await?;

        Ok(calendar_ids
            .iter()
            .map(|calendar_id| {
                let entry = resp.calendars.remove(calendar_id).unwrap_or_default();
                BusyCalendar {
                    calendar_id: calendar_id.clone(),
                    busy: entry.busy,
                    errors: entry.errors.into_iter().map(|e| e.reason).collect(),
                }
            })
            .collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        agenda_calendar::types::EventTime,
        mockito::Matcher,
        secrecy::Secret,
        serde_json::json,
    };

    use {super::*, crate::auth::StaticToken};

    fn store(server: &mockito::ServerGuard) -> GoogleCalendarStore {
        let tokens = Arc::new(StaticToken::new(Secret::new("test-token".to_string())));
        GoogleCalendarStore::with_base_url(tokens, &server.url()).unwrap()
    }

    fn utc(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(utc("2024-06-15T00:00:00Z"), utc("2024-06-16T00:00:00Z"))
    }

    #[tokio::test]
    async fn list_events_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/calendars/primary/events")
            .match_header("authorization", "Bearer test-token")
            .match_query(Matcher::Regex("maxResults=250$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "items": [{ "id": "a", "summary": "First",
                        "start": { "dateTime": "2024-06-15T09:00:00Z" },
                        "end": { "dateTime": "2024-06-15T10:00:00Z" } }],
                    "nextPageToken": "p2"
                })
                .to_string(),
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::Regex("pageToken=p2$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "items": [{ "id": "b", "summary": "Second" }] }).to_string())
            .create_async()
            .await;

        let events = store(&server)
            .list_events("primary", &window())
            .await
            .unwrap();
        let ids: Vec<_> = events.iter().filter_map(|e| e.id.as_deref()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn list_events_expands_instances_in_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("timeMin".into(), "2024-06-15T00:00:00Z".into()),
                Matcher::UrlEncoded("timeMax".into(), "2024-06-16T00:00:00Z".into()),
                Matcher::UrlEncoded("singleEvents".into(), "true".into()),
                Matcher::UrlEncoded("orderBy".into(), "startTime".into()),
            ]))
            .with_status(200)
            .with_body(json!({ "items": [] }).to_string())
            .create_async()
            .await;

        let events = store(&server)
            .list_events("primary", &window())
            .await
            .unwrap();
        assert!(events.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn calendar_timezone_reads_calendar_resource() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/calendars/work")
            .with_status(200)
            .with_body(json!({ "id": "work", "timeZone": "Europe/Berlin" }).to_string())
            .create_async()
            .await;

        let tz = store(&server).calendar_timezone("work").await.unwrap();
        assert_eq!(tz.as_deref(), Some("Europe/Berlin"));
    }

    #[tokio::test]
    async fn missing_event_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/calendars/primary/events/gone")
            .with_status(410)
            .with_body(json!({ "error": { "code": 410, "message": "Resource has been deleted" } }).to_string())
            .create_async()
            .await;

        let err = store(&server)
            .get_event("primary", "gone")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { ref event_id, .. } if event_id == "gone"));
    }

    #[tokio::test]
    async fn rate_limit_reasons_map_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/calendars/primary/events/evt")
            .with_status(403)
            .with_body(
                json!({ "error": {
                    "code": 403,
                    "message": "Rate Limit Exceeded",
                    "errors": [{ "domain": "usageLimits", "reason": "userRateLimitExceeded" }]
                } })
                .to_string(),
            )
            .create_async()
            .await;

        let err = store(&server)
            .get_event("primary", "evt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }

    #[tokio::test]
    async fn plain_forbidden_is_permission_denied() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/calendars/shared/events/evt")
            .with_status(403)
            .with_body(
                json!({ "error": {
                    "code": 403,
                    "message": "Forbidden",
                    "errors": [{ "domain": "global", "reason": "forbidden" }]
                } })
                .to_string(),
            )
            .create_async()
            .await;

        let err = store(&server)
            .delete_event("shared", "evt")
            .await
            .unwrap_err();
        match err {
            Error::PermissionDenied { message } => assert_eq!(message, "Forbidden"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/me/calendarList")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let err = store(&server).list_calendars().await.unwrap_err();
        match err {
            Error::RateLimited { message } => assert_eq!(message, "slow down"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_errors_are_upstream() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/me/calendarList")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = store(&server).list_calendars().await.unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn insert_sends_write_flags() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("conferenceDataVersion".into(), "1".into()),
                Matcher::UrlEncoded("supportsAttachments".into(), "true".into()),
            ]))
            .match_body(Matcher::PartialJson(json!({ "summary": "Kickoff" })))
            .with_status(200)
            .with_body(
                json!({ "id": "new", "summary": "Kickoff", "htmlLink": "https://calendar.google.com/e/new" })
                    .to_string(),
            )
            .create_async()
            .await;

        let event = Event {
            summary: Some("Kickoff".into()),
            start: Some(EventTime::DateTime {
                date_time: "2024-06-15T09:00:00Z".into(),
                time_zone: None,
            }),
            end: Some(EventTime::DateTime {
                date_time: "2024-06-15T10:00:00Z".into(),
                time_zone: None,
            }),
            ..Default::default()
        };
        let created = store(&server)
            .insert_event("primary", &event, WriteFlags {
                conference_data_version: Some(1),
                supports_attachments: true,
            })
            .await
            .unwrap();
        assert_eq!(created.id.as_deref(), Some("new"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn patch_sends_only_patch_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/calendars/primary/events/evt_20240615T100000Z")
            .match_body(Matcher::Json(json!({ "recurrence": ["RRULE:FREQ=DAILY"] })))
            .with_status(200)
            .with_body(json!({ "id": "evt_20240615T100000Z" }).to_string())
            .create_async()
            .await;

        let patch = EventPatch::recurrence_only(vec!["RRULE:FREQ=DAILY".into()]);
        store(&server)
            .patch_event("primary", "evt_20240615T100000Z", &patch)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn free_busy_keeps_request_order_and_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/freeBusy")
            .match_body(Matcher::PartialJson(json!({
                "items": [{ "id": "primary" }, { "id": "missing" }]
            })))
            .with_status(200)
            .with_body(
                json!({ "calendars": {
                    "missing": { "errors": [{ "domain": "global", "reason": "notFound" }] },
                    "primary": { "busy": [
                        { "start": "2024-06-15T09:00:00Z", "end": "2024-06-15T10:00:00Z" }
                    ] }
                } })
                .to_string(),
            )
            .create_async()
            .await;

        let result = store(&server)
            .free_busy(&["primary".into(), "missing".into()], &window())
            .await
            .unwrap();
        assert_eq!(result[0].calendar_id, "primary");
        assert_eq!(result[0].busy, vec![TimeWindow::new(
            utc("2024-06-15T09:00:00Z"),
            utc("2024-06-15T10:00:00Z")
        )]);
        assert_eq!(result[1].errors, vec!["notFound".to_string()]);
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let tokens = Arc::new(StaticToken::new(Secret::new("t".to_string())));
        let store = GoogleCalendarStore::new(tokens).unwrap();
        assert_eq!(
            store.endpoint(&["calendars", "team@group.calendar.google.com", "events"]).as_str(),
            "https://www.googleapis.com/calendar/v3/calendars/team@group.calendar.google.com/events"
        );
    }
}
