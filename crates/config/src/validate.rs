//! Configuration validation.
//!
//! Checks syntax, flags unknown or misspelled fields, verifies types, then
//! runs semantic checks (threshold ranges, IANA zones, calendar ids).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use secrecy::ExposeSecret;

use crate::{
    loader::{find_config_file, parse_config_value, read_substituted},
    schema::AgendaConfig,
};

/// Similarity at which creation is refused outright.
const BLOCKING_SIMILARITY: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "conflicts.duplicate_threshold"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Struct};

    Struct(HashMap::from([
        (
            "calendar",
            Struct(HashMap::from([
                ("default_calendar", Leaf),
                ("default_timezone", Leaf),
                ("api_base_url", Leaf),
                ("access_token", Leaf),
                ("timeout_secs", Leaf),
            ])),
        ),
        (
            "conflicts",
            Struct(HashMap::from([
                ("check_duplicates", Leaf),
                ("check_conflicts", Leaf),
                ("duplicate_threshold", Leaf),
                ("calendars_to_check", Leaf),
            ])),
        ),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

/// Closest candidate within `max_distance` edits, if any.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate the config file at `path`, or the discovered one when `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

    let Some(actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    let mut result = match read_substituted(&actual_path) {
        Ok(raw) => validate_str(&raw, &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(Severity::Error, "syntax", "", e.to_string())],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate raw config text; the format is taken from `path`'s extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value = match parse_config_value(raw, path) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, &build_schema_map(), "", &mut diagnostics);

    match serde_json::from_value::<AgendaConfig>(value) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match fields.get(key.as_str()) {
            Some(child_schema) => check_unknown_fields(child, child_schema, &path, diagnostics),
            None => {
                let level = if prefix.is_empty() {
                    " at top level"
                } else {
                    ""
                };
                let message = match suggest(key, &known_keys, 3) {
                    Some(s) => format!("unknown field{level} (did you mean \"{s}\"?)"),
                    None => format!("unknown field{level}"),
                };
                diagnostics.push(Diagnostic::new(
                    Severity::Error,
                    "unknown-field",
                    path,
                    message,
                ));
            },
        }
    }
}

fn check_semantics(config: &AgendaConfig, diagnostics: &mut Vec<Diagnostic>) {
    let calendar = &config.calendar;
    let conflicts = &config.conflicts;

    if calendar.default_calendar.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "calendar.default_calendar",
            "default calendar must not be empty",
        ));
    }

    if let Some(tz) = &calendar.default_timezone
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "calendar.default_timezone",
            format!("unknown IANA timezone \"{tz}\""),
        ));
    }

    let base = calendar.api_base_url.as_str();
    if !base.starts_with("https://") && !base.starts_with("http://") {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "calendar.api_base_url",
            format!("\"{base}\" is not an http(s) URL"),
        ));
    } else if base.starts_with("http://") {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "calendar.api_base_url",
            "access token would be sent over plain HTTP",
        ));
    }

    if calendar.timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "calendar.timeout_secs",
            "timeout must be at least one second",
        ));
    }

    match &calendar.access_token {
        None => diagnostics.push(Diagnostic::new(
            Severity::Info,
            "value",
            "calendar.access_token",
            "no access token configured; pass --access-token or set AGENDA_ACCESS_TOKEN",
        )),
        Some(token) if token.expose_secret().starts_with("${") => {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "value",
                "calendar.access_token",
                format!(
                    "placeholder {} was not substituted; is the variable set?",
                    token.expose_secret()
                ),
            ));
        },
        Some(_) => {},
    }

    let threshold = conflicts.duplicate_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "value",
            "conflicts.duplicate_threshold",
            format!("threshold {threshold} is outside [0, 1]"),
        ));
    } else if threshold > BLOCKING_SIMILARITY {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "conflicts.duplicate_threshold",
            format!(
                "threshold {threshold} is above the blocking similarity {BLOCKING_SIMILARITY}; \
                 near-duplicates will be blocked without a prior warning"
            ),
        ));
    }

    if !conflicts.check_duplicates && !conflicts.check_conflicts {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "value",
            "conflicts",
            "both duplicate and conflict checks are disabled",
        ));
    }

    for (i, id) in conflicts.calendars_to_check.iter().enumerate() {
        if id.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "value",
                format!("conflicts.calendars_to_check[{i}]"),
                "calendar id must not be empty",
            ));
        }
    }
}
