use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::AgendaConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["agenda.toml", "agenda.yaml", "agenda.yml", "agenda.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<AgendaConfig> {
    let raw = read_substituted(path)?;
    parse_config(&raw, path)
}

/// Read `path` and substitute `${ENV}` placeholders.
pub(crate) fn read_substituted(path: &Path) -> anyhow::Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    Ok(substitute_env(&raw))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./agenda.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/agenda.{toml,yaml,yml,json}` (user-global)
///
/// Returns `AgendaConfig::default()` if no config file is found or the file
/// fails to load.
pub fn discover_and_load() -> AgendaConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    AgendaConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agenda").map(|d| d.config_dir().to_path_buf())
}

fn format_of(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<AgendaConfig> {
    match format_of(path) {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

/// Parse raw config text into a format-neutral tree.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> anyhow::Result<serde_json::Value> {
    match format_of(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        ext => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "agenda.toml",
            r#"
[calendar]
default_calendar = "work@example.com"
default_timezone = "Europe/Berlin"

[conflicts]
check_conflicts = false
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.calendar.default_calendar, "work@example.com");
        assert_eq!(
            config.calendar.default_timezone.as_deref(),
            Some("Europe/Berlin")
        );
        assert!(!config.conflicts.check_conflicts);
        assert!(config.conflicts.check_duplicates);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = write(
            &dir,
            "agenda.yml",
            "conflicts:\n  duplicate_threshold: 0.85\n",
        );
        let json = write(
            &dir,
            "agenda.json",
            r#"{ "calendar": { "timeout_secs": 5 } }"#,
        );
        assert!((load_config(&yaml).unwrap().conflicts.duplicate_threshold - 0.85).abs() < 1e-9);
        assert_eq!(load_config(&json).unwrap().calendar.timeout_secs, 5);
    }

    #[test]
    fn substitutes_fallback_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "agenda.toml",
            r#"
[calendar]
access_token = "${AGENDA_TEST_UNSET_TOKEN_6F1C:-fallback-token}"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.calendar.access_token.unwrap().expose_secret(),
            "fallback-token"
        );
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "agenda.ini", "x = 1");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/agenda.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/agenda.toml"));
    }

    #[test]
    fn finds_first_candidate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir, "agenda.json", "{}");
        write(&dir, "agenda.yaml", "{}");
        assert_eq!(find_in(dir.path()), Some(dir.path().join("agenda.yaml")));
    }

    #[test]
    fn value_tree_is_format_neutral() {
        let toml_value =
            parse_config_value("[calendar]\ntimeout_secs = 5\n", Path::new("a.toml")).unwrap();
        let yaml_value =
            parse_config_value("calendar:\n  timeout_secs: 5\n", Path::new("a.yaml")).unwrap();
        assert_eq!(toml_value, yaml_value);
    }
}
