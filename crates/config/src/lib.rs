//! Configuration loading and validation for agenda.
//!
//! Config files: `agenda.toml`, `agenda.yaml`, `agenda.yml` or `agenda.json`,
//! searched in `./` then the user config directory (`~/.config/agenda/` on
//! Linux).
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-fallback}` substitution in the raw
//! file before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, find_config_file, load_config},
    schema::{AgendaConfig, CalendarConfig, ConflictsConfig},
    validate::{Diagnostic, Severity, ValidationResult},
};
