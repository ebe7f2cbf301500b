//! Agent-facing tools.
//!
//! [`calendar::CalendarTool`] exposes calendar operations with duplicate and
//! conflict screening plus scope-aware recurring edits; [`registry`] holds
//! the tool trait and the name-keyed registry the CLI dispatches through.

pub mod calendar;
pub mod registry;

pub use {
    calendar::{CalendarTool, CalendarToolSettings},
    registry::{AgentTool, ToolRegistry},
};
