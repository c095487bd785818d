//! CLI output formatting for pipeline events.
//!
//! Everything the user is meant to read goes to stdout through this module:
//! stage banners, non-fatal warnings, and the report echo. Diagnostics
//! (resolved paths, warp parameters, engine invocations) go through
//! `tracing` on stderr instead.
//!
//! # Output Format
//!
//! ```text
//!
//! =====REGISTRATION=====
//!
//! Reading reference model files...
//! Reading test model files...
//!
//! NO TEST DTM: defaults to reference DTM
//! {
//!   "threshold_geometry": { ... },
//!   "registration_offset": [0.0, 0.0, 0.0],
//!   "terrain_accuracy": { ... },
//!   "relative_accuracy": { ... },
//!   "offset": [0.0, 0.0, 0.0]
//! }
//! WARNING: No test MTL file, skipping material metrics
//! ```
//!
//! Warnings always start with `WARNING:` except the missing test DTM notice,
//! which keeps its historical wording.
//!
//! # Architecture
//!
//! [`format_event`] returns `Vec<String>` for testability and [`print_event`]
//! writes the lines to stdout. Format functions are pure: no I/O, no side
//! effects.

use crate::pipeline::RunEvent;
use serde_json::Value;

/// Lines printed for one pipeline event.
pub fn format_event(event: &RunEvent) -> Vec<String> {
    match event {
        RunEvent::Registration => vec![String::new(), "=====REGISTRATION=====".to_string()],
        RunEvent::SkippingRegistration => {
            vec![String::new(), "SKIPPING REGISTRATION".to_string()]
        }
        RunEvent::IdentityAlignment => vec![
            "WARNING: No Align3DPath configured, using a zero registration offset".to_string(),
        ],
        RunEvent::ReadingReference => {
            vec![String::new(), "Reading reference model files...".to_string()]
        }
        RunEvent::ReadingTest => vec!["Reading test model files...".to_string(), String::new()],
        RunEvent::NoTestDtm => vec!["NO TEST DTM: defaults to reference DTM".to_string()],
        RunEvent::PlotDisplayUnavailable => vec![
            "WARNING: ShowPlots needs an interactive display, saving PNG plots instead".to_string(),
        ],
        RunEvent::ReportWritten { json, .. } => json.lines().map(str::to_string).collect(),
        RunEvent::MaterialMetrics(value) => {
            let mut lines = vec!["Material metrics".to_string()];
            lines.extend(pretty_lines(value));
            lines
        }
        RunEvent::NoTestMtl => {
            vec!["WARNING: No test MTL file, skipping material metrics".to_string()]
        }
    }
}

pub fn print_event(event: &RunEvent) {
    for line in format_event(event) {
        println!("{line}");
    }
}

fn pretty_lines(value: &Value) -> Vec<String> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => vec![value.to_string()],
    }
}
