//! Application-level orchestration utilities.
//!
//! This module owns run lifecycle control (submit/restart/stop) and post-run processing
//! such as report building and exports. UI/CLI layers call into this module to keep
//! responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub use controller::{ControllerConfig, RunController, SubmitOutcome};
pub(crate) use post_process::{build_report, default_export_path, export_json, process_run_completion};
