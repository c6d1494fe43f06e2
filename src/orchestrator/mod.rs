//! Application-level orchestration.
//!
//! This module owns request dispatch (one relay per request, routed back by id) and
//! post-completion processing such as exports. UI/CLI layers call into this module to
//! keep responsibilities separated.

mod controller;
mod post_process;

pub(crate) use controller::{run_controller, UiCommand};
pub(crate) use post_process::process_completion;
