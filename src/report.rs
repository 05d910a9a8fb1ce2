//! Result reporting: turn a launch result into the caller-visible outcome.
//!
//! Hook-infrastructure failures and ordinary command failures are kept apart;
//! only the former produce a diagnostic line.

use crate::color::{color_enabled_stderr, log_error_stderr};
use crate::errors::{exit_code_for_hook_error, HookError, Stage};
use crate::launcher::{ChildStatus, LaunchResult};

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Outcome {
    Success,
    /// The user's command failed; its code is passed through verbatim.
    ChildTerminatedAbnormally { status: ChildStatus, code: i32 },
    /// The hook infrastructure failed before or while starting the command.
    InternalError {
        stage: Stage,
        message: String,
        exit_code: u8,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn is_internal_error(&self) -> bool {
        matches!(self, Outcome::InternalError { .. })
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Success => 0,
            Outcome::ChildTerminatedAbnormally { code, .. } => u8::try_from(*code).unwrap_or(1),
            Outcome::InternalError { exit_code, .. } => *exit_code,
        }
    }
}

/// The one-line diagnostic for an infrastructure failure.
pub fn diagnostic_line(err: &HookError) -> String {
    format!("booster-hook: {} failed: {}", err.stage(), err)
}

/// Classify without side effects.
pub fn classify(result: &Result<LaunchResult, HookError>) -> Outcome {
    match result {
        Ok(r) if r.success() => Outcome::Success,
        Ok(r) => Outcome::ChildTerminatedAbnormally {
            status: r.status,
            code: r.exit_code(),
        },
        Err(e) => Outcome::InternalError {
            stage: e.stage(),
            message: diagnostic_line(e),
            exit_code: exit_code_for_hook_error(e),
        },
    }
}

/// Classify and, for infrastructure failures, print the diagnostic to stderr. Never retries.
pub fn report(result: Result<LaunchResult, HookError>) -> Outcome {
    let outcome = classify(&result);
    match &outcome {
        Outcome::InternalError { message, .. } => {
            tracing::debug!(error = ?result.as_ref().err(), "hook infrastructure failure");
            log_error_stderr(color_enabled_stderr(), message);
        }
        Outcome::ChildTerminatedAbnormally { status, code } => {
            tracing::info!(?status, code, "hooked command failed");
        }
        Outcome::Success => {}
    }
    outcome
}
