//! Error mapping guide:
//! - Every `HookError` belongs to exactly one `Stage`; diagnostics always name it.
//! - The child's own non-zero exit is never a `HookError`; it travels inside `LaunchResult`.
//! - Map io::ErrorKind::NotFound to exit code 127 and PermissionDenied to 126 (shell parity).
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Pipeline stage that produced a hook-infrastructure failure.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Stage {
    Request,
    Config,
    Injection,
    Spawn,
    /// The tree was running; waiting on it failed.
    Wait,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Request => "request",
            Stage::Config => "config load",
            Stage::Injection => "injection",
            Stage::Spawn => "spawn",
            Stage::Wait => "wait",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the hook infrastructure itself (never of the user's command).
#[derive(Debug)]
pub enum HookError {
    /// Launch preconditions violated (empty command line, invalid overlay key).
    InvalidRequest(String),
    ConfigNotFound {
        path: PathBuf,
        source: io::Error,
    },
    ConfigMalformed {
        path: PathBuf,
        detail: String,
    },
    LibraryMissing {
        path: PathBuf,
        source: io::Error,
    },
    InjectionUnsupported {
        library: PathBuf,
        reason: String,
    },
    SpawnFailed {
        program: String,
        source: io::Error,
    },
    /// The child was started but could not be waited on; the tree has been killed.
    WaitFailed {
        program: String,
        source: io::Error,
    },
}

impl HookError {
    pub fn stage(&self) -> Stage {
        match self {
            HookError::InvalidRequest(_) => Stage::Request,
            HookError::ConfigNotFound { .. } | HookError::ConfigMalformed { .. } => Stage::Config,
            HookError::LibraryMissing { .. } | HookError::InjectionUnsupported { .. } => {
                Stage::Injection
            }
            HookError::SpawnFailed { .. } => Stage::Spawn,
            HookError::WaitFailed { .. } => Stage::Wait,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, detail: impl Into<String>) -> Self {
        HookError::ConfigMalformed {
            path: path.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::InvalidRequest(msg) => write!(f, "invalid launch request: {msg}"),
            HookError::ConfigNotFound { path, source } => {
                write!(f, "config file {} not readable: {source}", path.display())
            }
            HookError::ConfigMalformed { path, detail } => {
                write!(f, "config file {} is malformed: {detail}", path.display())
            }
            HookError::LibraryMissing { path, source } => write!(
                f,
                "interception library {} not readable: {source}",
                path.display()
            ),
            HookError::InjectionUnsupported { library, reason } => write!(
                f,
                "cannot pre-load {}: {reason}",
                library.display()
            ),
            HookError::SpawnFailed { program, source } => {
                write!(f, "failed to start {program}: {source}")
            }
            HookError::WaitFailed { program, source } => {
                write!(f, "lost track of {program}: {source}; process tree killed")
            }
        }
    }
}

impl std::error::Error for HookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HookError::ConfigNotFound { source, .. }
            | HookError::LibraryMissing { source, .. }
            | HookError::SpawnFailed { source, .. }
            | HookError::WaitFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Map an io::Error to a process exit code:
/// - 127 for NotFound (command not found)
/// - 126 for PermissionDenied (found but not executable)
/// - 71 (EX_OSERR) for everything else
pub fn exit_code_for_io_error(e: &io::Error) -> u8 {
    match e.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 71,
    }
}

/// Convert HookError to an exit code that does not collide with ordinary build failures.
pub fn exit_code_for_hook_error(e: &HookError) -> u8 {
    match e {
        HookError::InvalidRequest(_) => 64,
        HookError::ConfigNotFound { .. } | HookError::ConfigMalformed { .. } => 78,
        HookError::LibraryMissing { .. } | HookError::InjectionUnsupported { .. } => 69,
        HookError::SpawnFailed { source, .. } => exit_code_for_io_error(source),
        HookError::WaitFailed { .. } => 71,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_are_distinct() {
        let names = [
            Stage::Request.as_str(),
            Stage::Config.as_str(),
            Stage::Injection.as_str(),
            Stage::Spawn.as_str(),
            Stage::Wait.as_str(),
        ];
        for (i, a) in names.iter().enumerate() {
            for b in names.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_spawn_exit_codes_follow_shell_conventions() {
        let nf = HookError::SpawnFailed {
            program: "nope".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "not found"),
        };
        let pd = HookError::SpawnFailed {
            program: "nope".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(exit_code_for_hook_error(&nf), 127);
        assert_eq!(exit_code_for_hook_error(&pd), 126);
        assert_eq!(nf.stage(), Stage::Spawn);
    }

    #[test]
    fn test_wait_failure_is_not_a_spawn_failure() {
        let e = HookError::WaitFailed {
            program: "make".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no child"),
        };
        assert_eq!(e.stage(), Stage::Wait);
        assert_eq!(exit_code_for_hook_error(&e), 71);
        assert!(e.to_string().contains("process tree killed"));
    }

    #[test]
    fn test_config_errors_map_to_ex_config() {
        let e = HookError::malformed("/tmp/x.json", "expected value at line 1 column 1");
        assert_eq!(e.stage(), Stage::Config);
        assert_eq!(exit_code_for_hook_error(&e), 78);
        assert!(e.to_string().contains("/tmp/x.json"));
    }
}
