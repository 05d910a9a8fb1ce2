#![allow(clippy::module_name_repetitions)]
//! Injection launcher: validate a launch request, build the child environment
//! and run the command with the interception library pre-loaded.
//!
//! Checks run in a fixed order (request, config, library, injection) and no
//! child is spawned unless all of them pass.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::config::{load_config, HookConfig};
use crate::errors::HookError;
use crate::inject::{platform_runtime, InjectableRuntime};
use crate::overlay::{merge, EnvSnapshot, EnvironmentOverlay};
use crate::signals::SignalRelay;
use crate::util::{shell_escape, shell_join};

/// Absolute path of the interception library, for code running inside hooked processes.
pub const ENV_PRELOAD_LIBRARY: &str = "BOOSTER_HOOK_PRELOAD_LIBRARY";
/// Absolute path of the hook config, read independently by every hooked process.
pub const ENV_CONFIG_PATH: &str = "BOOSTER_HOOK_CONFIG_PATH";

const SHELL: &str = "/bin/sh";

// Granularity of deadline checks and signal relaying while a tree runs.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Command to run at the top of the hooked tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandLine {
    /// A command string interpreted by `/bin/sh -c`.
    Shell(String),
    /// Program and arguments, executed directly.
    Argv(Vec<OsString>),
}

impl CommandLine {
    pub fn shell(s: impl Into<String>) -> Self {
        CommandLine::Shell(s.into())
    }

    pub fn argv<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        CommandLine::Argv(args.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CommandLine::Shell(s) => s.trim().is_empty(),
            CommandLine::Argv(v) => v.first().map_or(true, |p| p.is_empty()),
        }
    }

    /// Program the OS is asked to execute.
    pub fn program(&self) -> OsString {
        match self {
            CommandLine::Shell(_) => OsString::from(SHELL),
            CommandLine::Argv(v) => v.first().cloned().unwrap_or_default(),
        }
    }

    fn to_command(&self) -> Command {
        match self {
            CommandLine::Shell(s) => {
                let mut cmd = Command::new(SHELL);
                cmd.arg("-c").arg(s);
                cmd
            }
            CommandLine::Argv(v) => {
                let mut cmd = Command::new(&v[0]);
                cmd.args(&v[1..]);
                cmd
            }
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(s) => write!(f, "{SHELL} -c {}", shell_escape(s)),
            CommandLine::Argv(v) => {
                let words: Vec<String> =
                    v.iter().map(|a| a.to_string_lossy().into_owned()).collect();
                f.write_str(&shell_join(&words))
            }
        }
    }
}

/// Everything needed to launch one hooked command tree.
#[derive(Clone, Debug)]
pub struct LaunchRequest {
    library: PathBuf,
    config: PathBuf,
    overlay: EnvironmentOverlay,
    command: CommandLine,
    base_env: EnvSnapshot,
    cwd: Option<PathBuf>,
    deadline: Option<Duration>,
}

impl LaunchRequest {
    /// `base_env` is the ambient environment captured by the caller.
    pub fn new(
        library: impl Into<PathBuf>,
        config: impl Into<PathBuf>,
        command: CommandLine,
        base_env: EnvSnapshot,
    ) -> Self {
        Self {
            library: library.into(),
            config: config.into(),
            overlay: EnvironmentOverlay::default(),
            command,
            base_env,
            cwd: None,
            deadline: None,
        }
    }

    pub fn overlay(mut self, overlay: EnvironmentOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overlay.set(key, value);
        self
    }

    /// Working directory of the child; also anchors relative `PATH` entries.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Kill the whole tree if the top-level process has not exited after `d`.
    pub fn deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn config_path(&self) -> &Path {
        &self.config
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    pub fn env_overlay(&self) -> &EnvironmentOverlay {
        &self.overlay
    }

    /// Run every pre-spawn check and compute the child environment.
    pub fn prepare(&self, runtime: &dyn InjectableRuntime) -> Result<PreparedLaunch, HookError> {
        if self.command.is_empty() {
            return Err(HookError::InvalidRequest("command line is empty".to_string()));
        }
        self.overlay.validate().map_err(HookError::InvalidRequest)?;

        let config = load_config(&self.config)?;
        let config_abs =
            fs::canonicalize(&self.config).map_err(|source| HookError::ConfigNotFound {
                path: self.config.clone(),
                source,
            })?;

        let library_abs = resolve_library(&self.library)?;

        let mut env = merge(&self.base_env, &self.overlay);
        let target = self.resolve_target(&env);
        runtime.activate(&library_abs, target.as_deref(), &mut env)?;

        if self.overlay.get(ENV_PRELOAD_LIBRARY).is_some()
            || self.overlay.get(ENV_CONFIG_PATH).is_some()
        {
            warn!("overlay sets reserved hook variables; launcher values take precedence");
        }
        env.set(ENV_PRELOAD_LIBRARY, library_abs.as_os_str());
        env.set(ENV_CONFIG_PATH, config_abs.as_os_str());

        Ok(PreparedLaunch {
            config,
            library: library_abs,
            config_path: config_abs,
            env,
            mechanism: runtime.name(),
            preload_var: runtime.preload_var(),
        })
    }

    fn resolve_target(&self, env: &EnvSnapshot) -> Option<PathBuf> {
        let program = PathBuf::from(self.command.program());
        if program.components().count() > 1 {
            return Some(match &self.cwd {
                Some(cwd) if program.is_relative() => cwd.join(program),
                _ => program,
            });
        }
        let path = env.get("PATH")?;
        match &self.cwd {
            Some(cwd) => which::which_in(&program, Some(path), cwd).ok(),
            None => {
                // No directory to anchor relative entries to; search absolute ones only.
                let absolute = std::env::split_paths(path).filter(|d| d.is_absolute());
                let path = std::env::join_paths(absolute).ok()?;
                which::which_in(&program, Some(path), "/").ok()
            }
        }
    }
}

fn resolve_library(library: &Path) -> Result<PathBuf, HookError> {
    let missing = |source| HookError::LibraryMissing {
        path: library.to_path_buf(),
        source,
    };
    let abs = fs::canonicalize(library).map_err(missing)?;
    let meta = fs::metadata(&abs).map_err(missing)?;
    if !meta.is_file() {
        return Err(missing(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(abs)
}

/// A request that passed all checks; holds the exact child environment.
#[derive(Clone, Debug)]
pub struct PreparedLaunch {
    config: HookConfig,
    library: PathBuf,
    config_path: PathBuf,
    env: EnvSnapshot,
    mechanism: &'static str,
    preload_var: Option<&'static str>,
}

impl PreparedLaunch {
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    pub fn mechanism(&self) -> &'static str {
        self.mechanism
    }

    /// Shell-style preview: injection variables, overlay keys, then the command.
    pub fn preview(&self, request: &LaunchRequest) -> String {
        let mut keys: Vec<&str> = Vec::new();
        if let Some(v) = self.preload_var {
            keys.push(v);
        }
        keys.push(ENV_PRELOAD_LIBRARY);
        keys.push(ENV_CONFIG_PATH);
        for (k, _) in request.overlay.iter() {
            if !keys.contains(&k) {
                keys.push(k);
            }
        }
        let mut parts: Vec<String> = keys
            .into_iter()
            .filter_map(|k| {
                self.env
                    .get_str(k)
                    .map(|v| format!("{k}={}", shell_escape(&v)))
            })
            .collect();
        parts.push(request.command.to_string());
        parts.join(" ")
    }
}

/// How the top-level process of the hooked tree ended.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChildStatus {
    Exited(i32),
    Signaled(i32),
    /// Killed by the launcher after the request deadline passed.
    TimedOut,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct LaunchResult {
    pub status: ChildStatus,
    pub duration: Duration,
}

impl LaunchResult {
    pub fn success(&self) -> bool {
        self.status == ChildStatus::Exited(0)
    }

    /// Shell-compatible exit code: signal n maps to 128+n, timeout to 124.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            ChildStatus::Exited(c) => c,
            ChildStatus::Signaled(n) => 128 + n,
            ChildStatus::TimedOut => 124,
        }
    }
}

fn child_status(status: ExitStatus) -> ChildStatus {
    if let Some(code) = status.code() {
        return ChildStatus::Exited(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return ChildStatus::Signaled(sig);
        }
    }
    ChildStatus::Exited(1)
}

/// Launch with the platform's injection mechanism.
pub fn launch(request: &LaunchRequest) -> Result<LaunchResult, HookError> {
    let runtime = platform_runtime();
    launch_with(request, runtime.as_ref())
}

pub fn launch_with(
    request: &LaunchRequest,
    runtime: &dyn InjectableRuntime,
) -> Result<LaunchResult, HookError> {
    let prepared = request.prepare(runtime)?;
    launch_prepared(request, &prepared)
}

/// Spawn a request that already passed `prepare`, without repeating its checks.
#[instrument(
    level = "info",
    skip_all,
    fields(command = %request.command, mechanism = prepared.mechanism)
)]
pub fn launch_prepared(
    request: &LaunchRequest,
    prepared: &PreparedLaunch,
) -> Result<LaunchResult, HookError> {
    debug!(
        config = %prepared.config_path.display(),
        library = %prepared.library.display(),
        rules = prepared.config.rules.len(),
        "launch prepared"
    );
    let program = request.command.program().to_string_lossy().into_owned();

    let mut cmd = request.command.to_command();
    cmd.env_clear();
    cmd.envs(prepared.env.iter());
    if let Some(cwd) = &request.cwd {
        cmd.current_dir(cwd);
    }
    // A deadline needs a group to kill; the group then no longer sees
    // terminal signals, so the launcher relays them.
    let own_group = request.deadline.is_some();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        if own_group {
            cmd.process_group(0);
        }
    }
    let mut relay = request.deadline.map(|_| SignalRelay::install());

    let started = Instant::now();
    let mut child = cmd.spawn().map_err(|source| HookError::SpawnFailed {
        program: program.clone(),
        source,
    })?;
    info!(pid = child.id(), "hooked command started");

    let waited = match request.deadline {
        None => child.wait().map(child_status),
        Some(deadline) => wait_until(&mut child, started + deadline, relay.as_mut()),
    };
    drop(relay);

    let status = match waited {
        Ok(status) => status,
        Err(source) => {
            warn!(error = %source, "waiting on hooked command failed; killing its tree");
            kill_tree(&mut child, own_group);
            let _ = child.wait();
            return Err(HookError::WaitFailed { program, source });
        }
    };

    let result = LaunchResult {
        status,
        duration: started.elapsed(),
    };
    info!(status = ?result.status, elapsed = ?result.duration, "hooked command finished");
    Ok(result)
}

fn wait_until(
    child: &mut Child,
    expires: Instant,
    mut relay: Option<&mut SignalRelay>,
) -> io::Result<ChildStatus> {
    let pid = child.id();
    loop {
        let now = Instant::now();
        if now >= expires {
            warn!("deadline passed; killing hooked process tree");
            kill_tree(child, true);
            let _ = child.wait();
            return Ok(ChildStatus::TimedOut);
        }
        if let Some(status) = child.wait_timeout((expires - now).min(WAIT_SLICE))? {
            return Ok(child_status(status));
        }
        if let Some(r) = relay.as_deref_mut() {
            r.relay(pid);
        }
    }
}

fn kill_tree(child: &mut Child, own_group: bool) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if own_group && killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL).is_ok() {
            return;
        }
    }
    #[cfg(not(unix))]
    let _ = own_group;
    let _ = child.kill();
}

/// Run a shell command string under the hook with the current ambient
/// environment and working directory.
pub fn run_process(
    library: impl AsRef<Path>,
    config: impl AsRef<Path>,
    overlay: EnvironmentOverlay,
    command: &str,
) -> Result<LaunchResult, HookError> {
    let mut request = LaunchRequest::new(
        library.as_ref(),
        config.as_ref(),
        CommandLine::shell(command),
        EnvSnapshot::capture(),
    )
    .overlay(overlay);
    if let Ok(cwd) = std::env::current_dir() {
        request = request.cwd(cwd);
    }
    launch(&request)
}
