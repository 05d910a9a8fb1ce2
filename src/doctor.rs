//! `booster-hook doctor`: explain what a launch would do on this host.
//!
//! Purely informational; never spawns the build and never fails the caller.

use std::path::PathBuf;
use std::time::Duration;

use crate::color::{color_enabled_stderr, paint, Tone};
use crate::config::load_config;
use crate::farm::{probe_endpoints, HostDirective};
use crate::inject::{check_object_format, check_preload_entry, platform_runtime, ObjectFormat};
use crate::overlay::{EnvSnapshot, FARM_HOSTS_KEY};

#[derive(Clone, Debug, Default)]
pub struct DoctorOptions {
    pub preload: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub farm_hosts: Option<String>,
    pub probe_timeout: Option<Duration>,
}

fn status(use_err: bool, ok: bool, msg: &str) -> String {
    paint(use_err, if ok { Tone::Good } else { Tone::Bad }, msg)
}

pub fn run_doctor(opts: &DoctorOptions, env: &EnvSnapshot) {
    let use_err = color_enabled_stderr();
    eprintln!("booster-hook doctor");
    eprintln!();
    eprintln!(
        "  version: v{} ({}, built {})",
        env!("CARGO_PKG_VERSION"),
        env!("BOOSTER_HOOK_BUILD_TARGET"),
        env!("BOOSTER_HOOK_BUILD_DATE")
    );
    eprintln!(
        "  host:    {} / {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    #[cfg(unix)]
    {
        let uid = nix::unistd::getuid();
        let euid = nix::unistd::geteuid();
        eprintln!("  uid:     {uid} (euid {euid})");
        if uid != euid {
            let note = "note: uid != euid; the loader runs in secure-execution mode \
                        and ignores pre-load";
            eprintln!("  {}", status(use_err, false, note));
        }
    }
    eprintln!();

    let runtime = platform_runtime();
    match runtime.preload_var() {
        Some(var) => eprintln!("  injection: {} ({var})", runtime.name()),
        None => eprintln!(
            "  injection: {}",
            status(use_err, false, "unsupported on this platform")
        ),
    }
    if let Some(var) = runtime.preload_var() {
        if let Some(existing) = env.get_str(var).filter(|v| !v.is_empty()) {
            eprintln!("  existing {var}: {existing} (kept after the hook library)");
        }
    }

    match &opts.preload {
        Some(lib) => {
            let format = if cfg!(target_os = "macos") {
                ObjectFormat::MachO
            } else {
                ObjectFormat::Elf
            };
            let checked = check_preload_entry(lib.as_os_str())
                .and_then(|()| check_object_format(lib, format).map_err(|e| e.to_string()));
            match checked {
                Ok(()) => eprintln!(
                    "  preload library: {} {}",
                    lib.display(),
                    status(use_err, true, "(ok)")
                ),
                Err(e) => eprintln!("  preload library: {}", status(use_err, false, &e)),
            }
        }
        None => eprintln!("  preload library: (not set; use --preload or BOOSTER_HOOK_PRELOAD)"),
    }

    match &opts.config {
        Some(path) => match load_config(path) {
            Ok(cfg) => eprintln!("  config: {}: {}", path.display(), cfg.summary()),
            Err(e) => eprintln!("  config: {}", status(use_err, false, &e.to_string())),
        },
        None => eprintln!("  config: (not set; use --config or BOOSTER_HOOK_CONFIG)"),
    }
    eprintln!();

    let directive = opts
        .farm_hosts
        .clone()
        .or_else(|| env.get_str(FARM_HOSTS_KEY))
        .filter(|s| !s.trim().is_empty());
    match directive {
        None => eprintln!("  farm hosts: (none; every compile runs locally)"),
        Some(raw) => {
            eprintln!("  farm hosts: {raw}");
            match HostDirective::parse(&raw) {
                Ok(d) => {
                    let timeout = opts.probe_timeout.unwrap_or(Duration::from_millis(500));
                    for r in probe_endpoints(&d, timeout) {
                        let label = if r.reachable {
                            status(use_err, true, "reachable")
                        } else {
                            status(use_err, false, "unreachable (compiles fall back to local)")
                        };
                        eprintln!("    {}:{}  {label}", r.host, r.port);
                    }
                }
                Err(e) => eprintln!(
                    "    {}",
                    status(use_err, false, &format!("cannot interpret directive: {e}"))
                ),
            }
        }
    }
    eprintln!();
    eprintln!("doctor: completed diagnostics.");
}
