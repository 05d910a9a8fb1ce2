use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use booster_hook::color::{color_enabled_stderr, log_error_stderr, log_info_stderr};
use booster_hook::doctor::{run_doctor, DoctorOptions};
use booster_hook::{
    diagnostic_line, exit_code_for_hook_error, launch_prepared, load_config, platform_runtime,
    report, set_color_mode, telemetry, CommandLine, EnvSnapshot, EnvironmentOverlay, HookError,
    LaunchRequest, FARM_HOSTS_KEY,
};

mod cli;

use cli::{Cli, HookCmd, RunArgs};

const ENV_PRELOAD: &str = "BOOSTER_HOOK_PRELOAD";
const ENV_CONFIG: &str = "BOOSTER_HOOK_CONFIG";

/// Flag first, then the ambient environment, then an optional build-time default.
fn resolve_path(
    flag: Option<PathBuf>,
    ambient: &EnvSnapshot,
    key: &str,
    baked: Option<&str>,
) -> Option<PathBuf> {
    flag.or_else(|| {
        ambient
            .get_str(key)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    })
    .or_else(|| baked.map(PathBuf::from))
}

/// Process-wide state read once in `main`.
struct Ambient {
    env: EnvSnapshot,
    cwd: Option<PathBuf>,
}

fn build_request(args: &RunArgs, ambient: &Ambient) -> Result<LaunchRequest, HookError> {
    let preload = resolve_path(
        args.preload.clone(),
        &ambient.env,
        ENV_PRELOAD,
        option_env!("BOOSTER_HOOK_DEFAULT_PRELOAD"),
    )
    .ok_or_else(|| {
        HookError::InvalidRequest(format!(
            "no interception library given (use --preload or {ENV_PRELOAD})"
        ))
    })?;
    let config = resolve_path(args.config.clone(), &ambient.env, ENV_CONFIG, None)
        .ok_or_else(|| {
            HookError::InvalidRequest(format!(
                "no hook config given (use --config or {ENV_CONFIG})"
            ))
        })?;

    let mut overlay: EnvironmentOverlay = args.env.iter().cloned().collect();
    if let Some(hosts) = &args.farm_hosts {
        overlay.set(FARM_HOSTS_KEY, hosts.clone());
    }

    let command = if args.shell {
        CommandLine::shell(args.command.join(" "))
    } else {
        CommandLine::argv(args.command.iter())
    };

    let mut request =
        LaunchRequest::new(preload, config, command, ambient.env.clone()).overlay(overlay);
    if let Some(cwd) = args.cwd.as_ref().or(ambient.cwd.as_ref()) {
        request = request.cwd(cwd);
    }
    if let Some(t) = args.timeout {
        request = request.deadline(t);
    }
    Ok(request)
}

fn run(args: &RunArgs, ambient: &Ambient, verbose: u8) -> ExitCode {
    let use_err = color_enabled_stderr();
    let runtime = platform_runtime();

    let request = match build_request(args, ambient) {
        Ok(r) => r,
        Err(e) => return ExitCode::from(report(Err(e)).exit_code()),
    };

    let prepared = match request.prepare(runtime.as_ref()) {
        Ok(p) => p,
        Err(e) => return ExitCode::from(report(Err(e)).exit_code()),
    };
    if args.dry_run || verbose > 0 {
        let summary = prepared.config().summary();
        log_info_stderr(use_err, &format!("booster-hook: config: {summary}"));
        let preview = prepared.preview(&request);
        log_info_stderr(use_err, &format!("booster-hook: run: {preview}"));
    }
    if args.dry_run {
        log_info_stderr(use_err, "booster-hook: dry-run requested; not executing.");
        return ExitCode::SUCCESS;
    }

    let outcome = report(launch_prepared(&request, &prepared));
    ExitCode::from(outcome.exit_code())
}

fn check_config(path: &Path, json: bool) -> anyhow::Result<()> {
    let cfg = load_config(path)?;
    if json {
        let text =
            serde_json::to_string_pretty(&cfg).context("failed to render config as JSON")?;
        println!("{text}");
    } else {
        println!("{}: {}", path.display(), cfg.summary());
        for rule in &cfg.rules {
            println!("  {} ({}): {}", rule.name, rule.pattern, rule.action.kind());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Some(mode) = cli.color {
        set_color_mode(mode);
    }
    telemetry::init(cli.verbose);

    // Captured once; everything below receives it explicitly.
    let ambient = Ambient {
        env: EnvSnapshot::capture(),
        cwd: std::env::current_dir().ok(),
    };

    match &cli.command {
        HookCmd::Run(args) => run(args, &ambient, cli.verbose),
        HookCmd::CheckConfig { path, json } => match check_config(path, *json) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                let use_err = color_enabled_stderr();
                match e.downcast_ref::<HookError>() {
                    Some(he) => {
                        log_error_stderr(use_err, &diagnostic_line(he));
                        ExitCode::from(exit_code_for_hook_error(he))
                    }
                    None => {
                        log_error_stderr(use_err, &format!("booster-hook: {e:#}"));
                        ExitCode::from(1)
                    }
                }
            }
        },
        HookCmd::Doctor {
            preload,
            config,
            farm_hosts,
            probe_timeout,
        } => {
            let opts = DoctorOptions {
                preload: resolve_path(
                    preload.clone(),
                    &ambient.env,
                    ENV_PRELOAD,
                    option_env!("BOOSTER_HOOK_DEFAULT_PRELOAD"),
                ),
                config: resolve_path(config.clone(), &ambient.env, ENV_CONFIG, None),
                farm_hosts: farm_hosts.clone(),
                probe_timeout: *probe_timeout,
            };
            run_doctor(&opts, &ambient.env);
            ExitCode::SUCCESS
        }
    }
}
