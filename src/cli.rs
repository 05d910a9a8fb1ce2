use std::path::PathBuf;
use std::time::Duration;

use booster_hook::ColorMode;
use clap::{ArgAction, Args, Parser, Subcommand};

/// Parse a repeatable `--env KEY=VALUE` flag.
fn parse_env_kv(s: &str) -> Result<(String, String), String> {
    booster_hook::parse_assignment(s)
}

/// Accept humantime durations ("90s", "15m") or plain seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let t = s.trim();
    if let Ok(secs) = t.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(t).map_err(|e| format!("invalid duration {t:?}: {e}"))
}

#[derive(Parser, Debug)]
#[command(
    name = "booster-hook",
    version,
    about = "Run a build command with the interception library pre-loaded into every process \
             it spawns."
)]
pub(crate) struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Colorize diagnostics: auto|always|never
    #[arg(long = "color", value_enum, global = true)]
    pub(crate) color: Option<ColorMode>,

    #[command(subcommand)]
    pub(crate) command: HookCmd,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum HookCmd {
    /// Launch a command under the hook and exit with its status
    Run(RunArgs),

    /// Load and validate a hook config file
    CheckConfig {
        /// Path to the JSON hook config
        path: PathBuf,
        /// Print the normalized config as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the injection mechanism, check inputs and probe farm hosts
    Doctor {
        /// Interception library to check (defaults to BOOSTER_HOOK_PRELOAD)
        #[arg(long)]
        preload: Option<PathBuf>,
        /// Hook config to check (defaults to BOOSTER_HOOK_CONFIG)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Compile-farm host directive to probe (defaults to DISTCC_HOSTS)
        #[arg(long = "farm-hosts")]
        farm_hosts: Option<String>,
        /// Connect timeout per farm endpoint
        #[arg(long = "probe-timeout", value_parser = parse_timeout)]
        probe_timeout: Option<Duration>,
    },
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Interception library to pre-load (defaults to BOOSTER_HOOK_PRELOAD)
    #[arg(long)]
    pub(crate) preload: Option<PathBuf>,

    /// Hook config read by every hooked process (defaults to BOOSTER_HOOK_CONFIG)
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// Extra environment for the launched tree (repeatable)
    #[arg(short = 'e', long = "env", value_name = "KEY=VALUE", value_parser = parse_env_kv)]
    pub(crate) env: Vec<(String, String)>,

    /// Compile-farm host directive, e.g. "--randomize 10.0.0.5:3632,lzo"
    #[arg(long = "farm-hosts", allow_hyphen_values = true)]
    pub(crate) farm_hosts: Option<String>,

    /// Kill the launched tree after this long (e.g. 90s, 30m)
    #[arg(long, value_parser = parse_timeout)]
    pub(crate) timeout: Option<Duration>,

    /// Working directory for the command
    #[arg(long)]
    pub(crate) cwd: Option<PathBuf>,

    /// Treat the command words as one /bin/sh command string
    #[arg(long)]
    pub(crate) shell: bool,

    /// Validate everything and print what would run, but do not execute
    #[arg(long = "dry-run")]
    pub(crate) dry_run: bool,

    /// Command to run
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub(crate) command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout_forms() {
        assert_eq!(parse_timeout("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_timeout("2m").unwrap(), Duration::from_secs(120));
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn test_run_args_collect_trailing_command() {
        let cli = Cli::try_parse_from([
            "booster-hook",
            "run",
            "--preload",
            "/h.so",
            "-e",
            "CC=gcc",
            "--farm-hosts",
            "--randomize 127.0.0.1:3632,lzo",
            "--",
            "make",
            "-j8",
        ])
        .expect("parse");
        match cli.command {
            HookCmd::Run(args) => {
                assert_eq!(args.command, vec!["make".to_string(), "-j8".to_string()]);
                assert_eq!(args.env, vec![("CC".to_string(), "gcc".to_string())]);
                assert_eq!(args.farm_hosts.as_deref(), Some("--randomize 127.0.0.1:3632,lzo"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["booster-hook", "run", "--preload", "/h.so"]).is_err());
    }
}
