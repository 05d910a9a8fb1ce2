//! Structured logging setup.
//!
//! Filter precedence: BOOSTER_HOOK_LOG, then RUST_LOG, then the CLI verbosity.
//! Output goes to stderr so the hooked command's stdout stays clean.

use std::env;

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Default directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn filter_from_env(verbosity: u8) -> EnvFilter {
    let from_env = ["BOOSTER_HOOK_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|k| env::var(k).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty());
    match from_env {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|e| {
            eprintln!("booster-hook: ignoring invalid log filter {directive:?}: {e}");
            EnvFilter::new(default_directive(verbosity))
        }),
        None => EnvFilter::new(default_directive(verbosity)),
    }
}

/// Install the global subscriber once; later calls are no-ops.
pub fn init(verbosity: u8) {
    INIT.get_or_init(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter_from_env(verbosity))
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("booster-hook: logging init skipped (global subscriber already set)");
        }
    });
}
