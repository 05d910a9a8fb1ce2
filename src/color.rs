//! Terminal colour for the launcher's own stderr lines.
//!
//! Hooked processes inherit stderr untouched; only lines printed by
//! booster-hook itself (previews, diagnostics, doctor) are painted.

use clap::ValueEnum;
use once_cell::sync::OnceCell;

#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

/// What a painted line reports.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Tone {
    Info,
    Good,
    Bad,
}

impl Tone {
    fn ansi(self) -> &'static str {
        match self {
            Tone::Info => "\x1b[36;1m",
            Tone::Good => "\x1b[32;1m",
            Tone::Bad => "\x1b[31;1m",
        }
    }
}

static CLI_MODE: OnceCell<ColorMode> = OnceCell::new();

/// Record the `--color` flag; the first call wins.
pub fn set_color_mode(mode: ColorMode) {
    let _ = CLI_MODE.set(mode);
}

fn mode_from_env(value: &str) -> Option<ColorMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "auto" => Some(ColorMode::Auto),
        "always" | "on" | "1" => Some(ColorMode::Always),
        "never" | "off" | "0" => Some(ColorMode::Never),
        _ => None,
    }
}

// NO_COLOR (https://no-color.org/) beats --color, which beats BOOSTER_HOOK_COLOR.
fn decide(no_color: bool, cli: Option<ColorMode>, env: Option<ColorMode>, tty: bool) -> bool {
    if no_color {
        return false;
    }
    match cli.or(env).unwrap_or(ColorMode::Auto) {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => tty,
    }
}

pub fn color_enabled_stderr() -> bool {
    decide(
        std::env::var_os("NO_COLOR").is_some(),
        CLI_MODE.get().copied(),
        std::env::var("BOOSTER_HOOK_COLOR")
            .ok()
            .and_then(|v| mode_from_env(&v)),
        atty::is(atty::Stream::Stderr),
    )
}

pub fn paint(enabled: bool, tone: Tone, s: &str) -> String {
    if enabled {
        format!("{}{s}\x1b[0m", tone.ansi())
    } else {
        s.to_string()
    }
}

pub fn log_info_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, Tone::Info, msg));
}

pub fn log_error_stderr(use_color: bool, msg: &str) {
    eprintln!("{}", paint(use_color, Tone::Bad, msg));
}
