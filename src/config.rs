#![allow(clippy::module_name_repetitions)]
//! Hook config loading and structural validation.
//!
//! The launcher never interprets rules; it only guarantees that the file every
//! hooked process will read is present and well-formed before anything is spawned.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::HookError;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Logging settings consumed by the injected side.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// What the injected side does when no rule matches or no farm endpoint answers.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Run the original invocation locally and unmodified.
    #[default]
    Local,
    /// Refuse the invocation; only useful when diagnosing a farm setup.
    Fail,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::Local => "local",
            FallbackPolicy::Fail => "fail",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleAction {
    PassThrough,
    Redirect {
        target: String,
    },
    RewriteArguments {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        prepend: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        append: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        remove: Vec<String>,
    },
}

impl RuleAction {
    pub fn kind(&self) -> &'static str {
        match self {
            RuleAction::PassThrough => "pass_through",
            RuleAction::Redirect { .. } => "redirect",
            RuleAction::RewriteArguments { .. } => "rewrite_arguments",
        }
    }
}

/// One interception rule: executable pattern mapped to an action.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HookRule {
    pub name: String,
    pub pattern: String,
    #[serde(flatten)]
    pub action: RuleAction,
}

/// Validated, immutable hook configuration.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct HookConfig {
    pub rules: Vec<HookRule>,
    pub log: LogSettings,
    pub fallback: FallbackPolicy,
}

impl HookConfig {
    pub fn rule(&self, name: &str) -> Option<&HookRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// One-line description for logs and `check-config`.
    pub fn summary(&self) -> String {
        let count = |kind: &str| self.rules.iter().filter(|r| r.action.kind() == kind).count();
        format!(
            "{} rule(s) ({} redirect, {} rewrite_arguments, {} pass_through); fallback={}; log={}",
            self.rules.len(),
            count("redirect"),
            count("rewrite_arguments"),
            count("pass_through"),
            self.fallback.as_str(),
            self.log.level.as_str()
        )
    }
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(default)]
    name: Option<String>,
    pattern: String,
    #[serde(flatten)]
    action: RuleAction,
}

// Older configs list plain command substitutions.
#[derive(Deserialize)]
struct LegacyHook {
    src_command: String,
    target_command: String,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    rules: Option<Vec<RawRule>>,
    #[serde(default)]
    hooks: Option<Vec<LegacyHook>>,
    #[serde(default)]
    log: LogSettings,
    #[serde(default)]
    fallback: FallbackPolicy,
}

/// Read and validate the hook config at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<HookConfig, HookError> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(HookError::malformed(path, "content is not valid UTF-8"));
        }
        Err(source) => {
            return Err(HookError::ConfigNotFound {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config = parse_config(path, &text)?;
    debug!(path = %path.display(), summary = %config.summary(), "hook config loaded");
    Ok(config)
}

// Names and patterns are compared verbatim by the injected side, so
// surrounding whitespace would silently never match.
fn exact_field(path: &Path, field: &str, value: String) -> Result<String, HookError> {
    if value.trim().is_empty() {
        return Err(HookError::malformed(path, format!("{field} is empty")));
    }
    if value.trim() != value {
        return Err(HookError::malformed(
            path,
            format!("{field} {value:?} has leading or trailing whitespace"),
        ));
    }
    Ok(value)
}

/// Validate config text; `path` is only used for diagnostics.
pub fn parse_config(path: &Path, text: &str) -> Result<HookConfig, HookError> {
    let raw: RawConfig =
        serde_json::from_str(text).map_err(|e| HookError::malformed(path, e.to_string()))?;

    if raw.rules.is_none() && raw.hooks.is_none() {
        return Err(HookError::malformed(path, "missing field `rules`"));
    }

    let mut rules: Vec<HookRule> = Vec::new();
    for (i, r) in raw.rules.unwrap_or_default().into_iter().enumerate() {
        let pattern = exact_field(path, &format!("rules[{i}].pattern"), r.pattern)?;
        if let RuleAction::Redirect { target } = &r.action {
            if target.trim().is_empty() {
                return Err(HookError::malformed(
                    path,
                    format!("rules[{i}]: redirect target is empty"),
                ));
            }
        }
        let name = match r.name {
            Some(n) => exact_field(path, &format!("rules[{i}].name"), n)?,
            None => pattern.clone(),
        };
        rules.push(HookRule {
            name,
            pattern,
            action: r.action,
        });
    }

    for (i, h) in raw.hooks.unwrap_or_default().into_iter().enumerate() {
        let src = exact_field(path, &format!("hooks[{i}].src_command"), h.src_command)?;
        let target = h.target_command;
        if target.trim().is_empty() {
            return Err(HookError::malformed(
                path,
                format!("hooks[{i}].target_command is empty"),
            ));
        }
        rules.push(HookRule {
            name: src.clone(),
            pattern: src,
            action: RuleAction::Redirect { target },
        });
    }

    {
        let mut seen = BTreeSet::new();
        for r in &rules {
            if !seen.insert(r.name.as_str()) {
                return Err(HookError::malformed(
                    path,
                    format!("duplicate rule name '{}'", r.name),
                ));
            }
        }
    }

    Ok(HookConfig {
        rules,
        log: raw.log,
        fallback: raw.fallback,
    })
}
