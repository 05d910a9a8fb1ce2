#![allow(clippy::module_name_repetitions)]
//! Ambient environment capture and caller overrides.
//!
//! The ambient environment is read once into an `EnvSnapshot` at the entry point
//! and threaded explicitly; nothing below this module calls `std::env::var`.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

use tracing::debug;

/// Overlay key carrying the compile-farm host directive. Opaque to the launcher.
pub const FARM_HOSTS_KEY: &str = "DISTCC_HOSTS";

/// Immutable copy of a process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<OsString, OsString>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars.get(key.as_ref()).map(OsString::as_os_str)
    }

    /// Lossy UTF-8 lookup for diagnostics.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string_lossy().into_owned())
    }

    pub fn contains(&self, key: impl AsRef<OsStr>) -> bool {
        self.vars.contains_key(key.as_ref())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub(crate) fn set(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }
}

/// Caller-supplied environment overrides for the launched tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvironmentOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Set the compile-farm host directive, e.g. `--randomize 127.0.0.1:3632,lzo`.
    pub fn with_farm_hosts(self, directive: impl Into<String>) -> Self {
        self.with(FARM_HOSTS_KEY, directive)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn farm_hosts(&self) -> Option<&str> {
        self.get(FARM_HOSTS_KEY)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Reject keys and values the OS cannot carry in an environment block.
    pub fn validate(&self) -> Result<(), String> {
        for (k, v) in &self.vars {
            validate_key(k)?;
            if v.contains('\0') {
                return Err(format!("environment value for {k} contains NUL"));
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentOverlay {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("environment key is empty".to_string());
    }
    if key.contains('=') || key.contains('\0') {
        return Err(format!("environment key {key:?} contains '=' or NUL"));
    }
    Ok(())
}

/// Parse a `KEY=VALUE` assignment (value may be empty or contain '=').
pub fn parse_assignment(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    validate_key(k)?;
    Ok((k.to_string(), v.to_string()))
}

/// Merge `overlay` on top of `base`. Overlay wins on collision; `base` is untouched.
pub fn merge(base: &EnvSnapshot, overlay: &EnvironmentOverlay) -> EnvSnapshot {
    let mut merged = base.clone();
    for (k, v) in overlay.iter() {
        if base.get(k).is_some_and(|old| old != OsStr::new(v)) {
            debug!(key = k, "overlay overrides ambient value");
        }
        merged.set(k, v);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_wins_and_base_passes_through() {
        let base = EnvSnapshot::from_pairs([("PATH", "/usr/bin"), ("CC", "gcc")]);
        let overlay = EnvironmentOverlay::new().with("CC", "clang").with("NEW", "1");
        let merged = merge(&base, &overlay);
        assert_eq!(merged.get("CC"), Some(OsStr::new("clang")));
        assert_eq!(merged.get("PATH"), Some(OsStr::new("/usr/bin")));
        assert_eq!(merged.get("NEW"), Some(OsStr::new("1")));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let base = EnvSnapshot::from_pairs([("A", "1"), ("B", "2")]);
        let overlay: EnvironmentOverlay = [("B", "3"), ("C", "4")].into_iter().collect();
        assert_eq!(merge(&base, &overlay), merge(&base, &overlay));
    }

    #[test]
    fn test_farm_hosts_value_is_opaque() {
        let overlay = EnvironmentOverlay::new().with_farm_hosts("--randomize 127.0.0.1:3632,lzo");
        let merged = merge(&EnvSnapshot::default(), &overlay);
        assert_eq!(
            merged.get_str(FARM_HOSTS_KEY).as_deref(),
            Some("--randomize 127.0.0.1:3632,lzo")
        );
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("CFLAGS=-O2 -DX=1").unwrap(),
            ("CFLAGS".to_string(), "-O2 -DX=1".to_string())
        );
        assert_eq!(parse_assignment("EMPTY=").unwrap().1, "");
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_keys() {
        assert!(EnvironmentOverlay::new().with("A=B", "1").validate().is_err());
        assert!(EnvironmentOverlay::new().with("", "1").validate().is_err());
        assert!(EnvironmentOverlay::new().with("OK", "a\0b").validate().is_err());
        assert!(EnvironmentOverlay::new().with("OK", "fine").validate().is_ok());
    }
}
