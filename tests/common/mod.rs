#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

/// Minimal ELF64 little-endian header with e_type = ET_DYN.
pub fn fake_shared_object(dir: &Path) -> PathBuf {
    let mut h = vec![0u8; 64];
    h[..4].copy_from_slice(b"\x7fELF");
    h[4] = 2;
    h[5] = 1;
    h[6] = 1;
    h[16..18].copy_from_slice(&3u16.to_le_bytes());
    let p = dir.join("hook.so");
    let mut f = fs::File::create(&p).expect("create fake hook.so");
    f.write_all(&h).expect("write fake hook.so");
    p
}

/// The libc mapped into this test process, if any; preloading it is harmless.
fn loaded_libc() -> Option<PathBuf> {
    let maps = fs::read_to_string("/proc/self/maps").ok()?;
    maps.lines()
        .filter_map(|l| l.split_whitespace().nth(5))
        .find(|p| {
            Path::new(p)
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| {
                    n.starts_with("libc.so") || n.starts_with("libc-") || n.starts_with("ld-musl")
                })
        })
        .map(PathBuf::from)
}

/// A shared object the loader can actually pre-load, falling back to a header-only fake
/// (the loader then prints a warning and continues).
pub fn preload_library(dir: &Path) -> PathBuf {
    loaded_libc().unwrap_or_else(|| fake_shared_object(dir))
}

pub const REPRESENTATIVE_CONFIG: &str = r#"{
    "rules": [
        {"name": "cc", "pattern": "gcc", "action": "redirect", "target": "distcc gcc"},
        {"name": "cxx", "pattern": "g++", "action": "redirect", "target": "distcc g++"},
        {"name": "ld", "pattern": "ld", "action": "pass_through"}
    ],
    "log": {"level": "info"},
    "fallback": "local"
}"#;

pub fn write_config(dir: &Path) -> PathBuf {
    let p = dir.join("config_file.json");
    fs::write(&p, REPRESENTATIVE_CONFIG).expect("write config");
    p
}

/// A TCP port on 127.0.0.1 with nothing listening.
pub fn closed_local_port() -> u16 {
    let l = TcpListener::bind("127.0.0.1:0").expect("bind");
    l.local_addr().expect("addr").port()
}

/// Parse `env` output written by a hooked process.
pub fn read_env_dump(path: &Path) -> BTreeMap<String, String> {
    let text = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("env dump {} missing: {e}", path.display()));
    text.lines()
        .filter_map(|l| l.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn first_preload_entry(env: &BTreeMap<String, String>) -> Option<PathBuf> {
    env.get("LD_PRELOAD")
        .and_then(|v| v.split(':').next().map(PathBuf::from))
}
