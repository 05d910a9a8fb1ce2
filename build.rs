use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=BOOSTER_HOOK_DEFAULT_PRELOAD");
    println!("cargo:rerun-if-env-changed=BOOSTER_HOOK_DEFAULT_PRELOAD_FILE");

    // Optional: bake in a default interception library path for packaged installs.
    // Priority:
    //   1) BOOSTER_HOOK_DEFAULT_PRELOAD_FILE: first non-empty line = library path
    //   2) BOOSTER_HOOK_DEFAULT_PRELOAD (env value)
    let baked = std::env::var("BOOSTER_HOOK_DEFAULT_PRELOAD_FILE")
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|contents| {
            contents
                .lines()
                .map(|l| l.trim().to_string())
                .find(|l| !l.is_empty())
        })
        .or_else(|| {
            std::env::var("BOOSTER_HOOK_DEFAULT_PRELOAD")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        });
    if let Some(path) = baked {
        println!("cargo:rustc-env=BOOSTER_HOOK_DEFAULT_PRELOAD={path}");
    }

    // Build date (UTC ISO-8601). Fallback to unix:<secs> if `date` is unavailable.
    let build_date = Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .ok()
        .and_then(|o| {
            if o.status.success() {
                Some(String::from_utf8_lossy(&o.stdout).trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| std::time::Duration::from_secs(0))
                .as_secs();
            format!("unix:{secs}")
        });
    println!("cargo:rustc-env=BOOSTER_HOOK_BUILD_DATE={build_date}");

    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BOOSTER_HOOK_BUILD_TARGET={target}");
}
