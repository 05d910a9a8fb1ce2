use std::process::Command;

mod common;

fn bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_booster-hook"));
    cmd.env("NO_COLOR", "1")
        .env_remove("BOOSTER_HOOK_PRELOAD")
        .env_remove("BOOSTER_HOOK_CONFIG");
    cmd
}

#[cfg(target_os = "linux")]
#[test]
fn test_cli_dry_run_previews_injection_without_executing() {
    let td = tempfile::tempdir().expect("tmpdir");
    let lib = common::preload_library(td.path());
    let config = common::write_config(td.path());
    let marker = td.path().join("spawned");

    let out = bin()
        .arg("run")
        .arg("--preload")
        .arg(&lib)
        .arg("--config")
        .arg(&config)
        .args(["--farm-hosts", "--randomize 127.0.0.1:3632,lzo", "--dry-run", "--", "touch"])
        .arg(&marker)
        .output()
        .expect("failed to run booster-hook --dry-run");

    let err = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "dry-run failed: {:?}\n{err}", out.status.code());
    assert!(err.contains("booster-hook: run: LD_PRELOAD="), "stderr:\n{err}");
    assert!(err.contains("DISTCC_HOSTS='--randomize 127.0.0.1:3632,lzo'"), "stderr:\n{err}");
    assert!(!marker.exists(), "dry-run executed the command");
}

#[cfg(target_os = "linux")]
#[test]
fn test_cli_run_passes_child_exit_code_through() {
    let td = tempfile::tempdir().expect("tmpdir");
    let lib = common::preload_library(td.path());
    let config = common::write_config(td.path());

    let out = bin()
        .arg("run")
        .arg("--preload")
        .arg(&lib)
        .arg("--config")
        .arg(&config)
        .args(["--", "sh", "-c", "exit 5"])
        .output()
        .expect("run booster-hook");
    assert_eq!(out.status.code(), Some(5));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(!err.contains("failed:"), "child failure must not look like a hook failure:\n{err}");
}

#[test]
fn test_cli_missing_config_names_stage() {
    let td = tempfile::tempdir().expect("tmpdir");
    let lib = common::fake_shared_object(td.path());

    let out = bin()
        .arg("run")
        .arg("--preload")
        .arg(&lib)
        .arg("--config")
        .arg(td.path().join("absent.json"))
        .args(["--", "true"])
        .output()
        .expect("run booster-hook");
    assert_eq!(out.status.code(), Some(78));
    let err = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        err.lines().filter(|l| l.contains("config load failed")).count(),
        1,
        "stderr:\n{err}"
    );
}

#[test]
fn test_cli_run_without_preload_is_usage_error() {
    if option_env!("BOOSTER_HOOK_DEFAULT_PRELOAD").is_some() {
        eprintln!("skipping: build carries a default preload library");
        return;
    }
    let td = tempfile::tempdir().expect("tmpdir");
    let config = common::write_config(td.path());
    let out = bin()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .args(["--", "true"])
        .output()
        .expect("run booster-hook");
    assert_eq!(out.status.code(), Some(64));
}

#[test]
fn test_cli_check_config_json_round_trips() {
    let td = tempfile::tempdir().expect("tmpdir");
    let config = common::write_config(td.path());
    let out = bin()
        .arg("check-config")
        .arg(&config)
        .arg("--json")
        .output()
        .expect("run check-config");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(v["rules"][0]["name"], "cc");
    assert_eq!(v["rules"][0]["action"], "redirect");
    assert_eq!(v["fallback"], "local");
}

#[test]
fn test_cli_check_config_rejects_malformed() {
    let td = tempfile::tempdir().expect("tmpdir");
    let path = td.path().join("bad.json");
    std::fs::write(&path, "{").expect("write");
    let out = bin().arg("check-config").arg(&path).output().expect("run check-config");
    assert_eq!(out.status.code(), Some(78));
}
