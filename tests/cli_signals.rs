#![cfg(target_os = "linux")]

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use wait_timeout::ChildExt;

mod common;

#[test]
fn test_interrupt_stops_hooked_tree_with_and_without_deadline() {
    for timeout in [None, Some("60")] {
        let td = tempfile::tempdir().expect("tmpdir");
        let lib = common::preload_library(td.path());
        let config = common::write_config(td.path());
        let marker = td.path().join("finished");

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_booster-hook"));
        cmd.arg("run")
            .arg("--preload")
            .arg(&lib)
            .arg("--config")
            .arg(&config);
        if let Some(t) = timeout {
            cmd.args(["--timeout", t]);
        }
        // Stand-in for the terminal's foreground group.
        let mut launcher = cmd
            .args(["--", "sh", "-c", "sleep 2; touch \"$1\"", "sh"])
            .arg(&marker)
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .expect("failed to start booster-hook");

        thread::sleep(Duration::from_millis(500));
        killpg(Pid::from_raw(launcher.id() as i32), Signal::SIGINT).expect("send SIGINT");

        let status = launcher
            .wait_timeout(Duration::from_secs(10))
            .expect("wait for booster-hook")
            .unwrap_or_else(|| {
                let _ = launcher.kill();
                panic!("booster-hook kept running after SIGINT (timeout {timeout:?})")
            });
        if timeout.is_some() {
            assert_eq!(status.code(), Some(130), "interrupted tree should report 128+SIGINT");
        }

        thread::sleep(Duration::from_millis(2500));
        assert!(
            !marker.exists(),
            "hooked tree survived SIGINT to the launcher's group (timeout {timeout:?})"
        );
    }
}
