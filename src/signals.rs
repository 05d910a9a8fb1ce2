//! Relay terminal signals to hooked process groups.
//!
//! A tree launched with a deadline runs in its own process group, so SIGINT,
//! SIGTERM and SIGHUP from the terminal reach only the launcher. While such a
//! tree is waited on, those signals are recorded and passed on to its group.

pub(crate) use imp::SignalRelay;

#[cfg(unix)]
mod imp {
    use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
    use std::sync::Mutex;

    use nix::sys::signal::{killpg, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use nix::unistd::Pid;
    use tracing::{debug, warn};

    const RELAYED: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

    static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);
    static RECEIVED: AtomicU64 = AtomicU64::new(0);

    struct Handlers {
        users: usize,
        previous: Vec<(Signal, SigAction)>,
    }

    // Handlers stay installed while any launch in this process is waiting.
    static HANDLERS: Mutex<Handlers> = Mutex::new(Handlers {
        users: 0,
        previous: Vec::new(),
    });

    extern "C" fn record(sig: i32) {
        LAST_SIGNAL.store(sig, Ordering::SeqCst);
        RECEIVED.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) struct SignalRelay {
        seen: u64,
    }

    impl SignalRelay {
        pub(crate) fn install() -> Self {
            let seen = RECEIVED.load(Ordering::SeqCst);
            let mut handlers = HANDLERS.lock().unwrap_or_else(|p| p.into_inner());
            if handlers.users == 0 {
                let act = SigAction::new(
                    SigHandler::Handler(record),
                    SaFlags::SA_RESTART,
                    SigSet::empty(),
                );
                for sig in RELAYED {
                    // SAFETY: `record` only stores to atomics.
                    match unsafe { sigaction(sig, &act) } {
                        // Signals the caller ignores (nohup) stay ignored.
                        Ok(prev) if prev.handler() == SigHandler::SigIgn => {
                            // SAFETY: restores the disposition just replaced.
                            let _ = unsafe { sigaction(sig, &prev) };
                        }
                        Ok(prev) => handlers.previous.push((sig, prev)),
                        Err(e) => warn!(signal = ?sig, error = %e, "cannot install relay handler"),
                    }
                }
            }
            handlers.users += 1;
            Self { seen }
        }

        /// Pass on a signal received since the last call to the group led by `pgid`.
        pub(crate) fn relay(&mut self, pgid: u32) {
            let received = RECEIVED.load(Ordering::SeqCst);
            if received == self.seen {
                return;
            }
            self.seen = received;
            let Ok(sig) = Signal::try_from(LAST_SIGNAL.load(Ordering::SeqCst)) else {
                return;
            };
            debug!(signal = ?sig, pgid, "relaying signal to hooked process group");
            if let Err(e) = killpg(Pid::from_raw(pgid as i32), sig) {
                warn!(signal = ?sig, pgid, error = %e, "signal relay failed");
            }
        }
    }

    impl Drop for SignalRelay {
        fn drop(&mut self) {
            let mut handlers = HANDLERS.lock().unwrap_or_else(|p| p.into_inner());
            handlers.users = handlers.users.saturating_sub(1);
            if handlers.users == 0 {
                for (sig, prev) in handlers.previous.drain(..) {
                    // SAFETY: restores the disposition saved by `install`.
                    let _ = unsafe { sigaction(sig, &prev) };
                }
            }
        }
    }

}

#[cfg(not(unix))]
mod imp {
    pub(crate) struct SignalRelay;

    impl SignalRelay {
        pub(crate) fn install() -> Self {
            SignalRelay
        }

        pub(crate) fn relay(&mut self, _pgid: u32) {}
    }
}
