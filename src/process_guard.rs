//! Lifecycle management for the pipeline runner process.
//!
//! The runner is spawned as the leader of its own process group with a
//! parent-death signal, and its PID is tracked in a global registry while it
//! runs. When the task receives SIGINT, SIGTERM or SIGHUP the signal thread
//! terminates every tracked group (SIGTERM, grace period, SIGKILL) but does
//! not exit. The driver sees the runner die, finishes its log upload, and the
//! binary exits with `128 + signal` afterwards. A second signal exits
//! immediately.

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// First termination signal received by this process, 0 if none
static RECEIVED_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Registry tracking spawned runner processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    pids: HashSet<u32>,
    /// Set once termination has started; later registrations are killed on sight
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a child process group leader
    pub fn register(&mut self, pid: u32) {
        if self.cleanup_initiated {
            warn!("Child {} spawned after shutdown began, terminating it", pid);
            if send_signal_to_group(pid, Signal::SIGTERM).is_err() {
                let _ = send_signal(pid, Signal::SIGTERM);
            }
        }
        self.pids.insert(pid);
        debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        debug!("Unregistered child process PID {}", pid);
    }

    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked process groups.
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL.
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            debug!("No child processes to terminate");
            return;
        }

        info!("Terminating {} child process group(s)...", self.pids.len());

        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            if let Err(e) = send_signal_to_group(pid, Signal::SIGTERM) {
                warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
                if let Err(e2) = send_signal(pid, Signal::SIGTERM) {
                    warn!("Failed to send SIGTERM to PID {}: {}", pid, e2);
                }
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if !pids_to_kill.iter().any(|&pid| is_process_alive(pid)) {
                info!("All child processes terminated gracefully");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                warn!("Process group {} did not terminate, sending SIGKILL", pid);
                if let Err(e) = send_signal_to_group(pid, Signal::SIGKILL) {
                    error!("Failed to send SIGKILL to process group {}: {}", pid, e);
                    let _ = send_signal(pid, Signal::SIGKILL);
                }
            }
        }

        self.pids.clear();
        info!("Child process cleanup complete");
    }
}

fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Negative PID addresses the whole group, so the runner's own children
/// (executors, container clients) receive the signal too
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/<pid>/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// Keeps a child registered in the global registry for as long as it lives
pub struct ChildGuard {
    pid: u32,
}

impl ChildGuard {
    pub fn register(pid: u32) -> Self {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }
        Self { pid }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(self.pid);
        }
    }
}

/// The first termination signal this process received, if any
pub fn received_signal() -> Option<i32> {
    match RECEIVED_SIGNAL.load(Ordering::SeqCst) {
        0 => None,
        sig => Some(sig),
    }
}

/// Record `sig` as the termination signal. Returns false if one was
/// already recorded.
pub(crate) fn record_signal(sig: i32) -> bool {
    RECEIVED_SIGNAL
        .compare_exchange(0, sig, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP.
/// Call this once at program start.
pub fn init_signal_handlers(grace_period: Duration) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            if !record_signal(sig) {
                warn!("Received {} during shutdown, exiting now", signal_name);
                std::process::exit(128 + sig);
            }

            info!("Received {} signal, stopping the pipeline runner...", signal_name);
            if let Ok(mut registry) = ChildRegistry::global().lock() {
                registry.terminate_all(grace_period);
            }
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Run the command as leader of a new process group that dies with us
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the closure only calls async-signal-safe functions
        unsafe {
            self.pre_exec(|| {
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}

/// Helpers for tests that depend on the process-wide signal state
#[cfg(test)]
pub(crate) mod test_signals {
    use super::{Ordering, RECEIVED_SIGNAL, record_signal};
    use std::path::PathBuf;
    use std::sync::{Mutex, MutexGuard};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    static SIGNAL_STATE: Mutex<()> = Mutex::new(());

    /// Exclusive access to the recorded signal; cleared on acquire and drop
    pub(crate) struct SignalStateLock {
        _guard: MutexGuard<'static, ()>,
    }

    impl SignalStateLock {
        pub(crate) fn acquire() -> Self {
            let guard = SIGNAL_STATE.lock().unwrap_or_else(|e| e.into_inner());
            RECEIVED_SIGNAL.store(0, Ordering::SeqCst);
            Self { _guard: guard }
        }
    }

    impl Drop for SignalStateLock {
        fn drop(&mut self) {
            RECEIVED_SIGNAL.store(0, Ordering::SeqCst);
        }
    }

    /// Once `started` exists, record `sig` and create `ack`
    pub(crate) fn deliver_when(started: PathBuf, ack: PathBuf, sig: i32) -> JoinHandle<()> {
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !started.exists() {
                if Instant::now() > deadline {
                    return;
                }
                thread::sleep(Duration::from_millis(20));
            }
            record_signal(sig);
            std::fs::write(&ack, "").unwrap();
        })
    }

    /// Shell snippet that marks itself started, waits for the ack, then
    /// exits the way a SIGTERM'd runner does
    pub(crate) const INTERRUPTIBLE_SCRIPT: &str = "touch started
i=0
while [ ! -f signalled ] && [ $i -lt 100 ]; do sleep 0.1; i=$((i+1)); done
exit 143";
}
