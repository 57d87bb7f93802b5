/// Ctrl+C wiring for in-flight queries.
///
/// While a query is active the process-wide [`CancelToken`] is flipped by a
/// SIGINT handler, which also sends SIGTERM to the child's process group.
/// Outside a query Ctrl+C keeps its default meaning and ends the process.

use std::sync::atomic::Ordering;

use super::agent::CancelToken;

static INTERRUPT: CancelToken = CancelToken::new();

/// The token the SIGINT handler trips.
pub fn token() -> &'static CancelToken {
    &INTERRUPT
}

#[cfg(unix)]
extern "C" fn on_sigint(signum: libc::c_int) {
    // Only atomics, signal(2), raise(3) and kill(2) here: all async-signal-safe
    if !INTERRUPT.is_active() {
        #[allow(unsafe_code)]
        unsafe {
            libc::signal(signum, libc::SIG_DFL);
            libc::raise(signum);
        }
        return;
    }
    INTERRUPT.cancel();
    let pid = INTERRUPT.child_pid.load(Ordering::SeqCst);
    if pid != 0 {
        #[allow(unsafe_code)]
        unsafe { libc::kill(-(pid as libc::pid_t), libc::SIGTERM); }
    }
}

/// Install the SIGINT handler. Returns `false` if the OS refused it.
#[cfg(unix)]
pub fn install() -> bool {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    #[allow(unsafe_code)]
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    previous != libc::SIG_ERR
}

#[cfg(not(unix))]
pub fn install() -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_handler_sets_flag_and_signals_child_group() {
        use std::os::unix::process::CommandExt;

        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .expect("spawn sleep");
        INTERRUPT.reset();
        INTERRUPT.set_active(true);
        INTERRUPT.child_pid.store(child.id(), Ordering::SeqCst);

        on_sigint(libc::SIGINT);

        assert!(token().is_cancelled());
        let status = child.wait().expect("wait");
        assert!(!status.success());

        token().reset();
        token().set_active(false);
        assert!(!token().is_cancelled());
    }
}
