//! Wall-clock budgets for code running on the interpreter thread.
//!
//! A watchdog thread waits on a cancel channel. If the budget expires first
//! it takes the GIL and schedules `HarnessTimeout` on the executing thread,
//! re-raising every [`REFIRE_INTERVAL`] until the execution is disarmed. The
//! exception derives from `BaseException`, so `except Exception:` in student
//! code does not swallow it, and any execution during which it fired is
//! reported as timed out no matter what the code did with it.

use std::os::raw::c_long;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use pyo3::create_exception;
use pyo3::exceptions::PyBaseException;
use pyo3::ffi;
use pyo3::prelude::*;

create_exception!(
    nbgrade,
    HarnessTimeout,
    PyBaseException,
    "Raised inside graded code when its time budget runs out."
);

pub(crate) const REFIRE_INTERVAL: Duration = Duration::from_millis(100);

/// Why a guarded call did not produce a value.
#[derive(Debug)]
pub(crate) enum Interrupted {
    /// The budget expired while the call was running.
    TimedOut,
    /// The call raised before the budget expired.
    Raised(PyErr),
}

struct Shared {
    armed: AtomicBool,
    fired: AtomicBool,
}

/// A running budget for the current thread.
pub(crate) struct Watchdog {
    shared: Arc<Shared>,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    thread_id: c_long,
}

impl Watchdog {
    /// Start timing the calling thread, which must hold the GIL.
    pub(crate) fn arm(py: Python<'_>, timeout: Duration) -> PyResult<Self> {
        let ident: u64 = PyModule::import(py, "threading")?
            .getattr("get_ident")?
            .call0()?
            .extract()?;
        let thread_id = ident as c_long;

        let shared = Arc::new(Shared {
            armed: AtomicBool::new(true),
            fired: AtomicBool::new(false),
        });
        let (cancel, cancel_rx) = mpsc::channel();
        let watched = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("nbgrade-watchdog".into())
            .spawn(move || watch(cancel_rx, timeout, watched, thread_id))?;

        Ok(Self {
            shared,
            cancel: Some(cancel),
            handle: Some(handle),
            thread_id,
        })
    }

    /// Stop timing and report whether the budget expired.
    ///
    /// Must be called right after the guarded code returns, before any other
    /// Python code runs on this thread.
    pub(crate) fn disarm(mut self, py: Python<'_>) -> bool {
        self.shared.armed.store(false, Ordering::SeqCst);
        let fired = self.shared.fired.load(Ordering::SeqCst);
        if fired {
            // Drop a timeout that was scheduled but not yet delivered.
            unsafe {
                ffi::PyThreadState_SetAsyncExc(self.thread_id, std::ptr::null_mut());
            }
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            // The watchdog may be waiting for the GIL; release it while joining.
            py.detach(move || {
                let _ = handle.join();
            });
        }
        fired
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.shared.armed.store(false, Ordering::SeqCst);
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

fn watch(cancel: Receiver<()>, timeout: Duration, shared: Arc<Shared>, thread_id: c_long) {
    let mut wait = timeout;
    loop {
        match cancel.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let keep_firing = Python::attach(|py| {
            if !shared.armed.load(Ordering::SeqCst) {
                return false;
            }
            if !shared.fired.swap(true, Ordering::SeqCst) {
                tracing::debug!(timeout_ms = timeout.as_millis() as u64, "time budget expired");
            }
            let exc = py.get_type::<HarnessTimeout>();
            unsafe {
                ffi::PyThreadState_SetAsyncExc(thread_id, exc.as_ptr());
            }
            true
        });
        if !keep_firing {
            return;
        }
        wait = REFIRE_INTERVAL;
    }
}

/// Run `f` on the current thread, interrupting it once `timeout` elapses.
///
/// With no timeout `f` simply runs to completion.
pub(crate) fn run_guarded<T>(
    py: Python<'_>,
    timeout: Option<Duration>,
    f: impl FnOnce() -> PyResult<T>,
) -> Result<T, Interrupted> {
    let Some(timeout) = timeout else {
        return f().map_err(Interrupted::Raised);
    };

    let watchdog = Watchdog::arm(py, timeout).map_err(Interrupted::Raised)?;
    let result = f();
    if watchdog.disarm(py) {
        return Err(Interrupted::TimedOut);
    }
    result.map_err(Interrupted::Raised)
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::time::Instant;

    use super::*;

    fn run_source(py: Python<'_>, src: &str) -> PyResult<()> {
        let code = CString::new(src).unwrap();
        py.run(&code, None, None)
    }

    #[test]
    fn fast_code_is_not_interrupted() {
        Python::attach(|py| {
            let out = run_guarded(py, Some(Duration::from_secs(5)), || {
                run_source(py, "x = sum(range(1000))")
            });
            assert!(out.is_ok());
        });
    }

    #[test]
    fn infinite_loop_times_out() {
        Python::attach(|py| {
            let start = Instant::now();
            let out = run_guarded(py, Some(Duration::from_millis(300)), || {
                run_source(py, "while True:\n    pass\n")
            });
            assert!(matches!(out, Err(Interrupted::TimedOut)));
            assert!(start.elapsed() < Duration::from_secs(10));
        });
    }

    #[test]
    fn catching_exception_does_not_escape_budget() {
        Python::attach(|py| {
            let src = "while True:\n    try:\n        while True:\n            pass\n    except Exception:\n        pass\n";
            let out = run_guarded(py, Some(Duration::from_millis(300)), || run_source(py, src));
            assert!(matches!(out, Err(Interrupted::TimedOut)));
        });
    }

    #[test]
    fn ordinary_errors_are_raised() {
        Python::attach(|py| {
            let out = run_guarded(py, Some(Duration::from_secs(5)), || {
                run_source(py, "raise ValueError('bad')")
            });
            match out {
                Err(Interrupted::Raised(err)) => {
                    assert!(err.is_instance_of::<pyo3::exceptions::PyValueError>(py))
                }
                other => panic!("unexpected: {other:?}"),
            }
        });
    }

    #[test]
    fn no_timeout_runs_directly() {
        Python::attach(|py| {
            let out = run_guarded(py, None, || Ok(7));
            assert_eq!(out.unwrap(), 7);
        });
    }

    #[test]
    fn thread_is_usable_after_timeout() {
        Python::attach(|py| {
            let out = run_guarded(py, Some(Duration::from_millis(200)), || {
                run_source(py, "while True:\n    pass\n")
            });
            assert!(matches!(out, Err(Interrupted::TimedOut)));
            // No stray timeout may be left pending for the next statement.
            assert!(run_source(py, "y = [i * i for i in range(100000)]").is_ok());
        });
    }
}
