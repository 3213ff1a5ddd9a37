//! Failure containment.
//!
//! [`FailureContainment::run_envelope`] wraps the top-level run. Anything
//! escaping it, a returned exception or a panic, is critical: hooks and
//! subscriptions are frozen, the active hooks logged, a crash report written
//! and the caller told to terminate. Panics on other threads reach the
//! process-wide panic hook and are logged as `UNHANDLED`.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use everhook_core::Kernel;
use everhook_il::Exception;

use crate::crash::{CrashReport, EnvironmentInfo};

/// Set to `1` to suppress interactive crash presentation.
pub const HEADLESS_ENV: &str = "EVERHOOK_HEADLESS";

/// Exit status after a critical failure.
pub const CRITICAL_EXIT_CODE: i32 = -1;

thread_local! {
    static LAST_PANIC: RefCell<Option<Exception>> = const { RefCell::new(None) };
}

/// Whether [`HEADLESS_ENV`] is set to `1`.
pub fn headless_from_env() -> bool {
    std::env::var(HEADLESS_ENV).is_ok_and(|v| v.trim() == "1")
}

/// What the caller should do once the envelope returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    Terminate { code: i32 },
}

impl Disposition {
    pub fn exit_code(self) -> i32 {
        match self {
            Disposition::Completed => 0,
            Disposition::Terminate { code } => code,
        }
    }
}

/// Result of reporting a failure outside the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhandledOutcome {
    /// Logged, execution goes on.
    Continue,
    /// A critical failure is already being handled; only the report was
    /// ensured.
    AlreadyTerminating,
}

/// The single fatal capture point.
pub struct FailureContainment {
    kernel: Arc<Kernel>,
    report_path: PathBuf,
    environment: EnvironmentInfo,
    terminating: AtomicBool,
    envelope_thread: Mutex<Option<ThreadId>>,
    written: Mutex<Option<PathBuf>>,
}

impl FailureContainment {
    pub fn new(kernel: Arc<Kernel>, report_path: PathBuf, environment: EnvironmentInfo) -> Self {
        Self {
            kernel,
            report_path,
            environment,
            terminating: AtomicBool::new(false),
            envelope_thread: Mutex::new(None),
            written: Mutex::new(None),
        }
    }

    pub fn headless(&self) -> bool {
        self.environment.headless
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// The crash report written so far, if any.
    pub fn written_report(&self) -> Option<PathBuf> {
        self.written.lock().clone()
    }

    pub fn report_path(&self) -> &Path {
        &self.report_path
    }

    /// Replace the process panic hook. The hook holds a weak reference, so
    /// it goes quiet once the containment is dropped.
    pub fn install_panic_hook(self: &Arc<Self>) {
        let containment: Weak<Self> = Arc::downgrade(self);
        panic::set_hook(Box::new(move |info| {
            let mut exception = Exception::from_panic(info.payload());
            if let Some(location) = info.location() {
                exception.push_frame(format!(
                    "{}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                ));
            }
            match containment.upgrade() {
                Some(c) => c.on_panic(exception),
                None => eprintln!("panic: {exception}"),
            }
        }));
        debug!("Panic hook installed");
    }

    fn on_envelope_thread(&self) -> bool {
        *self.envelope_thread.lock() == Some(thread::current().id())
    }

    /// Panics on the envelope thread are either caught by a module boundary
    /// or reach the envelope; keep the located exception for the latter.
    fn on_panic(&self, exception: Exception) {
        if self.on_envelope_thread() {
            debug!("Panic on the envelope thread: {}", exception);
            LAST_PANIC.with(|p| *p.borrow_mut() = Some(exception));
            return;
        }
        self.on_unhandled(&exception);
    }

    /// Run `f`, treating anything that escapes it as critical.
    pub fn run_envelope<F>(&self, f: F) -> Disposition
    where
        F: FnOnce() -> Result<(), Exception>,
    {
        *self.envelope_thread.lock() = Some(thread::current().id());
        LAST_PANIC.with(|p| p.borrow_mut().take());
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        *self.envelope_thread.lock() = None;

        let exception = match outcome {
            Ok(Ok(())) => return Disposition::Completed,
            Ok(Err(e)) => e,
            Err(payload) => LAST_PANIC
                .with(|p| p.borrow_mut().take())
                .unwrap_or_else(|| Exception::from_panic(&*payload)),
        };

        self.critical(&exception);
        Disposition::Terminate {
            code: CRITICAL_EXIT_CODE,
        }
    }

    /// Handle a fatal failure. Returns the crash report location when it
    /// could be written.
    pub fn critical(&self, exception: &Exception) -> Option<PathBuf> {
        self.terminating.store(true, Ordering::SeqCst);
        self.kernel.freeze();
        self.kernel.hooks().log_active_hooks();
        log_chain("CRITICAL", exception);

        let path = self.ensure_report(exception)?;
        if self.headless() {
            info!("Crash report written to {}", path.display());
        } else {
            eprintln!("everhook crashed. Crash report: {}", path.display());
        }
        Some(path)
    }

    /// Report a failure outside the envelope.
    pub fn on_unhandled(&self, exception: &Exception) -> UnhandledOutcome {
        if self.is_terminating() {
            self.ensure_report(exception);
            return UnhandledOutcome::AlreadyTerminating;
        }
        log_chain("UNHANDLED", exception);
        UnhandledOutcome::Continue
    }

    fn ensure_report(&self, exception: &Exception) -> Option<PathBuf> {
        let mut written = self.written.lock();
        if let Some(path) = written.as_ref() {
            return Some(path.clone());
        }

        let report = CrashReport::new(
            exception,
            Some(self.kernel.snapshot()),
            self.environment.clone(),
        );
        match report.write_to(&self.report_path) {
            Ok(()) => {
                *written = Some(self.report_path.clone());
                Some(self.report_path.clone())
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

fn log_chain(tag: &str, exception: &Exception) {
    for (depth, e) in exception.chain().enumerate() {
        if depth == 0 {
            error!("[{}] {}", tag, e);
        } else {
            error!("[{}] inner: {}", tag, e);
        }
        for frame in &e.trace {
            error!("[{}]   at {}", tag, frame);
        }
    }
}

#[cfg(test)]
#[path = "containment_tests.rs"]
mod tests;
