//! # Everhook Boot
//!
//! Process bring-up around the kernel.
//!
//! ## Features
//!
//! - Log session (console plus `log.txt`, flushed on drop)
//! - Log history archiving and retention
//! - Crash reports
//! - Failure containment (top-level envelope and panic hook)
//! - Signal handling for the host loop

pub mod containment;
pub mod crash;
pub mod error;
pub mod log_history;
pub mod logging;
pub mod signal;

pub use containment::{
    CRITICAL_EXIT_CODE, Disposition, FailureContainment, HEADLESS_ENV, UnhandledOutcome,
    headless_from_env,
};
pub use crash::{CrashReport, EnvironmentInfo, ExceptionEntry};
pub use error::BootError;
pub use log_history::LogHistory;
pub use logging::LogSession;
pub use signal::{ShutdownSignal, SignalHandler};
