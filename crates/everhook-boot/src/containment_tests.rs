use super::*;
use std::fs;

use everhook_core::HostRuntime;
use everhook_il::{MethodId, Signature, Value};
use tempfile::TempDir;

fn target() -> MethodId {
    MethodId::new("Game.Title", "Greeting", Signature::new(0).returning())
}

fn containment(report_path: PathBuf) -> FailureContainment {
    let runtime = Arc::new(HostRuntime::new());
    runtime.define_native(target(), |_, _| Ok(Value::from("hello")));
    let kernel = Arc::new(Kernel::new(runtime, PathBuf::from(".")));
    let env = EnvironmentInfo::capture(vec!["everhook".into()], true, "opengl");
    FailureContainment::new(kernel, report_path, env)
}

#[test]
fn test_completed_envelope() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("error_log.txt");
    let c = containment(path.clone());

    let disposition = c.run_envelope(|| Ok(()));

    assert_eq!(disposition, Disposition::Completed);
    assert_eq!(disposition.exit_code(), 0);
    assert!(!c.is_terminating());
    assert!(!path.exists());
}

#[test]
fn test_exception_in_envelope_is_critical() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("error_log.txt");
    let c = containment(path.clone());
    c.kernel.hooks().install(&target(), |orig, args| orig.call(args)).unwrap();

    let disposition = c.run_envelope(|| {
        Err(Exception::thrown("level failed to load")
            .with_inner(Exception::new("IOException", "map file missing")))
    });

    assert_eq!(disposition, Disposition::Terminate { code: -1 });
    assert_eq!(disposition.exit_code(), CRITICAL_EXIT_CODE);
    assert!(c.is_terminating());
    assert!(c.kernel.hooks().is_frozen());
    assert!(c.kernel.bus().is_frozen());
    assert_eq!(c.written_report(), Some(path.clone()));

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("level failed to load"));
    assert!(text.contains("IOException: map file missing"));
    assert!(text.contains("Hooks: 1"));
    assert!(text.contains("Headless: true"));
}

#[test]
fn test_panic_in_envelope_is_critical() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("error_log.txt");
    let c = containment(path.clone());

    let disposition = c.run_envelope(|| panic!("frame budget exceeded"));

    assert_eq!(disposition, Disposition::Terminate { code: -1 });
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("Panic: frame budget exceeded"));
}

#[test]
fn test_unhandled_continues() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("error_log.txt");
    let c = containment(path.clone());

    let outcome = c.on_unhandled(&Exception::thrown("background task failed"));

    assert_eq!(outcome, UnhandledOutcome::Continue);
    assert!(!c.is_terminating());
    assert!(!c.kernel.hooks().is_frozen());
    assert!(!path.exists());
}

#[test]
fn test_unhandled_while_terminating_keeps_first_report() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("error_log.txt");
    let c = containment(path.clone());

    c.run_envelope(|| Err(Exception::thrown("first")));
    let outcome = c.on_unhandled(&Exception::thrown("second"));

    assert_eq!(outcome, UnhandledOutcome::AlreadyTerminating);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("first"));
    assert!(!text.contains("second"));
}

#[test]
fn test_unwritable_report_still_terminates() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, "").unwrap();
    let c = containment(blocker.join("error_log.txt"));

    let disposition = c.run_envelope(|| Err(Exception::thrown("boom")));

    assert_eq!(disposition, Disposition::Terminate { code: -1 });
    assert!(c.written_report().is_none());
    assert_eq!(
        c.on_unhandled(&Exception::thrown("later")),
        UnhandledOutcome::AlreadyTerminating
    );
}

#[test]
fn test_headless_from_env() {
    // SAFETY: This test runs in isolation and sets a unique test-only env var
    unsafe {
        std::env::set_var(HEADLESS_ENV, "1");
    }
    assert!(headless_from_env());
    unsafe {
        std::env::set_var(HEADLESS_ENV, "0");
    }
    assert!(!headless_from_env());
    unsafe {
        std::env::remove_var(HEADLESS_ENV);
    }
    assert!(!headless_from_env());
}
