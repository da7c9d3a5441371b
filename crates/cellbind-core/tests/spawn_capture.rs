//! Integration tests for capture scopes on the process-wide launcher.
//!
//! Every test touching the global slot is `#[serial]`; the slot is shared
//! by the whole test binary.

use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serial_test::serial;

use cellbind_core::spawn::{
    self, BuildError, CaptureConfig, CaptureMode, SEPARATOR_WIDTH, Spawn, SpawnOptions,
};
use cellbind_core::{BuildPlan, Error};

// =============================================================================
// Test Helpers
// =============================================================================

/// Shared in-memory writer, usable as both an output sink and a log writer.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn separator() -> String {
    format!("{}\n", "-".repeat(SEPARATOR_WIDTH))
}

fn cmd(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

fn captured(mode: CaptureMode) -> (CaptureConfig, SharedBuffer) {
    let buffer = SharedBuffer::default();
    let config = CaptureConfig::new(mode).with_output(Arc::new(Mutex::new(buffer.clone())));
    (config, buffer)
}

fn assert_slot_restored(before: &Arc<dyn Spawn>) {
    assert!(Arc::ptr_eq(before, &spawn::launcher()), "slot value changed across scope");
    if let Some(injector) = spawn::installed() {
        assert!(!injector.is_overridden(), "capture scope leaked");
    }
}

// =============================================================================
// Slot lifecycle
// =============================================================================

#[test]
#[serial]
fn test_install_is_idempotent() {
    let first = spawn::install();
    let second = spawn::install();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(spawn::installed().is_some());
}

#[test]
#[serial]
fn test_uninstall_restores_original_launcher() {
    let injector = spawn::install();
    let original = injector.original();

    assert!(spawn::uninstall());
    assert!(Arc::ptr_eq(&spawn::launcher(), &original));
    assert!(spawn::installed().is_none());
    assert!(!spawn::uninstall());

    // Leave the slot installed for the other tests
    spawn::install();
}

#[test]
#[serial]
fn test_first_scope_leaves_slot_as_found() {
    spawn::uninstall();
    let before = spawn::launcher();

    {
        let _outer = spawn::scoped_capture(CaptureMode::OnError, None, false);
        assert!(!Arc::ptr_eq(&before, &spawn::launcher()));
        {
            let _inner = spawn::scoped_capture(CaptureMode::Never, None, false);
        }
        assert!(spawn::installed().is_some(), "inner scope removed the injector");
    }

    assert_slot_restored(&before);
    assert!(spawn::installed().is_none());
}

#[test]
#[serial]
fn test_scope_keeps_explicit_install() {
    let injector = spawn::install();
    let before = spawn::launcher();

    spawn::with_capture(CaptureConfig::new(CaptureMode::Never), || {});

    assert_slot_restored(&before);
    assert!(Arc::ptr_eq(&spawn::installed().unwrap(), &injector));
}

#[test]
#[serial]
fn test_nested_scopes_restore_each_level() {
    let injector = spawn::install();
    let before = injector.active();

    {
        let _outer = spawn::scoped_capture(CaptureMode::Always, None, false);
        let outer = injector.active();
        for depth in 0..3 {
            let _inner = spawn::capture(CaptureConfig::new(CaptureMode::Never));
            assert!(!Arc::ptr_eq(&injector.active(), &outer), "depth {depth}");
        }
        assert!(Arc::ptr_eq(&injector.active(), &outer));
    }

    assert!(Arc::ptr_eq(&injector.active(), &before));
}

#[test]
#[serial]
fn test_scope_restored_after_build_error() {
    let before = spawn::launcher();
    let result = spawn::with_capture(CaptureConfig::new(CaptureMode::Never), || {
        spawn::spawn(&cmd(&["cellbind-no-such-compiler"]), &SpawnOptions::default())
    });

    assert!(matches!(result, Err(BuildError::Launch { .. })));
    assert_slot_restored(&before);
}

#[test]
#[serial]
fn test_scope_restored_after_panic() {
    let before = spawn::launcher();
    let result = catch_unwind(AssertUnwindSafe(|| -> u32 {
        let _guard = spawn::scoped_capture(CaptureMode::OnError, None, false);
        panic!("build tool crashed")
    }));

    assert!(result.is_err());
    assert_slot_restored(&before);
}

#[test]
#[serial]
fn test_dry_run_under_capture() {
    let (config, buffer) = captured(CaptureMode::Always);
    let _guard = spawn::capture(config);

    let options = SpawnOptions::default().dry_run(true);
    spawn::spawn(&cmd(&["cellbind-no-such-compiler", "-c", "x.cpp"]), &options).unwrap();

    assert!(buffer.contents().is_empty());
}

// =============================================================================
// Capturing through the slot (needs a POSIX shell)
// =============================================================================

#[cfg(unix)]
#[test]
#[serial]
fn test_held_launcher_is_redirected() {
    spawn::install();
    // A build tool resolves its launcher before the scope opens
    let held = spawn::launcher();
    let before = Arc::clone(&held);

    let (config, buffer) = captured(CaptureMode::Always);
    {
        let _guard = spawn::capture(config);
        held.spawn(&cmd(&["sh", "-c", "echo compiling"]), &SpawnOptions::default())
            .unwrap();
    }

    assert_eq!(buffer.contents(), format!("{0}compiling\n{0}", separator()));
    assert_slot_restored(&before);
}

#[cfg(unix)]
#[test]
#[serial]
fn test_on_error_example() {
    let (config, buffer) = captured(CaptureMode::OnError);
    let _guard = spawn::capture(config);

    let failing = cmd(&["sh", "-c", "printf 'warning: x\\n'; exit 1"]);
    let err = spawn::spawn(&failing, &SpawnOptions::default()).unwrap_err();
    assert_eq!(buffer.contents(), format!("{0}warning: x\n{0}", separator()));
    assert_eq!(err.program(), Some("sh"));

    let (config, quiet) = captured(CaptureMode::OnError);
    let _inner = spawn::capture(config);
    let passing = cmd(&["sh", "-c", "printf 'warning: x\\n'; exit 0"]);
    spawn::spawn(&passing, &SpawnOptions::default()).unwrap();
    assert!(quiet.contents().is_empty());
}

#[cfg(unix)]
#[test]
#[serial]
fn test_silent_commands_never_echo() {
    for mode in [CaptureMode::Always, CaptureMode::OnError, CaptureMode::Never] {
        let (config, buffer) = captured(mode);
        let _guard = spawn::capture(config);

        let err = spawn::spawn(&cmd(&["sh", "-c", "exit 4"]), &SpawnOptions::default())
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(4));
        assert!(buffer.contents().is_empty(), "{mode} echoed empty output");
    }
}

#[cfg(unix)]
#[test]
#[serial]
fn test_never_mode_succeeds_quietly() {
    let (config, buffer) = captured(CaptureMode::Never);
    let _guard = spawn::capture(config);

    spawn::spawn(
        &cmd(&["sh", "-c", "echo 'cell.cpp:1: warning: unused'"]),
        &SpawnOptions::default(),
    )
    .unwrap();
    assert!(buffer.contents().is_empty());
}

#[cfg(unix)]
#[test]
#[serial]
fn test_formatter_applied_before_echo() {
    let (config, buffer) = captured(CaptureMode::Always);
    let config = config.with_formatter(|text| text.replace("error", "ERROR"));
    let _guard = spawn::capture(config);

    spawn::spawn(
        &cmd(&["sh", "-c", "printf 'cell.cpp:3: error: expected ;'"]),
        &SpawnOptions::default(),
    )
    .unwrap();

    assert_eq!(
        buffer.contents(),
        format!("{0}cell.cpp:3: ERROR: expected ;\n{0}", separator())
    );
}

#[cfg(unix)]
#[test]
#[serial]
fn test_log_commands_emits_quoted_line() {
    let logs = SharedBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let (config, _) = captured(CaptureMode::Never);
        let _guard = spawn::capture(config.with_log_commands(true));
        spawn::spawn(&cmd(&["sh", "-c", "echo a b"]), &SpawnOptions::default()).unwrap();
    });

    let logged = logs.contents();
    assert!(logged.contains("INFO"), "{logged}");
    assert!(logged.contains("sh -c 'echo a b'"), "{logged}");
}

#[cfg(unix)]
#[test]
#[serial]
fn test_build_plan_under_capture() {
    let (config, buffer) = captured(CaptureMode::OnError);
    let _guard = spawn::capture(config);

    let plan = BuildPlan::new()
        .step("compile", ["sh", "-c", "echo compiled"])
        .step("link", ["sh", "-c", "echo 'undefined symbol: f' 1>&2; exit 1"])
        .step("never reached", ["sh", "-c", "echo nope"]);

    let err = plan.run().unwrap_err();

    assert!(matches!(err, Error::Build(BuildError::Failed { .. })));
    assert_eq!(err.to_string(), "command 'sh' failed");
    assert_eq!(
        buffer.contents(),
        format!("{0}undefined symbol: f\n{0}", separator())
    );
}
