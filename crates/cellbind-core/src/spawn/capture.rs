//! Capturing launcher and capture scopes.
//!
//! [`CapturingSpawn`] runs a build command with stdout and stderr merged into
//! one pipe, keeps the output, and decides from the [`CaptureMode`] whether to
//! echo it. A [`CaptureGuard`] installs one into an [`Injector`] and puts the
//! previous launcher back when dropped, including during unwinding.

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::{Command, ExitStatus};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::config::{self, CAPTURE_ENV, LOG_COMMANDS_ENV};
use crate::error::{Error, Result};

use super::error::BuildError;
use super::launcher::{Spawn, SpawnOptions, program_name, resolve_command};
use super::quote::{QuoteStyle, join_command};
use super::slot::{self, Injector};

/// Width of the separator lines framing echoed output.
pub const SEPARATOR_WIDTH: usize = 80;

/// When captured build output is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Whenever the command printed something.
    Always,
    /// Only when the command failed and printed something.
    #[default]
    OnError,
    /// Never.
    Never,
}

impl CaptureMode {
    /// Whether output should be echoed for this run.
    pub fn should_echo(self, output: &[u8], success: bool) -> bool {
        if output.is_empty() {
            return false;
        }
        match self {
            Self::Always => true,
            Self::OnError => !success,
            Self::Never => false,
        }
    }

    /// Name used in config values and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::OnError => "on_error",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CaptureMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "on_error" | "on-error" | "onerror" => Ok(Self::OnError),
            "never" => Ok(Self::Never),
            other => Err(Error::Config(format!(
                "unknown capture mode `{other}` (expected always, on_error or never)"
            ))),
        }
    }
}

/// Rewrites captured output before it is echoed.
///
/// A formatter that panics fails the command with the generic
/// `command '...' failed` error and nothing is echoed.
pub type Formatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Where echoed output goes instead of stdout.
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

/// Configuration of a capture scope.
#[derive(Clone, Default)]
pub struct CaptureConfig {
    /// When to echo captured output.
    pub mode: CaptureMode,

    /// Log each command line before running it.
    pub log_commands: bool,

    /// Applied to the decoded output before echoing.
    pub formatter: Option<Formatter>,

    output: Option<OutputSink>,
}

impl CaptureConfig {
    /// Capture with `mode`, no formatter, no command logging, echoing to
    /// stdout.
    pub fn new(mode: CaptureMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Defaults overridden by `CELLBIND_CAPTURE` and `CELLBIND_LOG_COMMANDS`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either variable holds a value that is
    /// not a capture mode or a boolean flag.
    pub fn from_env() -> Result<Self> {
        let mut capture = Self::default();
        if let Some(mode) = config::env_var(CAPTURE_ENV) {
            capture.mode = mode.parse()?;
        }
        if let Some(log_commands) = config::env_flag(LOG_COMMANDS_ENV)? {
            capture.log_commands = log_commands;
        }
        Ok(capture)
    }

    /// Set when captured output is echoed.
    pub fn with_mode(mut self, mode: CaptureMode) -> Self {
        self.mode = mode;
        self
    }

    /// Log each quoted command line at info level before running it.
    pub fn with_log_commands(mut self, log_commands: bool) -> Self {
        self.log_commands = log_commands;
        self
    }

    /// Pass captured output through `formatter` before echoing it.
    pub fn with_formatter(
        mut self,
        formatter: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Echo into `sink` rather than the process's stdout.
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }
}

impl fmt::Debug for CaptureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureConfig")
            .field("mode", &self.mode)
            .field("log_commands", &self.log_commands)
            .field("formatter", &self.formatter.is_some())
            .field("output", &if self.output.is_some() { "sink" } else { "stdout" })
            .finish()
    }
}

/// Output and exit status of one finished child.
struct Captured {
    output: Vec<u8>,
    status: ExitStatus,
}

/// Launcher that buffers the merged output of each command.
#[derive(Debug, Clone, Default)]
pub struct CapturingSpawn {
    config: CaptureConfig,
}

impl CapturingSpawn {
    /// Launcher capturing according to `config`.
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// The configuration this launcher was created with.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    fn echo(&self, output: &[u8]) -> io::Result<()> {
        let framed = panic::catch_unwind(AssertUnwindSafe(|| {
            frame_output(output, self.config.formatter.as_ref())
        }))
        .map_err(|_| io::Error::other("output formatter panicked"))?;
        match &self.config.output {
            Some(sink) => {
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                sink.write_all(&framed)?;
                sink.flush()
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(&framed)?;
                stdout.flush()
            }
        }
    }
}

impl Spawn for CapturingSpawn {
    fn spawn(
        &self,
        command: &[String],
        options: &SpawnOptions,
    ) -> std::result::Result<(), BuildError> {
        let command = resolve_command(command, options.search_path)?;
        if options.dry_run {
            return Ok(());
        }

        if self.config.log_commands {
            tracing::info!("{}", join_command(&command, QuoteStyle::native()));
        }

        let program = program_name(&command[0]);
        let captured = run_merged(&command, &program)?;

        if self.config.mode.should_echo(&captured.output, captured.status.success()) {
            self.echo(&captured.output)
                .map_err(|e| BuildError::failed(&program, e))?;
        }

        if captured.status.success() {
            Ok(())
        } else {
            tracing::debug!("{} exited with {}", program, captured.status);
            Err(BuildError::failed(&program, captured.status))
        }
    }
}

/// Run `command` with stdout and stderr sharing one pipe.
///
/// The pipe is drained to EOF before waiting so a chatty child can never
/// block on a full pipe.
fn run_merged(command: &[String], program: &str) -> std::result::Result<Captured, BuildError> {
    let launch_error = |e: io::Error| BuildError::launch(program, e);

    let (mut reader, writer) = io::pipe().map_err(launch_error)?;
    let mut child = {
        let stderr = writer.try_clone().map_err(launch_error)?;
        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]).stdout(writer).stderr(stderr);
        // `cmd` owns our copies of the write end; dropping it lets EOF arrive
        cmd.spawn().map_err(launch_error)?
    };

    let mut output = Vec::new();
    let read = reader.read_to_end(&mut output);
    let status = child.wait();
    read.map_err(|e| BuildError::failed(program, e))?;
    let status = status.map_err(|e| BuildError::failed(program, e))?;

    Ok(Captured { output, status })
}

/// Frame `output` between separator lines, ending in a newline.
pub fn frame_output(output: &[u8], formatter: Option<&Formatter>) -> Vec<u8> {
    let body: Cow<'_, [u8]> = match formatter {
        Some(format) => Cow::Owned(format(&String::from_utf8_lossy(output)).into_bytes()),
        None => Cow::Borrowed(output),
    };

    let mut framed = Vec::with_capacity(body.len() + 2 * (SEPARATOR_WIDTH + 1) + 1);
    push_separator(&mut framed);
    framed.extend_from_slice(&body);
    if !body.ends_with(b"\n") {
        framed.push(b'\n');
    }
    push_separator(&mut framed);
    framed
}

fn push_separator(buf: &mut Vec<u8>) {
    buf.extend(std::iter::repeat_n(b'-', SEPARATOR_WIDTH));
    buf.push(b'\n');
}

/// Active capture scope. Dropping it restores the launcher it displaced.
#[must_use = "capture ends as soon as the guard is dropped"]
pub struct CaptureGuard {
    injector: Arc<Injector>,
    previous: Arc<dyn Spawn>,
    // Set when opening this scope put the injector into the global slot
    owns_install: bool,
}

impl CaptureGuard {
    /// The injector this scope installed into.
    pub fn injector(&self) -> &Arc<Injector> {
        &self.injector
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.injector.set(Arc::clone(&self.previous));
        if self.owns_install {
            slot::uninstall_if(&self.injector);
        }
        tracing::debug!("Capture scope closed");
    }
}

impl fmt::Debug for CaptureGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureGuard")
            .field("injector", &self.injector)
            .field("owns_install", &self.owns_install)
            .finish_non_exhaustive()
    }
}

impl Injector {
    /// Route calls through a [`CapturingSpawn`] until the guard is dropped.
    ///
    /// For an outermost scope dropping the guard is the same as
    /// [`Injector::reset`]; nested scopes each put back what they replaced.
    pub fn capture(self: &Arc<Self>, config: CaptureConfig) -> CaptureGuard {
        tracing::debug!(mode = %config.mode, "Capture scope opened");
        let previous = self.replace(Arc::new(CapturingSpawn::new(config)));
        CaptureGuard {
            injector: Arc::clone(self),
            previous,
            owns_install: false,
        }
    }

    /// Run `f` inside a capture scope on this injector.
    pub fn with_capture<R>(
        self: &Arc<Self>,
        config: CaptureConfig,
        f: impl FnOnce() -> R,
    ) -> R {
        let _guard = self.capture(config);
        f()
    }
}

/// Open a capture scope on the process-wide launcher slot.
///
/// Installs the slot's [`Injector`] first if needed, and takes it out again
/// when that scope closes, so the slot holds the same launcher afterwards as
/// before. Build tools that look up their launcher before the scope opens
/// only see the capture if [`install`](super::install) ran first.
///
/// The slot is shared by the whole process, so scopes opened from different
/// threads at the same time are not supported.
pub fn capture(config: CaptureConfig) -> CaptureGuard {
    let (injector, installed_now) = slot::install_tracked();
    let mut guard = injector.capture(config);
    guard.owns_install = installed_now;
    guard
}

/// [`capture`] with the three classic knobs.
pub fn scoped_capture(
    mode: CaptureMode,
    formatter: Option<Formatter>,
    log_commands: bool,
) -> CaptureGuard {
    capture(CaptureConfig {
        mode,
        log_commands,
        formatter,
        output: None,
    })
}

/// Run `f` while the process-wide launcher captures build output.
pub fn with_capture<R>(config: CaptureConfig, f: impl FnOnce() -> R) -> R {
    let _guard = capture(config);
    f()
}
