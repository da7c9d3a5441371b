//! The launcher seam between a build tool and the processes it starts.

use std::path::Path;
use std::process::Command;

use super::error::BuildError;
use super::quote::{QuoteStyle, join_command};

/// Starts one build command and waits for it.
///
/// Build tools call this once per compiled unit or link step. Implementations
/// must block until the child has exited.
pub trait Spawn: Send + Sync {
    /// Run `command` (executable first, then arguments) to completion.
    fn spawn(&self, command: &[String], options: &SpawnOptions) -> Result<(), BuildError>;
}

impl<F> Spawn for F
where
    F: Fn(&[String], &SpawnOptions) -> Result<(), BuildError> + Send + Sync,
{
    fn spawn(&self, command: &[String], options: &SpawnOptions) -> Result<(), BuildError> {
        self(command, options)
    }
}

/// Per-call flags passed by the build tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOptions {
    /// Resolve the executable through `PATH` before running it.
    pub search_path: bool,

    /// Build tool verbosity. Only the direct launcher looks at it.
    pub verbose: bool,

    /// Do not run anything.
    pub dry_run: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            search_path: true,
            verbose: false,
            dry_run: false,
        }
    }
}

impl SpawnOptions {
    /// PATH lookup on, quiet, really running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether to resolve the executable through `PATH`.
    pub fn search_path(mut self, search_path: bool) -> Self {
        self.search_path = search_path;
        self
    }

    /// Whether the build tool runs verbosely.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Skip running the command entirely.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// The stock launcher: runs the command with inherited stdio.
///
/// This is what the process-wide slot holds until something overrides it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectSpawn;

impl Spawn for DirectSpawn {
    fn spawn(&self, command: &[String], options: &SpawnOptions) -> Result<(), BuildError> {
        let command = resolve_command(command, options.search_path)?;
        if options.dry_run {
            return Ok(());
        }

        let line = join_command(&command, QuoteStyle::native());
        if options.verbose {
            tracing::info!("{}", line);
        } else {
            tracing::debug!("{}", line);
        }

        let program = program_name(&command[0]);
        let status = Command::new(&command[0])
            .args(&command[1..])
            .status()
            .map_err(|e| BuildError::launch(&program, e))?;

        if status.success() {
            Ok(())
        } else {
            Err(BuildError::failed(&program, status))
        }
    }
}

/// Copy the invocation, resolving the executable through `PATH` if asked.
///
/// Resolution is best effort: an executable that cannot be found is left
/// as given and will fail at launch instead.
pub(crate) fn resolve_command(
    command: &[String],
    search_path: bool,
) -> Result<Vec<String>, BuildError> {
    let Some(executable) = command.first() else {
        return Err(BuildError::EmptyCommand);
    };

    let mut resolved = command.to_vec();
    if search_path {
        match which::which(executable) {
            Ok(path) => resolved[0] = path.to_string_lossy().into_owned(),
            Err(e) => tracing::debug!("Could not resolve {} in PATH: {}", executable, e),
        }
    }
    Ok(resolved)
}

/// Base name of an executable path, as shown in error messages.
pub(crate) fn program_name(executable: &str) -> String {
    Path::new(executable)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| executable.to_string())
}
