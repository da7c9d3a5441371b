//! Failures reported by launchers.

use std::io;
use std::process::ExitStatus;

use thiserror::Error;

/// A build step failed to start or exited unsuccessfully.
///
/// The display message only names the executable's base name, matching what
/// build tools usually print. The underlying cause stays reachable through
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// The command invocation had no executable.
    #[error("empty command")]
    EmptyCommand,

    /// The OS refused to start the process (executable missing, not
    /// executable, pipe creation failed, ...).
    #[error("command '{program}' failed with exit status {}: {}", errno(.source), strerror(.source))]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process ran but did not succeed, or its output could not be
    /// collected or echoed.
    #[error("command '{program}' failed")]
    Failed {
        program: String,
        #[source]
        cause: FailureCause,
    },
}

/// Why a launched process counts as failed.
#[derive(Debug, Error)]
pub enum FailureCause {
    /// Nonzero exit or termination by signal.
    #[error("process {0}")]
    Exit(ExitStatus),

    /// Reading, waiting, or echoing failed after launch.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BuildError {
    pub(crate) fn launch(program: &str, source: io::Error) -> Self {
        Self::Launch {
            program: program.to_string(),
            source,
        }
    }

    pub(crate) fn failed(program: &str, cause: impl Into<FailureCause>) -> Self {
        Self::Failed {
            program: program.to_string(),
            cause: cause.into(),
        }
    }

    /// Base name of the executable that failed, if there was one.
    pub fn program(&self) -> Option<&str> {
        match self {
            Self::EmptyCommand => None,
            Self::Launch { program, .. } | Self::Failed { program, .. } => Some(program),
        }
    }

    /// Exit code of the child, when it ran to completion with one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed {
                cause: FailureCause::Exit(status),
                ..
            } => status.code(),
            _ => None,
        }
    }

    /// OS error number of a launch failure.
    pub fn os_error(&self) -> Option<i32> {
        match self {
            Self::Launch { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

impl From<ExitStatus> for FailureCause {
    fn from(status: ExitStatus) -> Self {
        Self::Exit(status)
    }
}

fn errno(err: &io::Error) -> String {
    err.raw_os_error()
        .map_or_else(|| "unknown".to_string(), |code| code.to_string())
}

/// The OS message without std's trailing ` (os error N)`.
fn strerror(err: &io::Error) -> String {
    let rendered = err.to_string();
    if let Some(code) = err.raw_os_error()
        && let Some(message) = rendered.strip_suffix(&format!(" (os error {code})"))
    {
        return message.to_string();
    }
    rendered
}
