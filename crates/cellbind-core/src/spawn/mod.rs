//! Build-process interception and output capture.
//!
//! Build tools start compilers and linkers through a single launcher. This
//! module makes that launcher swappable and provides a capturing
//! replacement, so a notebook session can keep compiler noise out of the way
//! unless something actually went wrong.
//!
//! # Architecture
//!
//! ```text
//! build tool ──► launcher() ──► Injector ──► active Spawn
//!                                  │             │
//!                                  │             ├── DirectSpawn (original)
//!                                  │             └── CapturingSpawn (inside a capture scope)
//!                                  │                    │
//!                                  │                    ├── PATH lookup (which)
//!                                  │                    ├── child with stdout+stderr on one pipe
//!                                  │                    ├── framed echo per CaptureMode
//!                                  │                    └── BuildError on failure
//!                                  │
//!                                  └── CaptureGuard drop ──► previous launcher restored
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cellbind_core::spawn::{self, CaptureConfig, CaptureMode, SpawnOptions};
//!
//! let _capture = spawn::capture(CaptureConfig::new(CaptureMode::OnError));
//! let command = vec!["c++".to_string(), "-c".to_string(), "cell.cpp".to_string()];
//! spawn::spawn(&command, &SpawnOptions::default())?;
//! # Ok::<(), cellbind_core::spawn::BuildError>(())
//! ```

mod capture;
mod error;
mod launcher;
mod quote;
mod slot;

pub use capture::{
    CaptureConfig, CaptureGuard, CaptureMode, CapturingSpawn, Formatter, OutputSink,
    SEPARATOR_WIDTH, capture, frame_output, scoped_capture, with_capture,
};
pub use error::{BuildError, FailureCause};
pub use launcher::{DirectSpawn, Spawn, SpawnOptions};
pub use quote::{QuoteStyle, join_command};
pub use slot::{Injector, install, installed, launcher, spawn, uninstall};
