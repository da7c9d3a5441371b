//! Core of the cellbind notebook extension.
//!
//! This crate provides:
//! - Interception of the build launcher with scoped, reversible overrides
//! - Captured, framed compiler output with configurable echo policy
//! - Structured build errors
//! - Environment detection (kernel frontend, platform, include directories)
//! - Build cache layout

pub mod build;
pub mod config;
pub mod environment;
pub mod error;
pub mod overrides;
pub mod paths;
pub mod spawn;

pub use build::{BuildPlan, BuildStep};
pub use environment::Environment;
pub use error::{Error, Result};
pub use overrides::{OverrideGuard, override_vars};
pub use paths::CacheDirs;
pub use spawn::{
    BuildError, CaptureConfig, CaptureGuard, CaptureMode, CapturingSpawn, DirectSpawn, Injector,
    Spawn, SpawnOptions, scoped_capture, with_capture,
};
