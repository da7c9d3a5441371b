//! Environment-variable configuration.
//!
//! Every knob has a programmatic equivalent; the variables only provide
//! defaults for notebook sessions that cannot easily pass arguments.

use crate::error::{Error, Result};

/// Capture mode for build output (`always`, `on_error`, `never`).
pub const CAPTURE_ENV: &str = "CELLBIND_CAPTURE";

/// Log each build command line before running it.
pub const LOG_COMMANDS_ENV: &str = "CELLBIND_LOG_COMMANDS";

/// Root of the build cache.
pub const CACHE_DIR_ENV: &str = "CELLBIND_CACHE_DIR";

/// Force the kernel-frontend flag on or off.
pub const KERNEL_ENV: &str = "CELLBIND_KERNEL";

/// Extra include directories, `PATH`-style separated.
pub const INCLUDE_PATH_ENV: &str = "CELLBIND_INCLUDE_PATH";

/// Python interpreter used to locate header-only library includes.
pub const PYTHON_ENV: &str = "CELLBIND_PYTHON";

/// Parse a boolean flag the way shells usually spell it.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Read an optional string variable. Unset and non-unicode both count as unset.
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Read an optional boolean variable, rejecting values that are not flags.
pub(crate) fn env_flag(name: &str) -> Result<Option<bool>> {
    match env_var(name) {
        None => Ok(None),
        Some(value) => parse_flag(&value)
            .map(Some)
            .ok_or_else(|| Error::Config(format!("{name}: expected a boolean, got `{value}`"))),
    }
}
