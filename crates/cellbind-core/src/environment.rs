//! Host environment detection.
//!
//! Everything a build needs to know about where it runs: whether a rich
//! kernel frontend is attached, the platform's extension naming, and where
//! the header-only binding library keeps its headers.

use std::env;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::config::{self, INCLUDE_PATH_ENV, KERNEL_ENV, PYTHON_ENV};
use crate::error::Result;
use crate::paths;

/// Set by Jupyter in every kernel process it launches.
const JUPYTER_KERNEL_MARKER: &str = "JPY_PARENT_PID";

const PYBIND11_INCLUDE_SCRIPT: &str = "\
import pybind11
print(pybind11.get_include(True))
print(pybind11.get_include(False))
";

const EXT_SUFFIX_SCRIPT: &str = "\
import sysconfig
print(sysconfig.get_config_var('EXT_SUFFIX') or '')
";

/// Whether we run inside a kernel with a rich frontend. Cached per process.
pub fn is_kernel() -> bool {
    static KERNEL: OnceLock<bool> = OnceLock::new();
    *KERNEL.get_or_init(detect_kernel)
}

/// Uncached kernel detection: `CELLBIND_KERNEL` wins, then the Jupyter marker.
pub fn detect_kernel() -> bool {
    if let Some(value) = config::env_var(KERNEL_ENV) {
        match config::parse_flag(&value) {
            Some(flag) => return flag,
            None => tracing::warn!("Ignoring invalid {}={}", KERNEL_ENV, value),
        }
    }
    env::var_os(JUPYTER_KERNEL_MARKER).is_some()
}

/// Built for Windows.
pub fn is_windows() -> bool {
    cfg!(windows)
}

/// Built for macOS.
pub fn is_macos() -> bool {
    cfg!(target_os = "macos")
}

/// File suffix the Python interpreter expects on extension modules.
///
/// Asked from the interpreter once per process, e.g.
/// `.cpython-311-x86_64-linux-gnu.so`. Without an interpreter this is the
/// bare platform suffix from [`default_ext_suffix`].
pub fn ext_suffix() -> &'static str {
    static SUFFIX: OnceLock<String> = OnceLock::new();
    SUFFIX.get_or_init(|| {
        python_ext_suffix().unwrap_or_else(|| {
            tracing::debug!("Falling back to the platform extension suffix");
            default_ext_suffix().to_string()
        })
    })
}

/// Suffix an interpreter accepts on any platform when it cannot be asked.
pub fn default_ext_suffix() -> &'static str {
    if is_windows() { ".pyd" } else { ".so" }
}

/// File name of an extension module importable as `stem`.
pub fn ext_filename(stem: &str) -> String {
    format!("{}{}", stem, ext_suffix())
}

/// Query `EXT_SUFFIX` from the interpreter, uncached.
pub fn python_ext_suffix() -> Option<String> {
    let stdout = run_python(EXT_SUFFIX_SCRIPT, "extension suffix")?;
    let suffix = stdout.trim();
    (!suffix.is_empty()).then(|| suffix.to_string())
}

/// Include directories for extension builds.
///
/// Entries from `CELLBIND_INCLUDE_PATH` come first, followed by whatever the
/// binding library reports about itself.
pub fn include_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = config::env_var(INCLUDE_PATH_ENV)
        .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default();

    for dir in pybind11_includes() {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

/// Ask the Python interpreter where pybind11's headers live.
///
/// Returns nothing when there is no interpreter, pybind11 is not installed,
/// or it is too old to report its include directory.
pub fn pybind11_includes() -> Vec<PathBuf> {
    let Some(stdout) = run_python(PYBIND11_INCLUDE_SCRIPT, "pybind11 include") else {
        return Vec::new();
    };

    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Run `script` with the interpreter and return its stdout on success.
fn run_python(script: &str, what: &str) -> Option<String> {
    let Some(python) = find_python() else {
        tracing::debug!("No Python interpreter found, skipping {} lookup", what);
        return None;
    };

    let output = match Command::new(&python)
        .args(["-c", script])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!("Failed to run {}: {}", python.display(), e);
            return None;
        }
    };

    if !output.status.success() {
        tracing::debug!("{} lookup failed with {}", what, output.status);
        return None;
    }

    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn find_python() -> Option<PathBuf> {
    if let Some(python) = config::env_var(PYTHON_ENV) {
        return which::which(&python).ok().or_else(|| Some(PathBuf::from(python)));
    }
    which::which("python3")
        .or_else(|_| which::which("python"))
        .ok()
}

/// What the build layer gets from its surroundings.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Writable cache root.
    pub cache_dir: PathBuf,

    /// Rich kernel frontend attached.
    pub kernel: bool,

    /// Header search directories.
    pub include_dirs: Vec<PathBuf>,
}

impl Environment {
    /// Probe the current process.
    pub fn detect() -> Result<Self> {
        Ok(Self {
            cache_dir: paths::cache_dir()?,
            kernel: is_kernel(),
            include_dirs: include_dirs(),
        })
    }
}
