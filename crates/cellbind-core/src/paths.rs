//! Build cache directory management.
//!
//! Provides a consistent cache layout for compiled cell extensions, so the
//! same paths are used by every build in a session.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{self, CACHE_DIR_ENV};
use crate::error::{Error, Result};

/// Directory structure of the build cache.
///
/// ```text
/// <user cache>/cellbind/
/// ├── build/     # Intermediate objects per cell
/// └── modules/   # Linked extension modules
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDirs {
    /// The cache root itself.
    pub root: PathBuf,

    /// Intermediate build artifacts.
    pub build_dir: PathBuf,

    /// Finished extension modules.
    pub modules_dir: PathBuf,
}

impl CacheDirs {
    /// Resolve the cache root from `CELLBIND_CACHE_DIR` or the user cache dir.
    ///
    /// Does not touch the filesystem; call [`CacheDirs::ensure`] for that.
    ///
    /// # Errors
    /// Returns an error if no user cache directory can be determined or the
    /// configured path cannot be made absolute.
    pub fn resolve() -> Result<Self> {
        let root = match config::env_var(CACHE_DIR_ENV) {
            Some(dir) if !dir.trim().is_empty() => expand_home(&dir),
            _ => dirs::cache_dir()
                .ok_or_else(|| {
                    Error::Environment("could not determine a user cache directory".to_string())
                })?
                .join("cellbind"),
        };
        Ok(Self::at(std::path::absolute(root)?))
    }

    /// Layout rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            build_dir: root.join("build"),
            modules_dir: root.join("modules"),
            root,
        }
    }

    /// Create all directories if they don't exist.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.build_dir)?;
        fs::create_dir_all(&self.modules_dir)?;
        Ok(())
    }

    /// Absolute path for `parts` relative to the cache root.
    pub fn path<I, P>(&self, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        parts
            .into_iter()
            .fold(self.root.clone(), |path, part| path.join(part))
    }

    /// Remove every cached artifact and recreate the empty layout.
    pub fn clean(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        self.ensure()
    }
}

/// Root cache directory, see [`CacheDirs::resolve`].
pub fn cache_dir() -> Result<PathBuf> {
    Ok(CacheDirs::resolve()?.root)
}

/// Absolute path for `parts` within the cache directory.
pub fn cache_path<I, P>(parts: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    Ok(CacheDirs::resolve()?.path(parts))
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let dirs = CacheDirs::at("/tmp/cellbind-cache");
        assert_eq!(dirs.build_dir, PathBuf::from("/tmp/cellbind-cache/build"));
        assert_eq!(dirs.modules_dir, PathBuf::from("/tmp/cellbind-cache/modules"));
        assert_eq!(
            dirs.path(["modules", "cell_1.so"]),
            PathBuf::from("/tmp/cellbind-cache/modules/cell_1.so")
        );
    }

    #[test]
    fn test_ensure_and_clean() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = CacheDirs::at(temp.path().join("cache"));

        dirs.ensure().expect("Failed to create dirs");
        assert!(dirs.build_dir.exists());
        assert!(dirs.modules_dir.exists());

        let stale = dirs.modules_dir.join("stale.so");
        fs::write(&stale, "old").expect("Failed to write test file");

        dirs.clean().expect("Failed to clean");
        assert!(!stale.exists());
        assert!(dirs.modules_dir.exists());
    }

    #[test]
    #[serial]
    fn test_resolve_from_env() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        // SAFETY: env mutation is serialized with every other env test
        unsafe { std::env::set_var(CACHE_DIR_ENV, temp.path()) };
        let resolved = CacheDirs::resolve();
        unsafe { std::env::remove_var(CACHE_DIR_ENV) };

        let dirs = resolved.expect("Failed to resolve");
        assert_eq!(dirs.root, temp.path());
        assert_eq!(dirs.path(["build", "a.o"]), temp.path().join("build").join("a.o"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/c"), home.join("c"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
