//! On-disk locations used by the client.

use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// Resolved application directories.
///
/// Everything lives under `~/.classhopper` unless `CLASSHOPPER_HOME` points
/// somewhere else.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    pub fn new() -> CoreResult<Self> {
        if let Ok(home) = std::env::var("CLASSHOPPER_HOME") {
            if !home.is_empty() {
                return Ok(Self::with_base(home));
            }
        }

        let home = dirs::home_dir().ok_or(CoreError::NoHomeDir)?;
        Ok(Self::with_base(home.join(".classhopper")))
    }

    /// Use an explicit base directory (tests, sandboxed targets).
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    /// File backing the session store (device identity).
    pub fn store_file(&self) -> PathBuf {
        self.base_dir.join("session-store.json")
    }

    /// Create the base and logs directories if missing.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
