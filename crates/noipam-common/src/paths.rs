//! Standard filesystem paths for noipam.

use std::path::PathBuf;

use once_cell::sync::Lazy;

/// Default root directory for driver state.
pub static NOIPAM_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("NOIPAM_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/noipam"))
});

/// Standard paths used by the driver.
#[derive(Debug, Clone)]
pub struct NoipamPaths {
    /// Root data directory (default: /var/lib/noipam).
    pub root: PathBuf,
}

impl NoipamPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create paths with a custom root directory.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for persisted network and endpoint records.
    #[must_use]
    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }
}

impl Default for NoipamPaths {
    fn default() -> Self {
        Self {
            root: NOIPAM_ROOT.clone(),
        }
    }
}
