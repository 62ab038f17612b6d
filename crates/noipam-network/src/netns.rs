//! Network namespace scoping for link mutations.

use std::fs::File;

use noipam_common::NoipamResult;

/// Path of the calling thread's network namespace.
#[cfg(target_os = "linux")]
const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// RAII guard that keeps the calling thread in the driver's network
/// namespace while links are created or deleted.
///
/// Dropping the guard moves the thread back to the namespace it was in
/// before [`NetnsScope::enter`].
#[derive(Debug)]
#[must_use = "the namespace is restored when the scope is dropped"]
pub struct NetnsScope {
    restore: Option<File>,
}

impl NetnsScope {
    /// A scope that does nothing, for backends without a namespace.
    pub const fn noop() -> Self {
        Self { restore: None }
    }

    /// Opens the network namespace the process started in.
    ///
    /// # Errors
    ///
    /// Returns an error if `/proc/self/ns/net` cannot be opened.
    pub fn process_namespace() -> NoipamResult<File> {
        Ok(File::open("/proc/self/ns/net")?)
    }

    /// Switch the calling thread into `target` unless it is already there.
    ///
    /// # Errors
    ///
    /// Returns a backend error if `setns(2)` fails.
    #[cfg(target_os = "linux")]
    pub fn enter(target: &File) -> NoipamResult<Self> {
        use std::os::unix::fs::MetadataExt;

        let current = File::open(THREAD_NETNS)?;
        let (cur, tgt) = (current.metadata()?, target.metadata()?);
        if cur.dev() == tgt.dev() && cur.ino() == tgt.ino() {
            return Ok(Self::noop());
        }

        setns(target)?;
        tracing::debug!("Entered driver network namespace");
        Ok(Self {
            restore: Some(current),
        })
    }

    /// Namespaces are a Linux feature.
    ///
    /// # Errors
    ///
    /// Always returns [`noipam_common::NoipamError::Unsupported`].
    #[cfg(not(target_os = "linux"))]
    pub fn enter(_target: &File) -> NoipamResult<Self> {
        Err(noipam_common::NoipamError::Unsupported {
            feature: "network namespaces".to_string(),
        })
    }
}

impl Drop for NetnsScope {
    fn drop(&mut self) {
        #[cfg(target_os = "linux")]
        if let Some(previous) = self.restore.take() {
            if let Err(e) = setns(&previous) {
                tracing::warn!(error = %e, "Failed to restore network namespace");
            }
        }
    }
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn setns(ns: &File) -> NoipamResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `ns` and stays open for the call.
    let rc = unsafe { libc::setns(ns.as_raw_fd(), libc::CLONE_NEWNET) };
    if rc != 0 {
        return Err(noipam_common::NoipamError::backend(
            "setns",
            std::io::Error::last_os_error().to_string(),
        ));
    }
    Ok(())
}
