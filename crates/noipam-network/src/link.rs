//! Host link backend.
//!
//! [`LinkBackend`] lists the link operations the driver needs from the host.
//! [`IpLinks`] implements them on top of the `ip(8)` command.

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::process::Command;

use noipam_common::{NoipamError, NoipamResult};

use crate::ifname::generate_interface_name;
use crate::modes::MacvlanMode;
use crate::netns::NetnsScope;
use crate::vlan::VlanSubinterface;

/// Link operations required by the driver.
pub trait LinkBackend: Send + Sync + fmt::Debug {
    /// Enter the namespace link mutations must be attributed to.
    ///
    /// The returned guard must be held for the duration of the mutation.
    fn enter_scope(&self) -> NoipamResult<NetnsScope>;

    /// Whether an interface with this name exists.
    fn link_exists(&self, name: &str) -> bool;

    /// Create a dummy link and bring it up.
    fn create_dummy(&self, name: &str) -> NoipamResult<()>;

    /// Create a VLAN sub-interface on top of its base interface and bring it up.
    fn create_vlan(&self, vlan: &VlanSubinterface) -> NoipamResult<()>;

    /// Delete a link. Deleting a link that does not exist is not an error.
    fn delete_link(&self, name: &str) -> NoipamResult<()>;

    /// Create a macvlan slave of `parent`, returning the resulting name.
    fn create_macvlan(&self, name: &str, parent: &str, mode: MacvlanMode)
    -> NoipamResult<String>;

    /// Generate an interface name that no live link uses.
    fn generate_interface_name(
        &self,
        prefix: &str,
        len: usize,
        attempts: usize,
    ) -> NoipamResult<String> {
        generate_interface_name(&mut rand::rng(), prefix, len, attempts, |name| {
            self.link_exists(name)
        })
    }
}

/// `ip(8)` backed links in the process's initial network namespace.
pub struct IpLinks {
    binary: PathBuf,
    namespace: File,
}

impl IpLinks {
    /// Create a backend using `ip` from `PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the process network namespace cannot be opened.
    pub fn new() -> NoipamResult<Self> {
        Ok(Self {
            binary: PathBuf::from("ip"),
            namespace: NetnsScope::process_namespace()?,
        })
    }

    /// Use a specific `ip` binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn run(&self, operation: &str, args: &[&str]) -> NoipamResult<()> {
        tracing::trace!(operation, ?args, "Running ip");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| NoipamError::backend(operation, format!("Failed to run ip command: {e}")))?;

        if !output.status.success() {
            return Err(NoipamError::backend(
                operation,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(())
    }

    fn set_up(&self, name: &str) -> NoipamResult<()> {
        self.run("link set up", &["link", "set", "dev", name, "up"])
    }
}

impl fmt::Debug for IpLinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpLinks")
            .field("binary", &self.binary)
            .finish_non_exhaustive()
    }
}

impl LinkBackend for IpLinks {
    fn enter_scope(&self) -> NoipamResult<NetnsScope> {
        NetnsScope::enter(&self.namespace)
    }

    fn link_exists(&self, name: &str) -> bool {
        Command::new(&self.binary)
            .args(["link", "show", "dev", name])
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn create_dummy(&self, name: &str) -> NoipamResult<()> {
        self.run("create dummy", &["link", "add", name, "type", "dummy"])?;
        if let Err(e) = self.set_up(name) {
            if let Err(del) = self.delete_link(name) {
                tracing::warn!(name = %name, error = %del, "Failed to remove link after bring-up failure");
            }
            return Err(e);
        }

        tracing::info!(name, "Dummy link created");
        Ok(())
    }

    fn create_vlan(&self, vlan: &VlanSubinterface) -> NoipamResult<()> {
        let name = vlan.name();
        let id = vlan.vlan_id().to_string();
        self.run(
            "create vlan",
            &[
                "link",
                "add",
                "link",
                vlan.base(),
                "name",
                &name,
                "type",
                "vlan",
                "id",
                &id,
            ],
        )?;
        if let Err(e) = self.set_up(&name) {
            if let Err(del) = self.delete_link(&name) {
                tracing::warn!(name = %name, error = %del, "Failed to remove link after bring-up failure");
            }
            return Err(e);
        }

        tracing::info!(name = %name, base = vlan.base(), vlan_id = vlan.vlan_id(), "VLAN link created");
        Ok(())
    }

    fn delete_link(&self, name: &str) -> NoipamResult<()> {
        let output = Command::new(&self.binary)
            .args(["link", "delete", "dev", name])
            .output()
            .map_err(|e| NoipamError::backend("delete link", format!("Failed to run ip command: {e}")))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success()
            && !stderr.contains("not exist")
            && !stderr.contains("Cannot find device")
        {
            return Err(NoipamError::backend("delete link", stderr.trim().to_string()));
        }

        tracing::debug!(name, "Link deleted");
        Ok(())
    }

    fn create_macvlan(
        &self,
        name: &str,
        parent: &str,
        mode: MacvlanMode,
    ) -> NoipamResult<String> {
        if !self.link_exists(parent) {
            return Err(NoipamError::backend(
                "create macvlan",
                format!("the requested parent interface {parent} was not found on the host"),
            ));
        }

        self.run(
            "create macvlan",
            &[
                "link",
                "add",
                name,
                "link",
                parent,
                "type",
                "macvlan",
                "mode",
                mode.as_str(),
            ],
        )?;

        tracing::info!(parent, name, mode = %mode, "Macvlan interface created");
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_a_backend_error() {
        let Ok(links) = IpLinks::new() else {
            return;
        };
        let links = links.with_binary("/nonexistent/ip");
        assert!(!links.link_exists("lo"));

        let err = links.create_dummy("dm-test").unwrap_err();
        assert_eq!(err.kind(), noipam_common::ErrorKind::Backend);
    }

    #[cfg(unix)]
    #[test_log::test]
    fn failed_bring_up_removes_the_new_link() {
        use std::os::unix::fs::PermissionsExt;

        let Ok(links) = IpLinks::new() else {
            return;
        };
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let script = dir.path().join("ip");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$*\" >> '{calls}'\ncase \"$2\" in\n  set) echo 'Operation not permitted' >&2; exit 2 ;;\n  delete) echo 'Device or resource busy' >&2; exit 2 ;;\nesac\n",
                calls = calls.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let links = links.with_binary(&script);

        let err = links.create_dummy("dm-test").unwrap_err();
        assert!(err.to_string().contains("link set up"), "{err}");
        let vlan = VlanSubinterface::parse("eth0.10").unwrap();
        let err = links.create_vlan(&vlan).unwrap_err();
        assert!(err.to_string().contains("Operation not permitted"), "{err}");

        let calls = std::fs::read_to_string(calls).unwrap();
        assert!(calls.contains("link delete dev dm-test"), "{calls}");
        assert!(calls.contains("link delete dev eth0.10"), "{calls}");
    }

    #[test]
    fn nonexistent_link_is_absent() {
        let Ok(links) = IpLinks::new() else {
            return;
        };
        assert!(!links.link_exists("noipam_nx_12345"));
    }
}
