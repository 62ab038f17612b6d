//! Parent link provisioning.
//!
//! A network's parent is either an existing host interface, a VLAN
//! sub-interface the driver creates on an existing base, or a dummy link
//! the driver creates when no parent was given. Only links the driver
//! created are ever removed, and only while their name still matches the
//! shape the driver gave them.

use noipam_common::{NoipamError, NoipamResult};
use noipam_network::{LinkBackend, VlanSubinterface};

use crate::options::NetworkConfiguration;

/// Creates and releases parent links.
#[derive(Debug, Clone, Copy)]
pub struct LinkProvisioner<'a> {
    links: &'a dyn LinkBackend,
    dummy_prefix: &'a str,
}

impl<'a> LinkProvisioner<'a> {
    /// Create a provisioner over a link backend.
    #[must_use]
    pub const fn new(links: &'a dyn LinkBackend, dummy_prefix: &'a str) -> Self {
        Self {
            links,
            dummy_prefix,
        }
    }

    /// Make sure `config.parent` exists, creating it if it is the network's
    /// dummy link or a VLAN sub-interface of an existing interface.
    ///
    /// Sets `config.created_slave_link` when a link was created.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parent is missing and its name
    /// is neither the dummy name nor `<existing interface>.<vlan id>`, or a
    /// backend error if link creation fails.
    pub fn ensure(&self, config: &mut NetworkConfiguration) -> NoipamResult<()> {
        if self.links.link_exists(&config.parent) {
            tracing::debug!(
                network_id = %config.id.short(),
                parent = %config.parent,
                "Using existing parent interface"
            );
            return Ok(());
        }

        if config.uses_dummy_parent(self.dummy_prefix) {
            self.links.create_dummy(&config.parent)?;
            tracing::debug!(
                parent = %config.parent,
                "Empty -o parent= limits communications to other containers inside of network"
            );
        } else {
            let vlan = VlanSubinterface::parse(&config.parent)?;
            if !self.links.link_exists(vlan.base()) {
                return Err(NoipamError::config(format!(
                    "the requested parent interface {} was not found on the host",
                    vlan.base()
                )));
            }
            self.links.create_vlan(&vlan)?;
        }

        config.created_slave_link = true;
        tracing::info!(network_id = %config.id.short(), parent = %config.parent, "Created parent link");
        Ok(())
    }

    /// Recreate a driver-owned parent that disappeared while the driver was
    /// not running. Links the driver does not own are left alone.
    ///
    /// # Errors
    ///
    /// Returns the provisioning error; callers treat it as a warning.
    pub fn reconcile(&self, config: &NetworkConfiguration) -> NoipamResult<()> {
        if !config.created_slave_link || self.links.link_exists(&config.parent) {
            return Ok(());
        }
        let mut recreated = config.clone();
        self.ensure(&mut recreated)
    }

    /// Remove the parent link if the driver created it.
    ///
    /// Best-effort: failures are logged, never returned.
    pub fn release(&self, config: &NetworkConfiguration) {
        if !config.created_slave_link {
            tracing::debug!(parent = %config.parent, "Parent link not created by the driver, leaving it");
            return;
        }
        if !self.links.link_exists(&config.parent) {
            return;
        }
        if !config.uses_dummy_parent(self.dummy_prefix)
            && VlanSubinterface::parse(&config.parent).is_err()
        {
            tracing::warn!(
                network_id = %config.id.short(),
                parent = %config.parent,
                "Parent link no longer matches a driver-created name, leaving it"
            );
            return;
        }

        match self.links.delete_link(&config.parent) {
            Ok(()) => tracing::info!(parent = %config.parent, "Deleted parent link"),
            Err(e) => tracing::warn!(
                parent = %config.parent,
                error = %e,
                "Link was not deleted, continuing the delete network operation"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noipam_common::{ErrorKind, ObjectId};
    use noipam_network::{LinkKind, LinkOp, MacvlanMode, MemoryLinks};

    fn config(id: &str, parent: &str) -> NetworkConfiguration {
        NetworkConfiguration {
            id: ObjectId::new(id).unwrap(),
            parent: parent.to_string(),
            mode: MacvlanMode::Bridge,
            internal: false,
            created_slave_link: false,
        }
    }

    #[test]
    fn creates_dummy_parent() {
        let links = MemoryLinks::new();
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "dm-net1");

        provisioner.ensure(&mut cfg).unwrap();
        assert!(cfg.created_slave_link);
        assert_eq!(links.kind("dm-net1"), Some(LinkKind::Dummy));
    }

    #[test]
    fn creates_vlan_parent() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "eth0.10");

        provisioner.ensure(&mut cfg).unwrap();
        assert!(cfg.created_slave_link);
        assert!(matches!(links.kind("eth0.10"), Some(LinkKind::Vlan { vlan_id: 10, .. })));
    }

    #[test]
    fn existing_parent_is_untouched() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "eth0");

        provisioner.ensure(&mut cfg).unwrap();
        assert!(!cfg.created_slave_link);

        provisioner.release(&cfg);
        assert!(links.link_exists("eth0"));
        assert_eq!(links.mutations(), 0);
    }

    #[test]
    fn rejects_unparseable_or_baseless_parent() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");

        let err = provisioner.ensure(&mut config("net1", "eth9")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = provisioner.ensure(&mut config("net1", "eth9.10")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(links.mutations(), 0);
    }

    #[test]
    fn rejects_vlan_id_with_leading_zeros() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "eth0.010");

        let err = provisioner.ensure(&mut cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!cfg.created_slave_link);
        assert!(!links.link_exists("eth0.10"));
        assert_eq!(links.mutations(), 0);
    }

    #[test]
    fn backend_failure_is_surfaced() {
        let links = MemoryLinks::new();
        links.fail(LinkOp::CreateDummy);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "dm-net1");

        let err = provisioner.ensure(&mut cfg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Backend);
        assert!(!cfg.created_slave_link);
    }

    #[test]
    fn release_skips_renamed_links() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");

        let mut cfg = config("net1", "custom");
        cfg.created_slave_link = true;
        links.add_physical("custom");
        provisioner.release(&cfg);
        assert!(links.link_exists("custom"));
    }

    #[test]
    fn release_tolerates_failures() {
        let links = MemoryLinks::new();
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "dm-net1");
        provisioner.ensure(&mut cfg).unwrap();

        links.fail(LinkOp::Delete);
        provisioner.release(&cfg);
        assert!(links.link_exists("dm-net1"));

        links.heal(LinkOp::Delete);
        provisioner.release(&cfg);
        assert!(!links.link_exists("dm-net1"));
    }

    #[test]
    fn reconcile_recreates_missing_owned_link() {
        let links = MemoryLinks::with_physical(["eth0"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let mut cfg = config("net1", "eth0.20");
        provisioner.ensure(&mut cfg).unwrap();

        links.remove_out_of_band("eth0.20");
        provisioner.reconcile(&cfg).unwrap();
        assert!(links.link_exists("eth0.20"));

        let foreign = config("net2", "eth7");
        provisioner.reconcile(&foreign).unwrap();
        assert!(!links.link_exists("eth7"));
    }
}
