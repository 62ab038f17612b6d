//! Network registry.
//!
//! The registry maps network ids to [`Network`]s and guarantees that a
//! parent link backs at most one network. The map lock is only held for
//! lookups and insertions: link I/O happens outside it, under a
//! [`ParentClaim`] that reserves the parent until the network is committed
//! or the claim is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use noipam_common::{NoipamError, NoipamResult, ObjectId};
use noipam_network::MacvlanMode;
use parking_lot::Mutex;

use crate::endpoint::Endpoint;
use crate::options::NetworkConfiguration;
use crate::provision::LinkProvisioner;

/// Endpoints of one network, guarded by the network's lock.
#[derive(Debug, Default)]
pub(crate) struct EndpointTable {
    pub(crate) entries: BTreeMap<ObjectId, Endpoint>,
    /// Set when the network is deleted; endpoints can no longer be added.
    pub(crate) closed: bool,
}

/// A registered network and its endpoints.
#[derive(Debug)]
pub struct Network {
    config: NetworkConfiguration,
    pub(crate) endpoints: Mutex<EndpointTable>,
}

impl Network {
    fn new(config: NetworkConfiguration) -> Self {
        Self {
            config,
            endpoints: Mutex::new(EndpointTable::default()),
        }
    }

    /// Network id.
    #[must_use]
    pub const fn id(&self) -> &ObjectId {
        &self.config.id
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &NetworkConfiguration {
        &self.config
    }

    /// Backing link.
    #[must_use]
    pub fn parent(&self) -> &str {
        &self.config.parent
    }

    /// Macvlan mode.
    #[must_use]
    pub const fn mode(&self) -> MacvlanMode {
        self.config.mode
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.endpoints.lock().closed
    }
}

/// Outcome of [`NetworkRegistry::create`].
#[derive(Debug)]
pub enum Registration {
    /// A new network was inserted.
    Created(Arc<Network>),
    /// The id is already registered (or being registered) with the same parent.
    Existing,
}

/// Outcome of [`NetworkRegistry::claim`].
#[derive(Debug)]
pub enum Claim<'a> {
    /// The parent is reserved for this id.
    Fresh(ParentClaim<'a>),
    /// The same id already holds the same parent.
    Replay,
}

/// Reservation of a parent link for a network being created.
///
/// Dropping the claim without [`ParentClaim::commit`] releases the parent.
#[derive(Debug)]
#[must_use = "dropping a claim releases the parent"]
pub struct ParentClaim<'a> {
    registry: &'a NetworkRegistry,
    id: ObjectId,
    parent: String,
    committed: bool,
}

impl ParentClaim<'_> {
    /// Insert the network, turning the reservation into a registration.
    pub fn commit(mut self, config: NetworkConfiguration) -> Arc<Network> {
        debug_assert_eq!(config.id, self.id);
        debug_assert_eq!(config.parent, self.parent);

        let network = Arc::new(Network::new(config));
        let mut state = self.registry.state.lock();
        state.pending.remove(&self.parent);
        state.networks.insert(self.id.clone(), Arc::clone(&network));
        self.committed = true;
        network
    }
}

impl Drop for ParentClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.state.lock().pending.remove(&self.parent);
            tracing::debug!(network_id = %self.id.short(), parent = %self.parent, "Released parent claim");
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    networks: BTreeMap<ObjectId, Arc<Network>>,
    /// Parents reserved by creates still doing link I/O.
    pending: BTreeMap<String, ObjectId>,
}

/// Thread-safe map of network id to network.
#[derive(Debug, Default)]
pub struct NetworkRegistry {
    state: Mutex<RegistryState>,
}

impl NetworkRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `config.parent` for `config.id`.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if another network holds or is claiming
    /// the parent, or if the id is registered with a different parent.
    pub fn claim(&self, config: &NetworkConfiguration) -> NoipamResult<Claim<'_>> {
        let mut state = self.state.lock();
        let (id, parent) = (&config.id, config.parent.as_str());

        if let Some(existing) = state.networks.get(id) {
            if existing.is_closed() {
                return Err(NoipamError::conflict(format!(
                    "network {} is being deleted",
                    id.short()
                )));
            }
            if existing.parent() == parent {
                tracing::debug!(network_id = %id.short(), "Create network for the same id");
                return Ok(Claim::Replay);
            }
            return Err(NoipamError::conflict(format!(
                "network {} already exists with parent interface {}",
                id.short(),
                existing.parent()
            )));
        }
        if let Some(owner) = state.networks.values().find(|n| n.parent() == parent) {
            return Err(NoipamError::conflict(format!(
                "network {} is already using parent interface {parent}",
                owner.id().short()
            )));
        }
        if let Some(owner) = state.pending.get(parent) {
            if owner == id {
                tracing::debug!(network_id = %id.short(), "Create network already in progress");
                return Ok(Claim::Replay);
            }
            return Err(NoipamError::conflict(format!(
                "network {} is already using parent interface {parent}",
                owner.short()
            )));
        }
        if let Some((other, _)) = state.pending.iter().find(|(_, owner)| *owner == id) {
            return Err(NoipamError::conflict(format!(
                "network {} is already being created with parent interface {other}",
                id.short()
            )));
        }

        state.pending.insert(parent.to_string(), id.clone());
        Ok(Claim::Fresh(ParentClaim {
            registry: self,
            id: id.clone(),
            parent: parent.to_string(),
            committed: false,
        }))
    }

    /// Register a network, provisioning its parent link if needed.
    ///
    /// Link I/O runs outside the map lock; the parent stays claimed until
    /// the network is inserted. `config.created_slave_link` is set by the
    /// provisioner.
    ///
    /// # Errors
    ///
    /// Returns a conflict error if the parent is taken, or any error from
    /// the provisioner. Nothing stays registered on error.
    pub fn create(
        &self,
        mut config: NetworkConfiguration,
        provisioner: &LinkProvisioner<'_>,
    ) -> NoipamResult<Registration> {
        let claim = match self.claim(&config)? {
            Claim::Replay => return Ok(Registration::Existing),
            Claim::Fresh(claim) => claim,
        };

        provisioner.ensure(&mut config)?;
        Ok(Registration::Created(claim.commit(config)))
    }

    /// Look up a network.
    ///
    /// # Errors
    ///
    /// Returns [`NoipamError::NetworkNotFound`] for unknown ids.
    pub fn get(&self, id: &str) -> NoipamResult<Arc<Network>> {
        self.state
            .lock()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| NoipamError::NetworkNotFound { id: id.to_string() })
    }

    /// Remove a network from the map.
    ///
    /// Callers drain its endpoints and release its link first.
    pub fn remove(&self, id: &ObjectId) -> Option<Arc<Network>> {
        self.state.lock().networks.remove(id)
    }

    /// All networks, ordered by id.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<Network>> {
        self.state.lock().networks.values().cloned().collect()
    }

    /// Number of registered networks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().networks.len()
    }

    /// Whether no network is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noipam_network::{LinkBackend, MemoryLinks};

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
    fn claim_then_commit() {
        let registry = NetworkRegistry::new();
        let Claim::Fresh(claim) = registry.claim(&config("net1", "eth0")).unwrap() else {
            panic!("expected fresh claim");
        };
        let network = claim.commit(config("net1", "eth0"));
        assert_eq!(network.parent(), "eth0");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("net1").unwrap().parent(), "eth0");
    }

    #[test]
    fn dropped_claim_releases_parent() {
        let registry = NetworkRegistry::new();
        {
            let claim = registry.claim(&config("net1", "eth0")).unwrap();
            assert!(matches!(claim, Claim::Fresh(_)));
            assert!(registry.claim(&config("net2", "eth0")).is_err());
        }
        assert!(matches!(
            registry.claim(&config("net2", "eth0")).unwrap(),
            Claim::Fresh(_)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn pending_claim_for_same_id_is_a_replay() {
        let registry = NetworkRegistry::new();
        let _first = registry.claim(&config("net1", "eth0")).unwrap();
        assert!(matches!(
            registry.claim(&config("net1", "eth0")).unwrap(),
            Claim::Replay
        ));
        assert!(registry.claim(&config("net1", "eth1")).is_err());
    }

    #[test]
    fn parent_conflicts() {
        let links = MemoryLinks::with_physical(["eth0", "eth1"]);
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let registry = NetworkRegistry::new();

        registry.create(config("net1", "eth0"), &provisioner).unwrap();
        let err = registry
            .create(config("net2", "eth0"), &provisioner)
            .unwrap_err();
        assert_eq!(err.kind(), noipam_common::ErrorKind::Conflict);

        let err = registry
            .create(config("net1", "eth1"), &provisioner)
            .unwrap_err();
        assert_eq!(err.kind(), noipam_common::ErrorKind::Conflict);

        assert!(matches!(
            registry.create(config("net1", "eth0"), &provisioner).unwrap(),
            Registration::Existing
        ));
        assert_eq!(links.mutations(), 0);
    }

    #[test]
    fn failed_provisioning_registers_nothing() {
        let links = MemoryLinks::new();
        let provisioner = LinkProvisioner::new(&links, "dm-");
        let registry = NetworkRegistry::new();

        assert!(registry
            .create(config("net1", "nope.10"), &provisioner)
            .is_err());
        assert!(registry.is_empty());
        assert!(!links.link_exists("nope.10"));
        assert!(matches!(
            registry.claim(&config("net2", "nope.10")).unwrap(),
            Claim::Fresh(_)
        ));
    }

    #[test]
    fn get_and_remove() {
        let registry = NetworkRegistry::new();
        assert!(matches!(
            registry.get("net1").unwrap_err(),
            NoipamError::NetworkNotFound { .. }
        ));

        let Claim::Fresh(claim) = registry.claim(&config("net1", "eth0")).unwrap() else {
            panic!("expected fresh claim");
        };
        claim.commit(config("net1", "eth0"));
        assert_eq!(registry.get("net1").unwrap().id().as_str(), "net1");

        let id = ObjectId::new("net1").unwrap();
        assert!(registry.remove(&id).is_some());
        assert!(registry.get("net1").is_err());
    }
}
