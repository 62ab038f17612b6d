//! The driver facade.
//!
//! [`Driver`] wires the option parser, link provisioner, registry, endpoint
//! manager and store coordinator together and exposes one method per
//! lifecycle request.

use std::sync::Arc;

use noipam_common::{NoipamError, NoipamResult, ObjectId};
use noipam_network::{IpLinks, LinkBackend, MacAddress};

use crate::api::{
    Capabilities, CreateEndpointRequest, CreateEndpointResponse, CreateNetworkRequest,
    EndpointInfo, EndpointInterface, JoinResult, NetworkCreation, RestoreReport, Scope,
};
use crate::config::DriverConfig;
use crate::coordinator::StoreCoordinator;
use crate::endpoint::EndpointContext;
use crate::options::{DRIVER_TYPE, NetworkConfiguration, parse_network};
use crate::provision::LinkProvisioner;
use crate::registry::{Claim, Network, NetworkRegistry, Registration};
use crate::store::{FileStore, Store};

/// A macvlan driver instance.
#[derive(Debug)]
pub struct Driver {
    config: DriverConfig,
    links: Arc<dyn LinkBackend>,
    store: StoreCoordinator,
    registry: NetworkRegistry,
}

impl Driver {
    /// Create a driver over a link backend and a store. The registry starts
    /// empty; call [`Driver::restore`] to replay persisted state.
    #[must_use]
    pub fn new(config: DriverConfig, links: Arc<dyn LinkBackend>, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            links,
            store: StoreCoordinator::new(store),
            registry: NetworkRegistry::new(),
        }
    }

    /// Create a driver over `ip(8)` and a [`FileStore`] under the
    /// configured root.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the process
    /// network namespace cannot be opened.
    pub fn with_defaults(config: DriverConfig) -> NoipamResult<Self> {
        config.validate()?;
        let links = Arc::new(IpLinks::new()?);
        let store = Arc::new(FileStore::new(config.paths.store()));
        Ok(Self::new(config, links, store))
    }

    /// The driver's capabilities.
    #[must_use]
    pub const fn capabilities() -> Capabilities {
        Capabilities {
            scope: Scope::Local,
        }
    }

    /// Name the driver registers under.
    #[must_use]
    pub const fn driver_type() -> &'static str {
        DRIVER_TYPE
    }

    /// The driver configuration.
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The network registry.
    #[must_use]
    pub const fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    fn provisioner(&self) -> LinkProvisioner<'_> {
        LinkProvisioner::new(self.links.as_ref(), &self.config.dummy_prefix)
    }

    fn endpoint_context(&self) -> EndpointContext<'_> {
        EndpointContext {
            links: self.links.as_ref(),
            store: &self.store,
            config: &self.config,
        }
    }

    /// Create a network.
    ///
    /// A request for an id that already exists with the same parent returns
    /// [`NetworkCreation::Restored`] without side effects.
    ///
    /// # Errors
    ///
    /// - Configuration error for invalid options or pools
    /// - Conflict error if the parent backs another network
    /// - Backend error if the parent link cannot be created
    /// - Store error if the network cannot be persisted; the network and
    ///   any link created for it are removed
    pub fn create_network(&self, request: &CreateNetworkRequest) -> NoipamResult<NetworkCreation> {
        tracing::info!(network_id = %request.network_id, "Handling CreateNetwork");

        let id = ObjectId::new(request.network_id.as_str())?;
        let parsed = parse_network(
            &id,
            &request.options,
            &request.ipv4_data,
            &self.config.dummy_prefix,
        )?;

        let _scope = self.links.enter_scope()?;
        let provisioner = self.provisioner();
        match self.registry.create(parsed.config, &provisioner)? {
            Registration::Existing => {
                tracing::info!(network_id = %id.short(), "Network already exists");
                Ok(NetworkCreation::Restored)
            }
            Registration::Created(network) => {
                self.store
                    .commit_network(&self.registry, &provisioner, &network)?;
                tracing::info!(
                    network_id = %id.short(),
                    parent = %network.parent(),
                    mode = %network.mode(),
                    created_slave_link = network.config().created_slave_link,
                    "Network created"
                );
                Ok(NetworkCreation::Created)
            }
        }
    }

    /// Delete a network with all its endpoints.
    ///
    /// Endpoints go first, then the parent link if the driver created it,
    /// then the network itself. Link and store failures are logged.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown network, or an error if the
    /// namespace scope cannot be entered.
    pub fn delete_network(&self, network_id: &str) -> NoipamResult<()> {
        tracing::info!(network_id, "Handling DeleteNetwork");

        let network = self.registry.get(network_id)?;
        let _scope = self.links.enter_scope()?;

        // Closing the network under its lock fences out concurrent endpoint
        // operations; a second delete finds it already closed.
        if !network.drain_endpoints(&self.endpoint_context()) {
            return Err(NoipamError::NetworkNotFound {
                id: network_id.to_string(),
            });
        }
        self.provisioner().release(network.config());
        self.registry.remove(network.id());
        self.store.remove_network(network.config());

        tracing::info!(network_id = %network.id().short(), "Network deleted");
        Ok(())
    }

    /// Create an endpoint.
    ///
    /// # Errors
    ///
    /// - Not-found error for an unknown network
    /// - Configuration error for an invalid id or MAC
    /// - Conflict error for a duplicate endpoint or MAC
    /// - Store error if the endpoint cannot be persisted
    pub fn create_endpoint(
        &self,
        request: &CreateEndpointRequest,
    ) -> NoipamResult<CreateEndpointResponse> {
        tracing::info!(
            network_id = %request.network_id,
            endpoint_id = %request.endpoint_id,
            "Handling CreateEndpoint"
        );

        let network = self.registry.get(&request.network_id)?;
        let id = ObjectId::new(request.endpoint_id.as_str())?;
        let mac = request
            .requested_mac()
            .map(str::parse::<MacAddress>)
            .transpose()
            .map_err(|e| NoipamError::config(e.to_string()))?;

        let endpoint = network.create_endpoint(&self.endpoint_context(), id, mac)?;
        Ok(CreateEndpointResponse {
            interface: EndpointInterface {
                mac_address: endpoint.mac.to_string(),
                ..EndpointInterface::default()
            },
        })
    }

    /// Create the endpoint's macvlan slave.
    ///
    /// # Errors
    ///
    /// - Not-found error for an unknown network or endpoint
    /// - Conflict error if the endpoint is already joined
    /// - Backend error if the slave cannot be created
    /// - Store error if the update cannot be persisted
    pub fn join(&self, network_id: &str, endpoint_id: &str) -> NoipamResult<JoinResult> {
        tracing::info!(network_id, endpoint_id, "Handling Join");

        let network = self.registry.get(network_id)?;
        let _scope = self.links.enter_scope()?;
        network.join(&self.endpoint_context(), endpoint_id)
    }

    /// Detach an endpoint. The interface is removed on endpoint delete.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown network or endpoint.
    pub fn leave(&self, network_id: &str, endpoint_id: &str) -> NoipamResult<()> {
        tracing::info!(network_id, endpoint_id, "Handling Leave");

        self.registry.get(network_id)?.leave(endpoint_id)
    }

    /// Delete an endpoint and its interface.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown network or endpoint, or an
    /// error if the namespace scope cannot be entered.
    pub fn delete_endpoint(&self, network_id: &str, endpoint_id: &str) -> NoipamResult<()> {
        tracing::info!(network_id, endpoint_id, "Handling DeleteEndpoint");

        let network = self.registry.get(network_id)?;
        let _scope = self.links.enter_scope()?;
        network.delete_endpoint(&self.endpoint_context(), endpoint_id)
    }

    /// Operational data about an endpoint.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown network or endpoint.
    pub fn endpoint_info(&self, network_id: &str, endpoint_id: &str) -> NoipamResult<EndpointInfo> {
        tracing::debug!(network_id, endpoint_id, "Handling EndpointOperInfo");

        let network = self.registry.get(network_id)?;
        let endpoint = network.endpoint(endpoint_id)?;
        Ok(EndpointInfo::new(&endpoint, network.parent()))
    }

    /// Look up a network.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown network.
    pub fn network(&self, network_id: &str) -> NoipamResult<Arc<Network>> {
        self.registry.get(network_id)
    }

    /// Configurations of all networks, ordered by id.
    #[must_use]
    pub fn networks(&self) -> Vec<NetworkConfiguration> {
        self.registry
            .list()
            .iter()
            .map(|network| network.config().clone())
            .collect()
    }

    /// Replay persisted networks and endpoints into memory.
    ///
    /// Networks already registered are skipped. Driver-owned parents that
    /// disappeared are recreated. Endpoints whose network is gone are
    /// removed from the store. Bad records are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store cannot be listed or the namespace
    /// scope cannot be entered.
    pub fn restore(&self) -> NoipamResult<RestoreReport> {
        let mut report = RestoreReport::default();
        let configs = self.store.load_networks()?;
        let endpoints = self.store.load_endpoints()?;

        let _scope = self.links.enter_scope()?;
        let provisioner = self.provisioner();
        for config in configs {
            let claim = match self.registry.claim(&config) {
                Ok(Claim::Fresh(claim)) => claim,
                Ok(Claim::Replay) => continue,
                Err(e) => {
                    tracing::warn!(network_id = %config.id.short(), error = %e, "Skipping stored network");
                    continue;
                }
            };
            if let Err(e) = provisioner.reconcile(&config) {
                tracing::warn!(
                    network_id = %config.id.short(),
                    parent = %config.parent,
                    error = %e,
                    "Failed to recreate parent link"
                );
            }
            claim.commit(config);
            report.networks += 1;
        }

        for endpoint in endpoints {
            match self.registry.get(endpoint.network_id.as_str()) {
                Ok(network) => {
                    if network.restore_endpoint(endpoint) {
                        report.endpoints += 1;
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        endpoint_id = %endpoint.id.short(),
                        network_id = %endpoint.network_id.short(),
                        "Removing endpoint of a missing network"
                    );
                    self.store.remove_endpoint(&endpoint);
                    report.orphans_removed += 1;
                }
            }
        }

        tracing::info!(
            networks = report.networks,
            endpoints = report.endpoints,
            orphans_removed = report.orphans_removed,
            "Restored driver state"
        );
        Ok(report)
    }
}
