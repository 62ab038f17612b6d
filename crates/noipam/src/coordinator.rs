//! Store coordination.
//!
//! The [`StoreCoordinator`] mirrors networks and endpoints into a [`Store`].
//! It never owns anything: the registry owns networks, networks own their
//! endpoints. Network creation is all-or-nothing, so a failed network
//! write undoes the registration and releases the link. Deletes only warn.

use std::sync::Arc;

use noipam_common::NoipamResult;

use crate::endpoint::Endpoint;
use crate::options::NetworkConfiguration;
use crate::provision::LinkProvisioner;
use crate::registry::{Network, NetworkRegistry};
use crate::store::{RecordKind, Store, StoreKey, StoreRecord};

/// Persists and removes driver records.
#[derive(Debug, Clone)]
pub struct StoreCoordinator {
    store: Arc<dyn Store>,
}

impl StoreCoordinator {
    /// Create a coordinator over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Save a network configuration.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub fn persist_network(&self, config: &NetworkConfiguration) -> NoipamResult<()> {
        let record = StoreRecord::Network(config.clone());
        self.store.put(&record.key(), &record)
    }

    /// Save a freshly registered network, undoing the registration if the
    /// write fails.
    ///
    /// # Errors
    ///
    /// Returns the store error after the network has been removed from the
    /// registry and its driver-owned link released.
    pub fn commit_network(
        &self,
        registry: &NetworkRegistry,
        provisioner: &LinkProvisioner<'_>,
        network: &Network,
    ) -> NoipamResult<()> {
        let Err(e) = self.persist_network(network.config()) else {
            return Ok(());
        };

        tracing::error!(
            network_id = %network.id().short(),
            error = %e,
            "Failed to persist network, rolling back"
        );
        registry.remove(network.id());
        provisioner.release(network.config());
        Err(e)
    }

    /// Remove a network record, logging failures.
    pub fn remove_network(&self, config: &NetworkConfiguration) {
        let key = StoreKey::network(config.id.as_str());
        if let Err(e) = self.store.delete(&key) {
            tracing::warn!(key = %key, error = %e, "Failed to delete network from store");
        }
    }

    /// Save an endpoint.
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails.
    pub fn persist_endpoint(&self, endpoint: &Endpoint) -> NoipamResult<()> {
        let record = StoreRecord::Endpoint(endpoint.clone());
        self.store.put(&record.key(), &record)
    }

    /// Remove an endpoint record, logging failures.
    pub fn remove_endpoint(&self, endpoint: &Endpoint) {
        let key = StoreKey::endpoint(endpoint.network_id.as_str(), endpoint.id.as_str());
        if let Err(e) = self.store.delete(&key) {
            tracing::warn!(key = %key, error = %e, "Failed to delete endpoint from store");
        }
    }

    /// All persisted network configurations.
    ///
    /// # Errors
    ///
    /// Returns a store error if the records cannot be listed.
    pub fn load_networks(&self) -> NoipamResult<Vec<NetworkConfiguration>> {
        Ok(self
            .store
            .list(RecordKind::Network)?
            .into_iter()
            .filter_map(|record| match record {
                StoreRecord::Network(config) => Some(config),
                StoreRecord::Endpoint(_) => None,
            })
            .collect())
    }

    /// All persisted endpoints.
    ///
    /// # Errors
    ///
    /// Returns a store error if the records cannot be listed.
    pub fn load_endpoints(&self) -> NoipamResult<Vec<Endpoint>> {
        Ok(self
            .store
            .list(RecordKind::Endpoint)?
            .into_iter()
            .filter_map(|record| match record {
                StoreRecord::Endpoint(endpoint) => Some(endpoint),
                StoreRecord::Network(_) => None,
            })
            .collect())
    }
}
