//! Endpoint lifecycle.
//!
//! An endpoint moves through `created -> joined -> deleted`. Creating it
//! assigns a MAC and persists it; joining creates the macvlan slave the
//! runtime moves into the container; leaving only validates; deleting
//! tears the slave down and forgets the endpoint.

use std::fmt;

use noipam_common::{NoipamError, NoipamResult, ObjectId};
use noipam_network::{LinkBackend, MacAddress};
use serde::{Deserialize, Serialize};

use crate::api::{InterfaceName, JoinResult};
use crate::config::DriverConfig;
use crate::coordinator::StoreCoordinator;
use crate::registry::Network;

/// Where an endpoint is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointState {
    /// Created, no interface yet.
    Created,
    /// A host-side interface exists.
    Joined,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Joined => write!(f, "joined"),
        }
    }
}

/// One container attachment point in a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Endpoint id.
    pub id: ObjectId,
    /// Owning network.
    pub network_id: ObjectId,
    /// Assigned MAC address.
    pub mac: MacAddress,
    /// Host-side interface, set on join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_name: Option<String>,
}

impl Endpoint {
    /// A freshly created endpoint.
    #[must_use]
    pub const fn new(id: ObjectId, network_id: ObjectId, mac: MacAddress) -> Self {
        Self {
            id,
            network_id,
            mac,
            src_name: None,
        }
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        if self.src_name.is_some() {
            EndpointState::Joined
        } else {
            EndpointState::Created
        }
    }
}

/// What endpoint operations need besides the network itself.
#[derive(Debug, Clone, Copy)]
pub struct EndpointContext<'a> {
    /// Host links.
    pub links: &'a dyn LinkBackend,
    /// Record persistence.
    pub store: &'a StoreCoordinator,
    /// Naming and retry policy.
    pub config: &'a DriverConfig,
}

impl EndpointContext<'_> {
    fn remove_interface(&self, endpoint: &Endpoint) {
        let Some(name) = endpoint.src_name.as_deref() else {
            return;
        };
        if !self.links.link_exists(name) {
            return;
        }
        if let Err(e) = self.links.delete_link(name) {
            tracing::warn!(
                interface = name,
                endpoint_id = %endpoint.id.short(),
                error = %e,
                "Failed to delete interface on endpoint delete"
            );
        }
    }
}

impl Network {
    /// Create an endpoint, assigning `requested_mac` or a generated
    /// locally administered MAC, and persist it.
    ///
    /// # Errors
    ///
    /// - Configuration error for a multicast or zero MAC
    /// - Conflict error for a duplicate id, a MAC already used in this
    ///   network, or when no free MAC was generated within the retry bound
    /// - Store error if the record cannot be saved; nothing is kept then
    pub fn create_endpoint(
        &self,
        ctx: &EndpointContext<'_>,
        id: ObjectId,
        requested_mac: Option<MacAddress>,
    ) -> NoipamResult<Endpoint> {
        let mut table = self.endpoints.lock();
        if table.closed {
            return Err(self.network_not_found());
        }
        let endpoints = &mut table.entries;
        if endpoints.contains_key(&id) {
            return Err(NoipamError::conflict(format!(
                "endpoint {} already exists in network {}",
                id.short(),
                self.id().short()
            )));
        }

        let in_use = |mac: &MacAddress| endpoints.values().any(|ep| ep.mac == *mac);
        let mac = match requested_mac {
            Some(mac) if mac.is_zero() || mac.is_multicast() => {
                return Err(NoipamError::config(format!(
                    "MAC address {mac} is not a valid unicast address"
                )));
            }
            Some(mac) if in_use(&mac) => {
                return Err(NoipamError::conflict(format!(
                    "MAC address {mac} is already used in network {}",
                    self.id().short()
                )));
            }
            Some(mac) => mac,
            None => {
                let mut rng = rand::rng();
                (0..ctx.config.mac_retries)
                    .map(|_| MacAddress::random_local(&mut rng))
                    .find(|mac| !in_use(mac))
                    .ok_or_else(|| {
                        NoipamError::conflict(format!(
                            "could not generate a unique MAC address after {} attempts",
                            ctx.config.mac_retries
                        ))
                    })?
            }
        };

        let endpoint = Endpoint::new(id, self.id().clone(), mac);
        ctx.store.persist_endpoint(&endpoint)?;
        endpoints.insert(endpoint.id.clone(), endpoint.clone());

        tracing::debug!(
            network_id = %self.id().short(),
            endpoint_id = %endpoint.id.short(),
            mac = %endpoint.mac,
            "Endpoint created"
        );
        Ok(endpoint)
    }

    /// Create the endpoint's macvlan slave on this network's parent.
    ///
    /// # Errors
    ///
    /// - Not-found error for an unknown endpoint
    /// - Conflict error if the endpoint is already joined, or no free
    ///   interface name was found
    /// - Backend error if the slave cannot be created
    /// - Store error if the update cannot be saved; the slave is removed
    pub fn join(&self, ctx: &EndpointContext<'_>, id: &str) -> NoipamResult<JoinResult> {
        let mut table = self.endpoints.lock();
        if table.closed {
            return Err(self.network_not_found());
        }
        let endpoint = table
            .entries
            .get_mut(id)
            .ok_or_else(|| self.endpoint_not_found(id))?;

        if let Some(name) = &endpoint.src_name {
            return Err(NoipamError::conflict(format!(
                "endpoint {} is already joined with interface {name}",
                endpoint.id.short()
            )));
        }

        let name = ctx.links.generate_interface_name(
            &ctx.config.veth_prefix,
            ctx.config.veth_suffix_len,
            ctx.config.name_retries,
        )?;
        let name = ctx.links.create_macvlan(&name, self.parent(), self.mode())?;

        endpoint.src_name = Some(name.clone());
        if let Err(e) = ctx.store.persist_endpoint(endpoint) {
            endpoint.src_name = None;
            if let Err(del) = ctx.links.delete_link(&name) {
                tracing::warn!(interface = %name, error = %del, "Failed to remove interface after store failure");
            }
            return Err(e);
        }

        tracing::debug!(
            network_id = %self.id().short(),
            endpoint_id = %endpoint.id.short(),
            interface = %name,
            "Endpoint joined"
        );
        Ok(JoinResult {
            interface_name: InterfaceName {
                src_name: name,
                dst_prefix: ctx.config.container_prefix.clone(),
            },
            disable_gateway_service: true,
        })
    }

    /// Check the endpoint exists. The interface stays until the endpoint
    /// is deleted.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown endpoint.
    pub fn leave(&self, id: &str) -> NoipamResult<()> {
        if self.endpoints.lock().entries.contains_key(id) {
            Ok(())
        } else {
            Err(self.endpoint_not_found(id))
        }
    }

    /// Delete an endpoint, its interface and its record.
    ///
    /// Interface and store failures are logged; the endpoint is always
    /// forgotten.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown endpoint.
    pub fn delete_endpoint(&self, ctx: &EndpointContext<'_>, id: &str) -> NoipamResult<()> {
        let mut table = self.endpoints.lock();
        let endpoint = table
            .entries
            .remove(id)
            .ok_or_else(|| self.endpoint_not_found(id))?;

        ctx.remove_interface(&endpoint);
        ctx.store.remove_endpoint(&endpoint);
        Ok(())
    }

    /// A snapshot of one endpoint.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown endpoint.
    pub fn endpoint(&self, id: &str) -> NoipamResult<Endpoint> {
        self.endpoints
            .lock()
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| self.endpoint_not_found(id))
    }

    /// Snapshots of all endpoints, ordered by id.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints.lock().entries.values().cloned().collect()
    }

    /// Close the network to new endpoints and tear down the existing ones,
    /// best-effort. Returns `false` if the network was already closed.
    pub(crate) fn drain_endpoints(&self, ctx: &EndpointContext<'_>) -> bool {
        let drained = {
            let mut table = self.endpoints.lock();
            if table.closed {
                return false;
            }
            table.closed = true;
            std::mem::take(&mut table.entries)
        };
        for endpoint in drained.values() {
            ctx.remove_interface(endpoint);
            ctx.store.remove_endpoint(endpoint);
        }
        true
    }

    /// Re-attach an endpoint read back from the store.
    pub(crate) fn restore_endpoint(&self, endpoint: Endpoint) -> bool {
        let mut table = self.endpoints.lock();
        if table.closed || table.entries.contains_key(&endpoint.id) {
            return false;
        }
        table.entries.insert(endpoint.id.clone(), endpoint);
        true
    }

    fn network_not_found(&self) -> NoipamError {
        NoipamError::NetworkNotFound {
            id: self.id().to_string(),
        }
    }

    fn endpoint_not_found(&self, id: &str) -> NoipamError {
        NoipamError::EndpointNotFound {
            network: self.id().to_string(),
            id: id.to_string(),
        }
    }
}
