//! Request and response types.
//!
//! Field names follow the container runtime's network plugin payloads, so
//! a protocol layer can deserialize requests straight into these types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::endpoint::{Endpoint, EndpointState};
use crate::options::{PoolDescriptor, RawOptions};

/// Scope a driver operates at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Networks exist on this host only.
    Local,
    /// Networks span a cluster.
    Global,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Driver capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    /// Operating scope.
    pub scope: Scope,
}

/// Create network request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateNetworkRequest {
    /// Network id.
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    /// Option bag.
    #[serde(rename = "Options", default)]
    pub options: RawOptions,
    /// IPv4 pools from the runtime's IPAM.
    #[serde(rename = "IPv4Data", default)]
    pub ipv4_data: Vec<PoolDescriptor>,
    /// IPv6 pools; not inspected.
    #[serde(rename = "IPv6Data", default)]
    pub ipv6_data: Vec<PoolDescriptor>,
}

impl CreateNetworkRequest {
    /// A request with no options.
    pub fn new(network_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            ..Self::default()
        }
    }

    /// Add a driver option (`-o key=value`).
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .insert(key.into(), Value::String(value.into()));
        self
    }

    /// Add an IPv4 pool.
    #[must_use]
    pub fn with_ipv4_pool(mut self, pool: impl Into<String>) -> Self {
        self.ipv4_data.push(PoolDescriptor::new(pool));
        self
    }
}

/// Addresses and MAC of an endpoint's interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointInterface {
    /// IPv4 address in CIDR form; not managed by this driver.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// IPv6 address in CIDR form; not managed by this driver.
    #[serde(rename = "AddressIPv6", default, skip_serializing_if = "String::is_empty")]
    pub address_ipv6: String,
    /// MAC address.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac_address: String,
}

/// Create endpoint request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEndpointRequest {
    /// Network id.
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    /// Endpoint id.
    #[serde(rename = "EndpointID")]
    pub endpoint_id: String,
    /// Requested interface settings.
    #[serde(rename = "Interface", default)]
    pub interface: Option<EndpointInterface>,
}

impl CreateEndpointRequest {
    /// A request without a requested MAC.
    pub fn new(network_id: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            network_id: network_id.into(),
            endpoint_id: endpoint_id.into(),
            interface: None,
        }
    }

    /// Request a specific MAC address.
    #[must_use]
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.interface
            .get_or_insert_with(EndpointInterface::default)
            .mac_address = mac.into();
        self
    }

    /// The requested MAC, if any.
    #[must_use]
    pub fn requested_mac(&self) -> Option<&str> {
        self.interface
            .as_ref()
            .map(|i| i.mac_address.trim())
            .filter(|mac| !mac.is_empty())
    }
}

/// Create endpoint response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateEndpointResponse {
    /// The interface as assigned by the driver.
    pub interface: EndpointInterface,
}

impl CreateEndpointResponse {
    /// Assigned MAC address.
    #[must_use]
    pub fn mac(&self) -> &str {
        &self.interface.mac_address
    }
}

/// Names for the interface handed to the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InterfaceName {
    /// Host-side interface to move into the container.
    pub src_name: String,
    /// Name prefix inside the container.
    pub dst_prefix: String,
}

/// Join response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinResult {
    /// Interface to move into the container.
    pub interface_name: InterfaceName,
    /// Always set: this driver never provides a default route.
    pub disable_gateway_service: bool,
}

/// Outcome of a create network request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkCreation {
    /// A new network was created.
    Created,
    /// The network already existed with the same parent. Not an error.
    Restored,
}

impl NetworkCreation {
    /// Whether the request was already satisfied and the protocol layer
    /// should report a masked success.
    #[must_use]
    pub const fn is_masked(self) -> bool {
        matches!(self, Self::Restored)
    }
}

/// Operational data about an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointInfo {
    /// Endpoint id.
    pub id: String,
    /// Network id.
    pub network_id: String,
    /// Parent link of the network.
    pub parent: String,
    /// Assigned MAC address.
    pub mac: String,
    /// Host-side interface, once joined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_name: Option<String>,
    /// Lifecycle state.
    pub state: EndpointState,
}

impl EndpointInfo {
    pub(crate) fn new(endpoint: &Endpoint, parent: &str) -> Self {
        Self {
            id: endpoint.id.to_string(),
            network_id: endpoint.network_id.to_string(),
            parent: parent.to_string(),
            mac: endpoint.mac.to_string(),
            src_name: endpoint.src_name.clone(),
            state: endpoint.state(),
        }
    }
}

/// Summary of a restart replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Networks registered from the store.
    pub networks: usize,
    /// Endpoints re-attached to their networks.
    pub endpoints: usize,
    /// Endpoint records removed because their network is gone.
    pub orphans_removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn network_request_wire_names() {
        let request: CreateNetworkRequest = serde_json::from_value(json!({
            "NetworkID": "abc",
            "Options": { "com.docker.network.generic": { "parent": "eth0" } },
            "IPv4Data": [{ "AddressSpace": "null", "Pool": "0.0.0.0/0", "Gateway": "" }],
            "IPv6Data": []
        }))
        .unwrap();
        assert_eq!(request.network_id, "abc");
        assert_eq!(request.ipv4_data.len(), 1);
        assert!(request.ipv4_data[0].is_wildcard());
    }

    #[test]
    fn endpoint_request_mac() {
        let request: CreateEndpointRequest = serde_json::from_value(json!({
            "NetworkID": "abc",
            "EndpointID": "ep",
            "Interface": { "Address": "", "AddressIPv6": "", "MacAddress": "" }
        }))
        .unwrap();
        assert_eq!(request.requested_mac(), None);

        let request = CreateEndpointRequest::new("abc", "ep").with_mac("02:00:00:00:00:01");
        assert_eq!(request.requested_mac(), Some("02:00:00:00:00:01"));
    }

    #[test]
    fn responses_serialize_like_the_plugin_protocol() {
        let join = JoinResult {
            interface_name: InterfaceName {
                src_name: "veth1a2b3c4".to_string(),
                dst_prefix: "eth".to_string(),
            },
            disable_gateway_service: true,
        };
        assert_eq!(
            serde_json::to_value(&join).unwrap(),
            json!({
                "InterfaceName": { "SrcName": "veth1a2b3c4", "DstPrefix": "eth" },
                "DisableGatewayService": true
            })
        );

        let caps = Capabilities { scope: Scope::Local };
        assert_eq!(serde_json::to_value(caps).unwrap(), json!({ "Scope": "local" }));
    }

    #[test]
    fn masked_creation() {
        assert!(NetworkCreation::Restored.is_masked());
        assert!(!NetworkCreation::Created.is_masked());
    }
}
