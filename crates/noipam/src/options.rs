//! Network option parsing.
//!
//! The runtime hands the driver an untyped option bag. [`parse_network`]
//! turns it into a fully validated [`NetworkConfiguration`] in one step, or
//! fails with a configuration error without touching the host.

use std::collections::BTreeMap;

use ipnet::Ipv4Net;
use noipam_common::{NoipamError, NoipamResult, ObjectId, truncate_id};
use noipam_network::{IFNAME_MAX_LEN, MacvlanMode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Driver name as registered with the runtime.
pub const DRIVER_TYPE: &str = "macvlan_noipam";

/// `-o parent=` option key.
pub const PARENT_OPT: &str = "parent";

/// `-o macvlan_mode=` option key.
pub const MODE_OPT: &str = "macvlan_mode";

/// Key under which the runtime nests `-o` driver options.
pub const GENERIC_DATA: &str = "com.docker.network.generic";

/// Key carrying the `--internal` flag.
pub const INTERNAL: &str = "com.docker.network.internal";

/// Parent name that can never back a network.
pub const LOOPBACK: &str = "lo";

/// Untyped option bag as sent by the runtime.
pub type RawOptions = serde_json::Map<String, Value>;

/// An address pool handed over by the runtime's IPAM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PoolDescriptor {
    /// Address space name.
    pub address_space: String,
    /// Pool in CIDR notation.
    pub pool: String,
    /// Gateway address.
    pub gateway: String,
    /// Auxiliary addresses.
    pub aux_addresses: BTreeMap<String, String>,
}

impl PoolDescriptor {
    /// A descriptor for `pool`.
    #[must_use]
    pub fn new(pool: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            ..Self::default()
        }
    }

    /// Whether this is the "no address family in use" sentinel.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        let pool = self.pool.trim();
        pool.is_empty()
            || pool
                .parse::<Ipv4Net>()
                .is_ok_and(|net| net.prefix_len() == 0)
    }
}

/// Validated configuration of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    /// Runtime-assigned network id.
    pub id: ObjectId,
    /// Backing link.
    pub parent: String,
    /// Macvlan mode for slaves of this network.
    pub mode: MacvlanMode,
    /// Network has no external connectivity.
    #[serde(default)]
    pub internal: bool,
    /// The driver created `parent` and owns its removal.
    #[serde(default)]
    pub created_slave_link: bool,
}

impl NetworkConfiguration {
    /// Whether `parent` is this network's generated dummy link.
    #[must_use]
    pub fn uses_dummy_parent(&self, dummy_prefix: &str) -> bool {
        self.parent == dummy_link_name(dummy_prefix, self.id.as_str())
    }
}

/// Output of [`parse_network`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNetwork {
    /// The validated configuration.
    pub config: NetworkConfiguration,
    /// Option keys that were not recognized.
    pub ignored: Vec<String>,
}

/// Name of the dummy link backing a network created without a parent.
#[must_use]
pub fn dummy_link_name(prefix: &str, network_id: &str) -> String {
    let mut name = format!("{prefix}{}", truncate_id(network_id));
    let mut end = name.len().min(IFNAME_MAX_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name.truncate(end);
    name
}

/// Reject any pool that carries a real IPv4 range.
///
/// # Errors
///
/// Returns a configuration error naming the first offending pool.
pub fn check_ipv4_pools(pools: &[PoolDescriptor]) -> NoipamResult<()> {
    match pools.iter().find(|p| !p.is_wildcard()) {
        Some(pool) => Err(NoipamError::config(format!(
            "ipv4 pool is not empty: {}, address management is left to the container",
            pool.pool
        ))),
        None => Ok(()),
    }
}

/// Parse and validate the options of a network.
///
/// Recognized keys are `parent` and `macvlan_mode`, either at the top level
/// or nested under [`GENERIC_DATA`], and the [`INTERNAL`] flag. Everything
/// else is logged and returned in [`ParsedNetwork::ignored`].
///
/// # Errors
///
/// Returns a configuration error for a non-wildcard IPv4 pool, a
/// non-string option value, an unknown mode, or a loopback parent.
pub fn parse_network(
    id: &ObjectId,
    options: &RawOptions,
    ipv4_pools: &[PoolDescriptor],
    dummy_prefix: &str,
) -> NoipamResult<ParsedNetwork> {
    check_ipv4_pools(ipv4_pools)?;

    let mut raw = RawDriverOptions::default();
    for (key, value) in options {
        match key.as_str() {
            GENERIC_DATA => raw.absorb_generic(value)?,
            INTERNAL => raw.internal = flag(value),
            _ => raw.absorb(key, value)?,
        }
    }

    if !raw.ignored.is_empty() {
        tracing::warn!(network_id = %id.short(), keys = ?raw.ignored, "Ignoring unrecognized network options");
    }

    let mode = normalize_mode(raw.mode.as_deref().unwrap_or_default())?;
    let parent = match raw.parent.as_deref().map(str::trim) {
        Some(LOOPBACK) => {
            return Err(NoipamError::config(format!(
                "loopback interface is not a valid {DRIVER_TYPE} parent link"
            )));
        }
        Some(parent) if !parent.is_empty() => parent.to_string(),
        _ => dummy_link_name(dummy_prefix, id.as_str()),
    };

    Ok(ParsedNetwork {
        config: NetworkConfiguration {
            id: id.clone(),
            parent,
            mode,
            internal: raw.internal,
            created_slave_link: false,
        },
        ignored: raw.ignored,
    })
}

/// Normalize a requested macvlan mode; empty means bridge.
///
/// # Errors
///
/// Returns a configuration error echoing any other unknown value.
pub fn normalize_mode(mode: &str) -> NoipamResult<MacvlanMode> {
    if mode.is_empty() {
        return Ok(MacvlanMode::Bridge);
    }
    mode.parse()
}

#[derive(Debug, Default)]
struct RawDriverOptions {
    parent: Option<String>,
    mode: Option<String>,
    internal: bool,
    ignored: Vec<String>,
}

impl RawDriverOptions {
    fn absorb_generic(&mut self, value: &Value) -> NoipamResult<()> {
        match value {
            Value::Null => Ok(()),
            Value::Object(map) => {
                for (key, value) in map {
                    self.absorb(key, value)?;
                }
                Ok(())
            }
            other => Err(NoipamError::config(format!(
                "unrecognized network configuration format: {other}"
            ))),
        }
    }

    fn absorb(&mut self, key: &str, value: &Value) -> NoipamResult<()> {
        match key {
            PARENT_OPT => self.parent = Some(string_option(key, value)?),
            MODE_OPT => self.mode = Some(string_option(key, value)?),
            _ => self.ignored.push(key.to_string()),
        }
        Ok(())
    }
}

fn string_option(key: &str, value: &Value) -> NoipamResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        other => Err(NoipamError::config(format!(
            "option '{key}' must be a string, got {other}"
        ))),
    }
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
