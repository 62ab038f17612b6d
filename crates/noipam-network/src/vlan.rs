//! VLAN sub-interface naming.

use std::fmt;
use std::str::FromStr;

use noipam_common::{NoipamError, NoipamResult};

use crate::ifname::IFNAME_MAX_LEN;

/// An IEEE 802.1Q sub-interface named `base.vid`, e.g. `eth0.10`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VlanSubinterface {
    base: String,
    vlan_id: u16,
}

impl VlanSubinterface {
    /// Minimum valid VLAN ID.
    pub const MIN_ID: u16 = 1;

    /// Maximum valid VLAN ID.
    pub const MAX_ID: u16 = 4094;

    /// Parse a `base.vid` interface name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name has no `.` separator, the
    /// base is empty, the id is not a number in 1-4094, or the full name is
    /// longer than the kernel allows. The id must be written canonically
    /// (no sign or leading zeros) so that [`VlanSubinterface::name`]
    /// round-trips to `name`.
    pub fn parse(name: &str) -> NoipamResult<Self> {
        let invalid = |why: &str| {
            NoipamError::config(format!(
                "invalid parent interface '{name}': {why}, expected <interface>.<vlan id> (e.g. eth0.10)"
            ))
        };

        if name.len() > IFNAME_MAX_LEN {
            return Err(invalid("name too long"));
        }
        let (base, id) = name
            .rsplit_once('.')
            .ok_or_else(|| invalid("missing vlan id"))?;
        if base.is_empty() {
            return Err(invalid("missing base interface"));
        }
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("vlan id is not numeric"));
        }
        if id.len() > 1 && id.starts_with('0') {
            return Err(invalid("vlan id has leading zeros"));
        }
        let vlan_id: u16 = id.parse().map_err(|_| invalid("vlan id out of range"))?;
        if !(Self::MIN_ID..=Self::MAX_ID).contains(&vlan_id) {
            return Err(invalid("vlan id out of range"));
        }

        Ok(Self {
            base: base.to_string(),
            vlan_id,
        })
    }

    /// The underlying interface.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The 802.1Q tag.
    #[must_use]
    pub const fn vlan_id(&self) -> u16 {
        self.vlan_id
    }

    /// The sub-interface name, `base.vid`.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for VlanSubinterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base, self.vlan_id)
    }
}

impl FromStr for VlanSubinterface {
    type Err = NoipamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
