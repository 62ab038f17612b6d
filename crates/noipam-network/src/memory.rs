//! In-process link table.
//!
//! [`MemoryLinks`] behaves like a host with a fixed set of physical
//! interfaces. It enforces the same rules as the kernel for the operations
//! the driver uses and records every mutation, so callers can assert on
//! side effects.

use std::collections::{BTreeMap, BTreeSet};

use noipam_common::{NoipamError, NoipamResult};
use parking_lot::Mutex;

use crate::ifname::IFNAME_MAX_LEN;
use crate::link::LinkBackend;
use crate::modes::MacvlanMode;
use crate::netns::NetnsScope;
use crate::vlan::VlanSubinterface;

/// What kind of link an entry is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    /// Pre-existing host interface.
    Physical,
    /// Dummy link.
    Dummy,
    /// VLAN sub-interface.
    Vlan {
        /// Underlying interface.
        base: String,
        /// 802.1Q tag.
        vlan_id: u16,
    },
    /// Macvlan slave.
    Macvlan {
        /// Parent link.
        parent: String,
        /// Macvlan mode.
        mode: MacvlanMode,
    },
}

/// A mutating link operation, used for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkOp {
    /// [`LinkBackend::create_dummy`].
    CreateDummy,
    /// [`LinkBackend::create_vlan`].
    CreateVlan,
    /// [`LinkBackend::create_macvlan`].
    CreateMacvlan,
    /// [`LinkBackend::delete_link`].
    Delete,
}

#[derive(Debug, Default)]
struct State {
    links: BTreeMap<String, LinkKind>,
    failing: BTreeSet<LinkOp>,
    mutations: usize,
}

/// In-memory [`LinkBackend`].
#[derive(Debug, Default)]
pub struct MemoryLinks {
    state: Mutex<State>,
}

impl MemoryLinks {
    /// An empty host with only a loopback interface.
    #[must_use]
    pub fn new() -> Self {
        Self::with_physical(std::iter::empty::<String>())
    }

    /// A host with a loopback and the given physical interfaces.
    #[must_use]
    pub fn with_physical<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let links = std::iter::once("lo".to_string())
            .chain(names.into_iter().map(Into::into))
            .map(|n| (n, LinkKind::Physical))
            .collect();
        Self {
            state: Mutex::new(State {
                links,
                ..State::default()
            }),
        }
    }

    /// Add a physical interface, as if it was plugged in out-of-band.
    pub fn add_physical(&self, name: impl Into<String>) {
        self.state.lock().links.insert(name.into(), LinkKind::Physical);
    }

    /// Remove a link out-of-band without counting it as a mutation.
    pub fn remove_out_of_band(&self, name: &str) -> Option<LinkKind> {
        self.state.lock().links.remove(name)
    }

    /// Make every future call of `op` fail.
    pub fn fail(&self, op: LinkOp) {
        self.state.lock().failing.insert(op);
    }

    /// Stop failing `op`.
    pub fn heal(&self, op: LinkOp) {
        self.state.lock().failing.remove(&op);
    }

    /// Names of all links, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.state.lock().links.keys().cloned().collect()
    }

    /// The kind of link `name`, if present.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<LinkKind> {
        self.state.lock().links.get(name).cloned()
    }

    /// Number of successful create and delete operations.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.state.lock().mutations
    }

    fn insert(&self, op: LinkOp, name: &str, kind: LinkKind) -> NoipamResult<()> {
        let mut state = self.state.lock();
        if state.failing.contains(&op) {
            return Err(NoipamError::backend(format!("{op:?}"), "injected failure"));
        }
        if name.is_empty() || name.len() > IFNAME_MAX_LEN {
            return Err(NoipamError::backend(
                format!("{op:?}"),
                format!("invalid interface name '{name}'"),
            ));
        }
        if state.links.contains_key(name) {
            return Err(NoipamError::backend(
                format!("{op:?}"),
                format!("link {name} already exists"),
            ));
        }
        let parent = match &kind {
            LinkKind::Vlan { base, .. } => Some(base),
            LinkKind::Macvlan { parent, .. } => Some(parent),
            LinkKind::Physical | LinkKind::Dummy => None,
        };
        if let Some(parent) = parent {
            if !state.links.contains_key(parent) {
                return Err(NoipamError::backend(
                    format!("{op:?}"),
                    format!("parent interface {parent} was not found"),
                ));
            }
        }

        state.links.insert(name.to_string(), kind);
        state.mutations += 1;
        Ok(())
    }
}

impl LinkBackend for MemoryLinks {
    fn enter_scope(&self) -> NoipamResult<NetnsScope> {
        Ok(NetnsScope::noop())
    }

    fn link_exists(&self, name: &str) -> bool {
        self.state.lock().links.contains_key(name)
    }

    fn create_dummy(&self, name: &str) -> NoipamResult<()> {
        self.insert(LinkOp::CreateDummy, name, LinkKind::Dummy)
    }

    fn create_vlan(&self, vlan: &VlanSubinterface) -> NoipamResult<()> {
        self.insert(
            LinkOp::CreateVlan,
            &vlan.name(),
            LinkKind::Vlan {
                base: vlan.base().to_string(),
                vlan_id: vlan.vlan_id(),
            },
        )
    }

    fn delete_link(&self, name: &str) -> NoipamResult<()> {
        let mut state = self.state.lock();
        if state.failing.contains(&LinkOp::Delete) {
            return Err(NoipamError::backend("Delete", "injected failure"));
        }
        if state.links.remove(name).is_some() {
            state.mutations += 1;
            // Slaves and sub-interfaces go with their parent.
            state.links.retain(|_, kind| match kind {
                LinkKind::Vlan { base, .. } => base != name,
                LinkKind::Macvlan { parent, .. } => parent != name,
                LinkKind::Physical | LinkKind::Dummy => true,
            });
        }
        Ok(())
    }

    fn create_macvlan(
        &self,
        name: &str,
        parent: &str,
        mode: MacvlanMode,
    ) -> NoipamResult<String> {
        self.insert(
            LinkOp::CreateMacvlan,
            name,
            LinkKind::Macvlan {
                parent: parent.to_string(),
                mode,
            },
        )?;
        Ok(name.to_string())
    }
}
