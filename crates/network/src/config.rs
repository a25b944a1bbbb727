//! Swarm/bootstrap/discovery configuration, following the nested-struct
//! pattern the teacher's network layer already used: `#[non_exhaustive]`
//! structs, `#[must_use] const fn new(...)` constructors, plain serde
//! derives so `taskmesh-config` can fold these into the top-level
//! `Config` loaded from TOML.

use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

/// Transport and listen-address configuration. Transport internals (which
/// concrete dialer/upgrade stack backs `listen`) are the libp2p host's
/// concern, out of this specification's scope; this struct only names the
/// addresses the host is told to bind.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SwarmConfig {
    pub listen: Vec<Multiaddr>,
}

impl SwarmConfig {
    #[must_use]
    pub const fn new(listen: Vec<Multiaddr>) -> Self {
        Self { listen }
    }
}

/// Peers dialed at startup before the Kademlia routing table has any other
/// entries.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BootstrapConfig {
    pub peers: Vec<Multiaddr>,
}

impl BootstrapConfig {
    #[must_use]
    pub const fn new(peers: Vec<Multiaddr>) -> Self {
        Self { peers }
    }
}

/// Which discovery mechanisms the host runs. Both default on, matching the
/// teacher's `DiscoveryConfig` defaults.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct DiscoveryConfig {
    pub kademlia: bool,
}

impl DiscoveryConfig {
    #[must_use]
    pub const fn new(kademlia: bool) -> Self {
        Self { kademlia }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { kademlia: true }
    }
}

/// Top-level network configuration folded into `taskmesh_config::Config`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl NetworkConfig {
    #[must_use]
    pub const fn new(swarm: SwarmConfig, bootstrap: BootstrapConfig, discovery: DiscoveryConfig) -> Self {
        Self {
            swarm,
            bootstrap,
            discovery,
        }
    }
}
