//! 48-bit node identifier (network hardware address)
//!
//! The identifier is read from the kernel's view of the network interfaces
//! when one is available. Otherwise a random value with the multicast bit set
//! is generated, so it can never collide with a real interface address.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

#[cfg(test)]
mod tests;

/// Where interface addresses are published on Linux
pub const SYSFS_NET_DIR: &str = "/sys/class/net";

const NODE_BITS: u32 = 48;
const MULTICAST_BIT: u64 = 1 << 40;
const LOCAL_BIT: u64 = 1 << 41;

static NODE: OnceLock<Node> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSource {
    /// Read from a network interface
    Hardware { interface: String },
    /// Generated because no usable interface address was found
    Random,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub source: NodeSource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeIdError {
    #[error("Node identifier {0:#x} does not fit in 48 bits")]
    OutOfRange(u64),
    #[error("Invalid hardware address: {0:?}")]
    InvalidFormat(String),
}

impl NodeId {
    pub const MAX: u64 = (1 << NODE_BITS) - 1;

    #[inline]
    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        let mut value = 0u64;
        let mut i = 0;
        while i < bytes.len() {
            value = (value << 8) | bytes[i] as u64;
            i += 1;
        }
        Self(value)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Octets, most significant first
    #[inline]
    pub fn octets(self) -> [u8; 6] {
        let mut out = [0u8; 6];
        for (slot, shift) in out.iter_mut().zip((0..NODE_BITS).step_by(8).rev()) {
            *slot = ((self.0 >> shift) & 0xff) as u8;
        }
        out
    }

    #[inline]
    pub const fn is_multicast(self) -> bool {
        self.0 & MULTICAST_BIT != 0
    }

    /// Locally administered rather than burned in by the vendor
    #[inline]
    pub const fn is_local(self) -> bool {
        self.0 & LOCAL_BIT != 0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<u64> for NodeId {
    type Error = NodeIdError;

    #[inline]
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > Self::MAX {
            return Err(NodeIdError::OutOfRange(value));
        }
        Ok(Self(value))
    }
}

impl fmt::Display for NodeId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, shift) in (0..NODE_BITS).step_by(8).rev().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}", (self.0 >> shift) & 0xff)?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NodeIdError::InvalidFormat(s.to_string());

        let mut bytes = [0u8; 6];
        let mut groups = s.split(':');
        for byte in &mut bytes {
            let group = groups.next().ok_or_else(invalid)?;
            if group.len() != 2 || !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }
        if groups.next().is_some() {
            return Err(invalid());
        }

        Ok(Self::from_bytes(bytes))
    }
}

/// The node identifier of this machine, resolved once per process
#[inline]
pub fn node_id() -> NodeId {
    node().id
}

/// Like [`node_id`], but also reports where the identifier came from
#[inline]
pub fn node() -> &'static Node {
    NODE.get_or_init(|| {
        let node = lookup_node(Path::new(SYSFS_NET_DIR));
        match &node.source {
            NodeSource::Hardware { interface } => {
                info!("Using hardware address {} from {}", node.id, interface);
            }
            NodeSource::Random => {
                info!(
                    "No usable network interface found, using random node id {}",
                    node.id
                );
            }
        }
        node
    })
}

/// Resolve the node identifier without caching. Never fails.
#[inline]
pub fn lookup_node(net_dir: &Path) -> Node {
    match hardware_node_id(net_dir) {
        Some((interface, id)) => Node {
            id,
            source: NodeSource::Hardware { interface },
        },
        None => Node {
            id: random_node_id(),
            source: NodeSource::Random,
        },
    }
}

/// Scan `<net_dir>/<iface>/address` files for a usable interface address.
///
/// Interfaces are visited in name order. Zero and multicast addresses are
/// skipped. The first universally administered address wins; failing that,
/// the first locally administered one.
#[inline]
pub fn hardware_node_id(net_dir: &Path) -> Option<(String, NodeId)> {
    let entries = match fs::read_dir(net_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", net_dir.display(), e);
            return None;
        }
    };

    let mut interfaces: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    interfaces.sort_unstable();

    let mut fallback = None;
    for interface in interfaces {
        let path = net_dir.join(&interface).join("address");
        let Ok(raw) = fs::read_to_string(&path) else {
            continue;
        };

        let id = match raw.trim().parse::<NodeId>() {
            Ok(id) => id,
            Err(e) => {
                debug!("Skipping {}: {}", interface, e);
                continue;
            }
        };

        if id.is_zero() || id.is_multicast() {
            debug!("Skipping {} with unusable address {}", interface, id);
            continue;
        }

        if !id.is_local() {
            return Some((interface, id));
        }

        if fallback.is_none() {
            fallback = Some((interface, id));
        }
    }

    fallback
}

/// Random 48-bit identifier with the multicast bit set
#[inline]
pub fn random_node_id() -> NodeId {
    let random = uuid::Uuid::new_v4();
    let mut bytes = [0u8; 6];
    bytes.copy_from_slice(&random.as_bytes()[..6]);
    bytes[0] |= 0x01;
    NodeId::from_bytes(bytes)
}
