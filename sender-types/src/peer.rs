//! Remote device identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// The well-known service record that identifies this protocol's endpoint
/// to the radio stack.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0xee355d8f_3148_4677_944f_0b52f3516979);

/// A remote device reported by the radio stack.
///
/// Identity is the radio address alone; the name is advisory and two peers
/// with the same address compare equal regardless of name.
#[derive(Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Human-readable device name, if the radio stack knows one.
    pub name: Option<String>,
    /// Stable unique hardware address.
    pub address: String,
}

impl Peer {
    /// Create a peer with a known name.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    /// Create a peer the radio stack reported without a name.
    pub fn unnamed(address: impl Into<String>) -> Self {
        Self {
            name: None,
            address: address.into(),
        }
    }

    /// Name if present, otherwise the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self)
    }
}
