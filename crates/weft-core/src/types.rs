//! Identity and network-context types
//!
//! Identifiers are opaque byte newtypes; transports that have real key
//! material derive them from public keys, keyless transports mint them
//! with [`PeerId::random`].

use serde::{Deserialize, Serialize};

/// Unique peer identifier, stable per remote endpoint within a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Mint an ephemeral identity for transports without key material.
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Get as bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// Binary network identifier.
///
/// Opaque to this layer; typically derived from a human-readable network
/// name via [`NetworkId::derive`], but any byte string is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId(pub Vec<u8>);

impl NetworkId {
    /// Derive a network ID from a human-readable name using BLAKE3.
    pub fn derive(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"weft-network-v1:");
        hasher.update(name.as_bytes());
        Self(hasher.finalize().as_bytes().to_vec())
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Immutable per-start binding handed to a transport.
///
/// Supplied once per `start` call and never mutated after binding. The
/// encoded form of the id is provided by the caller; this layer never
/// re-encodes the binary id itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkContext {
    /// Binary network identifier.
    pub id: NetworkId,
    /// Stable textual encoding of `id`.
    pub encoded_id: String,
    /// Diagnostic namespace used to tag transport logging.
    pub namespace: String,
}

impl NetworkContext {
    /// Create a new network context.
    pub fn new(id: NetworkId, encoded_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            id,
            encoded_id: encoded_id.into(),
            namespace: namespace.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_id_derivation() {
        let id = NetworkId::derive("test-net");

        // Same name should produce same ID
        assert_eq!(id, NetworkId::derive("test-net"));

        // Different name should produce different ID
        assert_ne!(id, NetworkId::derive("other-net"));
    }

    #[test]
    fn test_peer_id_display() {
        let id = PeerId::from_bytes([0xab; 32]);
        assert_eq!(id.to_string(), "abababababababab");
    }

    #[test]
    fn test_random_peer_ids_are_distinct() {
        assert_ne!(PeerId::random(), PeerId::random());
    }

    #[test]
    fn test_context_holds_supplied_values() {
        let ctx = NetworkContext::new(NetworkId::from_bytes(vec![1, 2, 3, 4]), "AQIDBA", "net:t");
        assert_eq!(ctx.id.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(ctx.encoded_id, "AQIDBA");
        assert_eq!(ctx.namespace, "net:t");
    }
}
