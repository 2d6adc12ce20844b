//! Weft transport layer
//!
//! This crate provides:
//! - The [`Transport`] contract every concrete transport satisfies
//! - [`TransportCore`], the shared lifecycle and peer registry transports embed
//! - Synchronous event subscription plumbing
//! - The in-process transport used for tests and single-process meshes

pub mod event;
pub mod memory;
pub mod peer;
pub mod transport;

pub use event::{Listeners, Subscription};
pub use memory::{link, MemoryPeer, MemoryTransport};
pub use peer::{Peer, PeerHandle};
pub use transport::{Transport, TransportCore};
