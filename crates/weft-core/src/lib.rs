//! Weft Core Library
//!
//! Shared identity and context types for the weft mesh stack.
//!
//! # Modules
//!
//! - [`types`]: Identity newtypes (PeerId, NetworkId) and the per-start
//!   network context bound to transports

pub mod types;

pub use types::{NetworkContext, NetworkId, PeerId};
