//! Peer contract
//!
//! A peer is a handle to one remote network participant. Instances are
//! created and owned by the concrete transport that established the
//! connection; the registry only tracks membership.

use crate::event::Subscription;
use std::sync::Arc;
use weft_core::PeerId;

/// Shared handle to a peer, as carried by transport-level events.
pub type PeerHandle = Arc<dyn Peer>;

/// Callback invoked when a peer's connection state transitions.
pub type StateListener = Box<dyn Fn() + Send + Sync>;

/// Capability set required of any object registered with a transport's
/// peer registry.
///
/// Notification contract: connect and disconnect are delivered exactly once
/// per transition, and a connect is never followed by a second connect
/// without an intervening disconnect. The registry does not defend against
/// implementations that break this.
pub trait Peer: Send + Sync {
    /// Stable identity of the remote endpoint.
    fn id(&self) -> PeerId;

    /// Whether the connection to the remote endpoint is currently up.
    fn is_connected(&self) -> bool;

    /// Subscribe to connect transitions.
    fn on_connect(&self, listener: StateListener) -> Subscription;

    /// Subscribe to disconnect transitions.
    fn on_disconnect(&self, listener: StateListener) -> Subscription;

    /// Request disconnection.
    ///
    /// Fire-and-forget and idempotent; the resulting state change is
    /// observed through the disconnect notification, not a return value.
    fn disconnect(&self);
}
