//! Transport lifecycle and peer registry
//!
//! The shared base every concrete transport embeds: started/stopped gating,
//! the per-start network-context binding, and the tracked set of currently
//! connected peers, re-emitted as transport-level connect/disconnect events
//! for the network orchestrator.

use crate::event::{Listeners, Subscription};
use crate::peer::{Peer, PeerHandle};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, info_span, Span};
use weft_core::{NetworkContext, PeerId};

/// Transport-level peer event listener.
pub type PeerListener = Box<dyn Fn(&PeerHandle) + Send + Sync>;

/// Network binding of a transport.
enum Binding {
    /// No `start` observed since construction.
    Unbound,
    /// Context bound by the most recent `start`. Survives `stop`.
    Bound {
        ctx: NetworkContext,
        /// Diagnostics handle parameterized by the bound namespace.
        span: Span,
    },
}

struct Lifecycle {
    started: bool,
    binding: Binding,
}

struct Inner {
    name: String,
    lifecycle: RwLock<Lifecycle>,
    /// Currently connected peers keyed by identity. References are
    /// non-owning: each peer belongs to the transport that created it.
    tracked: Mutex<HashMap<PeerId, Weak<dyn Peer>>>,
    connect: Listeners<PeerHandle>,
    disconnect: Listeners<PeerHandle>,
}

impl Inner {
    fn span(&self) -> Span {
        match &self.lifecycle.read().binding {
            Binding::Bound { span, .. } => span.clone(),
            Binding::Unbound => Span::none(),
        }
    }

    /// Connect-notification path. The sole way peers enter the tracked set;
    /// set membership gates emission, so duplicate notifications and double
    /// registration collapse into a single event.
    fn peer_connected(&self, peer: PeerHandle) {
        let inserted = match self.tracked.lock().entry(peer.id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&peer));
                true
            }
        };

        if inserted {
            let span = self.span();
            let _guard = span.enter();
            debug!(peer = %peer.id(), "peer connected");
            self.connect.emit(&peer);
        }
    }

    /// Disconnect-notification path. The sole way peers leave the tracked
    /// set; a notification for an untracked peer is absorbed silently.
    fn peer_disconnected(&self, peer: PeerHandle) {
        let removed = self.tracked.lock().remove(&peer.id()).is_some();

        if removed {
            let span = self.span();
            let _guard = span.enter();
            debug!(peer = %peer.id(), "peer disconnected");
            self.disconnect.emit(&peer);
        }
    }
}

/// Shared lifecycle and peer bookkeeping embedded by every concrete
/// transport.
///
/// Tracks which remote peers are currently connected and re-emits their
/// connect/disconnect transitions as transport-level events. All set
/// mutation flows through the peer-notification paths, keeping a single
/// source of truth whether a peer was registered already connected (inbound
/// accept) or connects later (outbound dial).
pub struct TransportCore {
    inner: Arc<Inner>,
}

impl TransportCore {
    /// Create a stopped, unbound core.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                lifecycle: RwLock::new(Lifecycle {
                    started: false,
                    binding: Binding::Unbound,
                }),
                tracked: Mutex::new(HashMap::new()),
                connect: Listeners::new(),
                disconnect: Listeners::new(),
            }),
        }
    }

    /// Stable short identifier used for diagnostics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the transport is currently started.
    pub fn started(&self) -> bool {
        self.inner.lifecycle.read().started
    }

    /// Bind `ctx` and transition to Started.
    ///
    /// Idempotent: returns `false` and performs no side effects (the
    /// existing binding is kept) when already started. A start after a stop
    /// rebinds the context.
    pub fn start(&self, ctx: NetworkContext) -> bool {
        let mut lifecycle = self.inner.lifecycle.write();
        if lifecycle.started {
            return false;
        }

        let span = info_span!("transport", id = %self.inner.name, net = %ctx.namespace);
        span.in_scope(|| info!(network = %ctx.encoded_id, "transport started"));
        lifecycle.binding = Binding::Bound { ctx, span };
        lifecycle.started = true;
        true
    }

    /// Transition to Stopped and request disconnection of every tracked
    /// peer exactly once.
    ///
    /// Idempotent: returns `false` when already stopped. The tracked set is
    /// not cleared here; entries leave through the disconnect-notification
    /// path, so the set may still be draining when this returns if peers
    /// deliver their notifications asynchronously.
    pub fn stop(&self) -> bool {
        {
            let mut lifecycle = self.inner.lifecycle.write();
            if !lifecycle.started {
                return false;
            }
            lifecycle.started = false;
        }

        let peers: Vec<PeerHandle> = self
            .inner
            .tracked
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();

        let span = self.inner.span();
        let _guard = span.enter();
        info!(peers = peers.len(), "transport stopping");
        for peer in peers {
            peer.disconnect();
        }
        true
    }

    /// Register a peer for tracking.
    ///
    /// Subscribes to the peer's connect and disconnect notifications. A
    /// peer that is already connected is tracked immediately and its
    /// connect event fires synchronously, before this returns; otherwise
    /// nothing happens until the peer's own connect notification arrives.
    pub fn add_peer(&self, peer: &PeerHandle) {
        let span = self.inner.span();
        let _guard = span.enter();
        debug!(peer = %peer.id(), "registering peer");

        // Subscriptions stay registered for the peer's lifetime; the
        // handles are deliberately dropped.
        let inner = Arc::downgrade(&self.inner);
        let watched = Arc::downgrade(peer);
        peer.on_connect(Box::new(move || {
            if let (Some(inner), Some(peer)) = (inner.upgrade(), watched.upgrade()) {
                inner.peer_connected(peer);
            }
        }));

        let inner = Arc::downgrade(&self.inner);
        let watched = Arc::downgrade(peer);
        peer.on_disconnect(Box::new(move || {
            if let (Some(inner), Some(peer)) = (inner.upgrade(), watched.upgrade()) {
                inner.peer_disconnected(peer);
            }
        }));

        if peer.is_connected() {
            self.inner.peer_connected(peer.clone());
        }
    }

    /// Subscribe to transport-level peer-connected events.
    ///
    /// Listeners fire synchronously, in registration order, and may be
    /// registered or removed in any lifecycle state.
    pub fn on_peer_connect(
        &self,
        listener: impl Fn(&PeerHandle) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.connect.subscribe(listener)
    }

    /// Subscribe to transport-level peer-disconnected events.
    pub fn on_peer_disconnect(
        &self,
        listener: impl Fn(&PeerHandle) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.disconnect.subscribe(listener)
    }

    /// Currently bound network context.
    ///
    /// The binding persists across `stop`; only a later `start` replaces
    /// it.
    ///
    /// # Panics
    ///
    /// Panics if `start` has never been called on this transport. Asking
    /// for the context before the first start is a bug in the calling
    /// transport, not a runtime fault.
    pub fn network(&self) -> NetworkContext {
        match &self.inner.lifecycle.read().binding {
            Binding::Bound { ctx, .. } => ctx.clone(),
            Binding::Unbound => panic!(
                "network context accessed before start on transport {}",
                self.inner.name
            ),
        }
    }

    /// Identities of currently tracked peers. Ordering is not meaningful.
    pub fn peers(&self) -> Vec<PeerId> {
        self.inner.tracked.lock().keys().copied().collect()
    }

    /// Number of currently tracked peers.
    pub fn peer_count(&self) -> usize {
        self.inner.tracked.lock().len()
    }

    /// Whether a peer with this identity is currently tracked.
    pub fn is_tracked(&self, id: &PeerId) -> bool {
        self.inner.tracked.lock().contains_key(id)
    }
}

/// Contract satisfied by every concrete transport.
///
/// Implementations embed a [`TransportCore`] and delegate lifecycle and
/// bookkeeping to it. `start` and `stop` are async so a transport can await
/// readiness of its underlying medium (socket binds, discovery warmup); the
/// core's own state transition stays atomic from the caller's point of
/// view.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Stable short identifier used for diagnostics.
    fn name(&self) -> &str;

    /// Whether the transport is currently started.
    fn started(&self) -> bool;

    /// Bind a network context and begin producing peers.
    ///
    /// Returns `false` when already started.
    async fn start(&self, ctx: NetworkContext) -> bool;

    /// Disconnect tracked peers and stop producing new ones.
    ///
    /// Returns `false` when already stopped.
    async fn stop(&self) -> bool;

    /// Subscribe to transport-level peer-connected events.
    fn on_peer_connect(&self, listener: PeerListener) -> Subscription;

    /// Subscribe to transport-level peer-disconnected events.
    fn on_peer_disconnect(&self, listener: PeerListener) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryPeer;
    use weft_core::NetworkId;

    fn ctx() -> NetworkContext {
        NetworkContext::new(NetworkId::from_bytes(vec![1, 2, 3, 4]), "AQIDBA", "net:t")
    }

    fn connected_peer() -> PeerHandle {
        let peer = MemoryPeer::pending(PeerId::random());
        peer.open();
        peer
    }

    #[test]
    fn test_start_stop_idempotent() {
        let core = TransportCore::new("t");
        assert!(!core.started());

        assert!(core.start(ctx()));
        assert!(core.started());
        assert!(!core.start(ctx()));

        assert!(core.stop());
        assert!(!core.started());
        assert!(!core.stop());

        // Restartable, not single-use
        assert!(core.start(ctx()));
        assert!(core.stop());
    }

    #[test]
    fn test_start_while_started_keeps_binding() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let other = NetworkContext::new(NetworkId::derive("other"), "other", "net:other");
        assert!(!core.start(other));
        assert_eq!(core.network(), ctx());
    }

    #[test]
    fn test_restart_rebinds_context() {
        let core = TransportCore::new("t");
        core.start(ctx());
        core.stop();

        let other = NetworkContext::new(NetworkId::derive("other"), "other", "net:other");
        assert!(core.start(other.clone()));
        assert_eq!(core.network(), other);
    }

    #[test]
    #[should_panic(expected = "before start")]
    fn test_network_before_start_panics() {
        TransportCore::new("t").network();
    }

    #[test]
    fn test_network_survives_stop() {
        let core = TransportCore::new("t");
        core.start(ctx());
        core.stop();
        assert_eq!(core.network(), ctx());
    }

    #[test]
    fn test_already_connected_peer_fires_synchronously() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        core.on_peer_connect(move |peer| log.lock().push(peer.id()));

        let peer = connected_peer();
        core.add_peer(&peer);

        // Tracked and announced before add_peer returned
        assert_eq!(*seen.lock(), vec![peer.id()]);
        assert!(core.is_tracked(&peer.id()));
        assert_eq!(core.peer_count(), 1);
    }

    #[test]
    fn test_pending_peer_fires_on_its_own_connect() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        core.on_peer_connect(move |peer| log.lock().push(peer.id()));

        let peer = MemoryPeer::pending(PeerId::random());
        let handle: PeerHandle = peer.clone();
        core.add_peer(&handle);

        assert!(seen.lock().is_empty());
        assert!(!core.is_tracked(&peer.id()));

        peer.open();
        assert_eq!(*seen.lock(), vec![peer.id()]);
        assert!(core.is_tracked(&peer.id()));
    }

    #[test]
    fn test_duplicate_registration_collapses() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let connects = Arc::new(Mutex::new(0usize));
        let disconnects = Arc::new(Mutex::new(0usize));
        let c = connects.clone();
        core.on_peer_connect(move |_| *c.lock() += 1);
        let d = disconnects.clone();
        core.on_peer_disconnect(move |_| *d.lock() += 1);

        let peer = connected_peer();
        core.add_peer(&peer);
        core.add_peer(&peer);

        assert_eq!(*connects.lock(), 1);
        assert_eq!(core.peer_count(), 1);

        // Both registrations subscribed to the peer, but set mutation gates
        // emission: one disconnect event total.
        peer.disconnect();
        assert_eq!(*disconnects.lock(), 1);
        assert_eq!(core.peer_count(), 0);
    }

    #[test]
    fn test_disconnect_then_reconnect_is_new_entry() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let connects = Arc::new(Mutex::new(0usize));
        let c = connects.clone();
        core.on_peer_connect(move |_| *c.lock() += 1);

        let peer = MemoryPeer::pending(PeerId::random());
        let handle: PeerHandle = peer.clone();
        core.add_peer(&handle);

        peer.open();
        peer.disconnect();
        assert!(!core.is_tracked(&peer.id()));

        peer.open();
        assert_eq!(*connects.lock(), 2);
        assert!(core.is_tracked(&peer.id()));
    }

    #[test]
    fn test_stop_disconnects_every_tracked_peer() {
        let core = TransportCore::new("t");
        core.start(ctx());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        core.on_peer_disconnect(move |peer| log.lock().push(peer.id()));

        let first = connected_peer();
        let second = connected_peer();
        core.add_peer(&first);
        core.add_peer(&second);
        assert_eq!(core.peer_count(), 2);

        assert!(core.stop());

        // Memory peers notify synchronously, so the set has drained
        let mut ids = seen.lock().clone();
        ids.sort();
        let mut expected = vec![first.id(), second.id()];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(core.peer_count(), 0);

        assert!(!core.stop());
    }

    #[test]
    fn test_listener_order_and_unsubscribe() {
        let core = TransportCore::new("t");

        // Registration before start is legal
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let early = core.on_peer_connect(move |_| log.lock().push("early"));
        let log = seen.clone();
        core.on_peer_connect(move |_| log.lock().push("late"));

        core.start(ctx());
        core.add_peer(&connected_peer());
        assert_eq!(*seen.lock(), vec!["early", "late"]);

        early.unsubscribe();
        core.add_peer(&connected_peer());
        assert_eq!(*seen.lock(), vec!["early", "late", "late"]);
    }
}
