//! In-process transport
//!
//! Connects two transports living in the same process through directly
//! linked peer pairs. No wire, no discovery; serves as the reference
//! implementation of the transport contract and as the test vehicle for
//! anything built on top of it.

use crate::event::{Listeners, Subscription};
use crate::peer::{Peer, PeerHandle, StateListener};
use crate::transport::{PeerListener, Transport, TransportCore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tracing::debug;
use weft_core::{NetworkContext, PeerId};

/// Linking errors
#[derive(Debug, Error)]
pub enum LinkError {
    /// Peers may only be accepted by a started transport.
    #[error("transport not started: {0}")]
    NotStarted(String),
}

/// One end of an in-process link.
///
/// Carries the identity of the *remote* transport. Disconnection propagates
/// to the twin on the other side, so either end going down tears the link
/// down exactly once.
pub struct MemoryPeer {
    id: PeerId,
    connected: Mutex<bool>,
    connect: Listeners<()>,
    disconnect: Listeners<()>,
    twin: Mutex<Option<Weak<MemoryPeer>>>,
}

impl MemoryPeer {
    /// Create a peer that is not yet connected; [`open`](Self::open)
    /// completes the dial.
    pub fn pending(id: PeerId) -> Arc<Self> {
        Arc::new(Self {
            id,
            connected: Mutex::new(false),
            connect: Listeners::new(),
            disconnect: Listeners::new(),
            twin: Mutex::new(None),
        })
    }

    /// Mark the peer connected and deliver its connect notification.
    /// No-op if already connected.
    pub fn open(&self) {
        {
            let mut connected = self.connected.lock();
            if *connected {
                return;
            }
            *connected = true;
        }
        self.connect.emit(&());
    }
}

impl Peer for MemoryPeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    fn on_connect(&self, listener: StateListener) -> Subscription {
        self.connect.subscribe(move |_| listener())
    }

    fn on_disconnect(&self, listener: StateListener) -> Subscription {
        self.disconnect.subscribe(move |_| listener())
    }

    fn disconnect(&self) {
        {
            let mut connected = self.connected.lock();
            if !*connected {
                return;
            }
            *connected = false;
        }
        self.disconnect.emit(&());

        let twin = self.twin.lock().clone();
        if let Some(twin) = twin.and_then(|weak| weak.upgrade()) {
            twin.disconnect();
        }
    }
}

/// In-process transport endpoint.
///
/// Owns the peers created by [`link`]; the registry only holds non-owning
/// references, so peer lifetime lives here until the peer disconnects.
pub struct MemoryTransport {
    core: TransportCore,
    local_id: PeerId,
    owned: Arc<Mutex<HashMap<PeerId, Arc<MemoryPeer>>>>,
}

impl MemoryTransport {
    /// Create a stopped transport with a fresh local identity.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: TransportCore::new(name),
            local_id: PeerId::random(),
            owned: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Identity other transports see when linked to this one.
    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    /// Lifecycle and registry surface.
    pub fn core(&self) -> &TransportCore {
        &self.core
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn started(&self) -> bool {
        self.core.started()
    }

    async fn start(&self, ctx: NetworkContext) -> bool {
        self.core.start(ctx)
    }

    async fn stop(&self) -> bool {
        self.core.stop()
    }

    fn on_peer_connect(&self, listener: PeerListener) -> Subscription {
        self.core.on_peer_connect(listener)
    }

    fn on_peer_disconnect(&self, listener: PeerListener) -> Subscription {
        self.core.on_peer_disconnect(listener)
    }
}

/// Link two started in-process transports, producing a connected peer pair.
///
/// The peer registered on `a` carries `b`'s local identity and vice versa.
/// Both peers are created connected, so each side's connect event fires
/// before this returns. Fails if either side is stopped: gating acceptance
/// on started state is the transport's own duty, not the registry's.
pub fn link(
    a: &MemoryTransport,
    b: &MemoryTransport,
) -> Result<(Arc<MemoryPeer>, Arc<MemoryPeer>), LinkError> {
    if !a.core().started() {
        return Err(LinkError::NotStarted(a.core().name().to_string()));
    }
    if !b.core().started() {
        return Err(LinkError::NotStarted(b.core().name().to_string()));
    }

    let peer_on_a = MemoryPeer::pending(b.local_id());
    let peer_on_b = MemoryPeer::pending(a.local_id());
    *peer_on_a.twin.lock() = Some(Arc::downgrade(&peer_on_b));
    *peer_on_b.twin.lock() = Some(Arc::downgrade(&peer_on_a));
    peer_on_a.open();
    peer_on_b.open();

    let handle_a: PeerHandle = peer_on_a.clone();
    let handle_b: PeerHandle = peer_on_b.clone();
    a.core().add_peer(&handle_a);
    b.core().add_peer(&handle_b);
    adopt(a, &peer_on_a);
    adopt(b, &peer_on_b);

    debug!(a = %a.core().name(), b = %b.core().name(), "linked in-process transports");
    Ok((peer_on_a, peer_on_b))
}

/// Take ownership of a peer until it disconnects. Registered after the
/// registry's own subscriptions so the registry observes the disconnect
/// before ownership is released.
fn adopt(transport: &MemoryTransport, peer: &Arc<MemoryPeer>) {
    transport.owned.lock().insert(peer.id, peer.clone());

    let owned = Arc::downgrade(&transport.owned);
    let id = peer.id;
    peer.on_disconnect(Box::new(move || {
        if let Some(owned) = owned.upgrade() {
            owned.lock().remove(&id);
        }
    }));
}
