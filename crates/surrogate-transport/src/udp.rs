//! UDP broadcast fan-out
//!
//! Each emitted message is sent as one JSON datagram `{event, message}` to
//! every configured peer. Local subscribers get a loopback copy directly.
//! Outbound datagrams are queued and written by a send task, so `emit`
//! never blocks and a freshly bound socket does not lose its first message.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use surrogate_core::{SurrogateError, SurrogateResult};

use crate::{BroadcastChannel, MessageReceiver, Subscribers};

/// Largest UDP payload over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Outbound datagrams buffered ahead of the send task
pub const SEND_QUEUE_DEPTH: usize = 1024;

/// Encoded datagram addressed to one peer
type Outbound = (Arc<Vec<u8>>, SocketAddr);

/// On-the-wire datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datagram {
    pub event: String,
    pub message: Value,
}

impl Datagram {
    /// Encode as JSON, rejecting oversized payloads
    pub fn encode(&self) -> SurrogateResult<Vec<u8>> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM_SIZE {
            return Err(SurrogateError::TransportError(format!(
                "datagram of {} bytes exceeds {}",
                bytes.len(),
                MAX_DATAGRAM_SIZE
            )));
        }
        Ok(bytes)
    }

    /// Decode from JSON
    pub fn decode(bytes: &[u8]) -> SurrogateResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// UDP fan-out broadcast channel
pub struct UdpBroadcast {
    local_addr: SocketAddr,
    peers: RwLock<Vec<SocketAddr>>,
    subscribers: Arc<Subscribers>,
    outbound: mpsc::Sender<Outbound>,
    receive_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl UdpBroadcast {
    /// Bind to a local address and start the receive and send loops
    pub async fn bind(addr: SocketAddr) -> SurrogateResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SurrogateError::TransportError(e.to_string()))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| SurrogateError::TransportError(e.to_string()))?;

        let socket = Arc::new(socket);
        let subscribers = Arc::new(Subscribers::new());
        let receive_task = start_receive_loop(Arc::clone(&socket), Arc::clone(&subscribers));
        let (outbound, queue) = mpsc::channel(SEND_QUEUE_DEPTH);
        let send_task = start_send_loop(socket, queue);

        Ok(UdpBroadcast {
            local_addr,
            peers: RwLock::new(Vec::new()),
            subscribers,
            outbound,
            receive_task,
            send_task,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Add a peer to fan out to; own address and repeats are ignored
    pub fn add_peer(&self, peer: SocketAddr) {
        if peer == self.local_addr {
            return;
        }
        let mut peers = self.peers.write();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    /// Current fan-out peers
    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.read().clone()
    }
}

impl BroadcastChannel for UdpBroadcast {
    fn emit(&self, event: &str, message: Value) -> SurrogateResult<()> {
        let datagram = Datagram {
            event: event.to_string(),
            message,
        };
        let bytes = Arc::new(datagram.encode()?);

        for peer in self.peers() {
            // A full queue is treated as loss
            if let Err(e) = self.outbound.try_send((Arc::clone(&bytes), peer)) {
                tracing::warn!(%peer, "UDP send queue error: {}", e);
            }
        }

        self.subscribers.deliver(&datagram.event, &datagram.message);
        Ok(())
    }

    fn subscribe(&self, event: &str) -> MessageReceiver {
        self.subscribers.add(event)
    }
}

impl Drop for UdpBroadcast {
    fn drop(&mut self) {
        self.receive_task.abort();
        self.send_task.abort();
    }
}

/// Start a background send loop draining the outbound queue
pub fn start_send_loop(socket: Arc<UdpSocket>, mut queue: mpsc::Receiver<Outbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((bytes, peer)) = queue.recv().await {
            if let Err(e) = socket.send_to(&bytes, peer).await {
                tracing::warn!(%peer, "UDP send error: {}", e);
            }
        }
    })
}

/// Start a background receive loop delivering decoded datagrams
pub fn start_receive_loop(socket: Arc<UdpSocket>, subscribers: Arc<Subscribers>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => match Datagram::decode(&buf[..len]) {
                    Ok(datagram) => {
                        subscribers.deliver(&datagram.event, &datagram.message);
                    }
                    Err(e) => {
                        tracing::debug!(%addr, "dropping undecodable datagram: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    })
}
