//! Core traits.
//!
//! The link itself (radio, pairing, discovery) lives outside this crate.
//! All the protocol needs from it is [`Transport`].

use async_trait::async_trait;

use super::error::TransportError;

/// A raw point-to-point packet link between exactly two peers.
///
/// Packets are opaque byte strings no larger than the negotiated MTU. The
/// link may lose, duplicate or reorder them; the layers above cope.
///
/// # Example
///
/// ```ignore
/// struct Loopback { tx: mpsc::Sender<Vec<u8>>, rx: Mutex<mpsc::Receiver<Vec<u8>>> }
///
/// #[async_trait]
/// impl Transport for Loopback {
///     async fn send(&self, packet: &[u8]) -> Result<(), TransportError> {
///         self.tx.send(packet.to_vec()).await.map_err(|_| TransportError::Closed)
///     }
///
///     async fn recv(&self) -> Option<Vec<u8>> {
///         self.rx.lock().await.recv().await
///     }
///
///     async fn close(&self) {}
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write one packet. An error means this packet was not accepted; the
    /// caller decides whether to retry.
    async fn send(&self, packet: &[u8]) -> Result<(), TransportError>;

    /// Next packet received from the peer, or `None` once the link is closed.
    ///
    /// Only one task is expected to call this.
    async fn recv(&self) -> Option<Vec<u8>>;

    /// Tear the link down. Pending and future `recv` calls return `None`.
    async fn close(&self);
}
